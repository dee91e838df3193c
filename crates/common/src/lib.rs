//! loopcast common utilities
//!
//! Shared infrastructure for all loopcast crates:
//! - Error taxonomy and result alias
//! - Frame pacing for the compositor
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
