//! loopcast Linux Platform Integration
//!
//! Platform-specific implementations for Linux:
//! - **Display Detection:** display server, X11 window enumeration, focus
//! - **Permissions:** Capability detection and user guidance

pub mod display;
pub mod permissions;

pub use display::*;
