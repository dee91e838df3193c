//! loopcast data model
//!
//! Defines the contracts shared by every execution context:
//! - **Session:** the recording state machine and its transition table
//! - **Target:** surface identity and the recordability predicate
//! - **Cursor:** pointer updates and the last-write-wins sample
//! - **Job:** transcode job lifecycle and quality tiers
//! - **Wire:** HTTP bodies of the job service
//! - **Ipc:** native host command/status vocabulary
//! - **Filename:** the delivered artifact naming convention

pub mod cursor;
pub mod filename;
pub mod ipc;
pub mod job;
pub mod session;
pub mod target;
pub mod wire;

pub use cursor::*;
pub use filename::*;
pub use job::*;
pub use session::*;
pub use target::*;
