//! loopcast Capture Engine
//!
//! Runs recording sessions: the coordinator state machine, the draw loop
//! that composites a synthetic cursor onto captured frames, and the clip
//! encoder feeding the post-capture upload.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 Coordinator                   │
//! │  Idle → AwaitingTarget → Recording → Stopping │
//! │        → Uploading → Converting → Done/Error  │
//! │  ┌────────────┐  ┌────────────┐  ┌──────────┐ │
//! │  │ Cursor     │─▶│ Compositor │─▶│ Clip     │ │
//! │  │ Relay      │  │ (draw loop)│  │ Encoder  │ │
//! │  └────────────┘  └─────▲──────┘  └────┬─────┘ │
//! │                        │              │       │
//! │                  CaptureHost      job client  │
//! └───────────────────────────────────────────────┘
//! ```

pub mod compositor;
pub mod coordinator;
pub mod desktop;
pub mod encoder;
pub mod glyph;
pub mod host;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use compositor::{CaptureEnd, Clip, Compositor};
pub use coordinator::{Coordinator, CoordinatorHandle, CoordinatorSettings, StartOutcome};
pub use desktop::DesktopHost;
pub use host::{AcquiredStream, CaptureHost, ClipEncoder, Frame, FrameSource, LogIndicator, RecordingIndicator};
