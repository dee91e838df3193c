//! loopcast Native Controller
//!
//! Records a browser window for hosts that cannot capture tabs
//! themselves. The browser launches the controller and talks to it over
//! stdin/stdout in length-prefixed JSON frames:
//!
//! ```text
//! host ──start──▶ rank windows ─▶ GStreamer (ximagesrc → x264 → mp4)
//! host ──stop───▶ finalize mp4 ─▶ upload ─▶ poll ─▶ download ─▶ ~/Downloads
//!      ◀── recording_started / uploading / processing / complete / error
//! ```

pub mod codec;
pub mod controller;
pub mod pipeline;
pub mod ranker;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use controller::{ControllerSettings, NativeHost};
pub use pipeline::{CaptureBackend, CapturePipeline, GstX11Backend};
pub use ranker::{LargestAllowListed, WindowRanker};
