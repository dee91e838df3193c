//! Seams between the coordinator and the environment it records.
//!
//! A [`CaptureHost`] knows which surface is active, can hand out a raw
//! frame stream for a surface, and opens clip encoders. The desktop
//! implementation lives in [`crate::desktop`]; tests supply fakes.

use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use loopcast_common::error::LoopcastResult;
use loopcast_cursor_relay::PointerBackend;
use loopcast_model::target::{SurfaceId, SurfaceRef};

/// One raw captured frame. Owned by the compositor for a single draw.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,

    /// Time since the stream was acquired.
    pub presentation_time: Duration,
}

/// A live capture stream.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame. `Ok(None)` means the stream ended
    /// (target closed or lost).
    ///
    /// Must be cancel-safe: the compositor races it against state changes.
    async fn next_frame(&mut self) -> LoopcastResult<Option<Frame>>;

    /// Stop every underlying track. Idempotent.
    async fn stop(&mut self);
}

/// Streaming clip encoder fed with composited frames.
#[async_trait]
pub trait ClipEncoder: Send {
    async fn push_frame(&mut self, frame: &RgbaImage) -> LoopcastResult<()>;

    /// Flush and return the finished container bytes.
    async fn finish(self: Box<Self>) -> LoopcastResult<Vec<u8>>;

    /// Discard everything encoded so far.
    async fn abort(self: Box<Self>);
}

/// Everything acquired for one recording.
pub struct AcquiredStream {
    pub frames: Box<dyn FrameSource>,

    /// Pointer events from inside the target.
    pub pointer: Box<dyn PointerBackend>,

    /// Coordinate space of the pointer samples, when it differs from the
    /// frame raster (e.g. CSS pixels vs device pixels).
    pub pointer_space: Option<(u32, u32)>,
}

/// The environment the coordinator records from.
#[async_trait]
pub trait CaptureHost: Send + Sync {
    /// The surface that currently has focus, if the host can tell.
    async fn active_surface(&self) -> LoopcastResult<Option<SurfaceRef>>;

    /// Acquire a raw stream for `target`.
    async fn acquire(&self, target: &SurfaceRef) -> LoopcastResult<AcquiredStream>;

    /// Open an encoder for frames of the given size.
    async fn open_encoder(
        &self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> LoopcastResult<Box<dyn ClipEncoder>>;

    /// Bring `surface` to the foreground.
    async fn focus_surface(&self, surface: SurfaceId) -> LoopcastResult<()>;
}

/// Visual recording indicator (toolbar icon, tray icon, ...).
pub trait RecordingIndicator: Send + Sync {
    fn set_recording(&self, recording: bool);

    /// Whether the active surface could be recorded right now.
    fn set_ready(&self, ready: bool);
}

/// Indicator that only logs.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl RecordingIndicator for LogIndicator {
    fn set_recording(&self, recording: bool) {
        tracing::info!(recording, "Recording indicator");
    }

    fn set_ready(&self, ready: bool) {
        tracing::debug!(ready, "Ready indicator");
    }
}
