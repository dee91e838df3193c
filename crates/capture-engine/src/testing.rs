//! In-process hosts, encoders and job services for tests and dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_cursor_relay::backends::StubBackend;
use loopcast_job_client::{ClipUpload, JobApi};
use loopcast_model::cursor::PointerUpdate;
use loopcast_model::job::{ConversionParams, JobState};
use loopcast_model::target::{SurfaceId, SurfaceRef};
use loopcast_model::wire::StatusResponse;

use crate::host::{AcquiredStream, CaptureHost, ClipEncoder, Frame, FrameSource, RecordingIndicator};

/// Background of every fake frame.
pub const FAKE_BACKGROUND: Rgba<u8> = Rgba([128, 128, 128, 255]);

/// Artifact returned by [`InstantJobApi::download`].
pub const FAKE_ARTIFACT: &[u8] = b"GIF89a-fake";

/// What a [`FakeHost`] stream does once acquired.
#[derive(Debug, Clone)]
pub enum FakeSourceScript {
    /// Deliver `count` frames, then end as if the target closed.
    Frames { count: u32, width: u32, height: u32 },
    /// Deliver frames until stopped.
    Endless { width: u32, height: u32 },
    /// Refuse acquisition.
    FailAcquire(String),
}

#[derive(Debug, Default)]
struct StreamCounters {
    live: AtomicUsize,
    max_live: AtomicUsize,
    acquisitions: AtomicUsize,
}

/// Host with scripted frame streams and a recording encoder.
pub struct FakeHost {
    script: FakeSourceScript,
    pointer: Vec<PointerUpdate>,
    active: Mutex<Option<SurfaceRef>>,
    counters: Arc<StreamCounters>,
    encoded: Arc<Mutex<Vec<RgbaImage>>>,
    focused: Mutex<Vec<SurfaceId>>,
}

impl FakeHost {
    pub fn new(script: FakeSourceScript) -> Self {
        Self {
            script,
            pointer: Vec::new(),
            active: Mutex::new(None),
            counters: Arc::new(StreamCounters::default()),
            encoded: Arc::new(Mutex::new(Vec::new())),
            focused: Mutex::new(Vec::new()),
        }
    }

    /// Pointer updates replayed by every acquired stream.
    pub fn with_pointer(mut self, updates: Vec<PointerUpdate>) -> Self {
        self.pointer = updates;
        self
    }

    pub fn set_active(&self, surface: Option<SurfaceRef>) {
        if let Ok(mut active) = self.active.lock() {
            *active = surface;
        }
    }

    /// Streams acquired and not yet stopped.
    pub fn live_streams(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live streams ever observed.
    pub fn max_live_streams(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.counters.acquisitions.load(Ordering::SeqCst)
    }

    /// Every composited frame handed to an encoder so far.
    pub fn encoded_frames(&self) -> Vec<RgbaImage> {
        self.encoded.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Surfaces brought to the foreground, in order.
    pub fn focused(&self) -> Vec<SurfaceId> {
        self.focused.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CaptureHost for FakeHost {
    async fn active_surface(&self) -> LoopcastResult<Option<SurfaceRef>> {
        Ok(self.active.lock().ok().and_then(|a| a.clone()))
    }

    async fn acquire(&self, _target: &SurfaceRef) -> LoopcastResult<AcquiredStream> {
        let (remaining, width, height) = match &self.script {
            FakeSourceScript::Frames {
                count,
                width,
                height,
            } => (Some(*count), *width, *height),
            FakeSourceScript::Endless { width, height } => (None, *width, *height),
            FakeSourceScript::FailAcquire(reason) => {
                return Err(LoopcastError::capture(reason.clone()))
            }
        };

        self.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(AcquiredStream {
            frames: Box::new(FakeFrameSource {
                remaining,
                width,
                height,
                started: Instant::now(),
                counters: self.counters.clone(),
                stopped: false,
            }),
            pointer: Box::new(StubBackend::new(self.pointer.clone())),
            pointer_space: None,
        })
    }

    async fn open_encoder(
        &self,
        _width: u32,
        _height: u32,
        _fps: u32,
    ) -> LoopcastResult<Box<dyn ClipEncoder>> {
        Ok(Box::new(FakeEncoder {
            sink: self.encoded.clone(),
            frames: 0,
        }))
    }

    async fn focus_surface(&self, surface: SurfaceId) -> LoopcastResult<()> {
        if let Ok(mut focused) = self.focused.lock() {
            focused.push(surface);
        }
        Ok(())
    }
}

struct FakeFrameSource {
    remaining: Option<u32>,
    width: u32,
    height: u32,
    started: Instant,
    counters: Arc<StreamCounters>,
    stopped: bool,
}

impl FakeFrameSource {
    fn release(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl FrameSource for FakeFrameSource {
    async fn next_frame(&mut self) -> LoopcastResult<Option<Frame>> {
        if self.stopped {
            return Ok(None);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(Some(Frame {
            image: RgbaImage::from_pixel(self.width, self.height, FAKE_BACKGROUND),
            presentation_time: self.started.elapsed(),
        }))
    }

    async fn stop(&mut self) {
        self.release();
    }
}

impl Drop for FakeFrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

struct FakeEncoder {
    sink: Arc<Mutex<Vec<RgbaImage>>>,
    frames: usize,
}

#[async_trait]
impl ClipEncoder for FakeEncoder {
    async fn push_frame(&mut self, frame: &RgbaImage) -> LoopcastResult<()> {
        if let Ok(mut sink) = self.sink.lock() {
            sink.push(frame.clone());
        }
        self.frames += 1;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> LoopcastResult<Vec<u8>> {
        let mut clip = vec![0x1a, 0x45, 0xdf, 0xa3];
        clip.extend_from_slice(&(self.frames as u32).to_le_bytes());
        Ok(clip)
    }

    async fn abort(self: Box<Self>) {}
}

/// Job service that completes every job immediately.
#[derive(Debug, Default)]
pub struct InstantJobApi {
    fail_upload: Option<String>,
    fail_conversion: Option<String>,
    uploads: Mutex<Vec<ConversionParams>>,
    deleted: Mutex<Vec<String>>,
}

impl InstantJobApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_upload(reason: impl Into<String>) -> Self {
        Self {
            fail_upload: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn failing_conversion(reason: impl Into<String>) -> Self {
        Self {
            fail_conversion: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Parameters of every accepted upload.
    pub fn uploads(&self) -> Vec<ConversionParams> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobApi for InstantJobApi {
    async fn submit(&self, _clip: ClipUpload, params: ConversionParams) -> LoopcastResult<String> {
        if let Some(reason) = &self.fail_upload {
            return Err(LoopcastError::upload(reason.clone()));
        }
        let mut uploads = self
            .uploads
            .lock()
            .map_err(|_| LoopcastError::upload("upload log poisoned"))?;
        uploads.push(params);
        Ok(format!("job-{}", uploads.len()))
    }

    async fn status(&self, job_id: &str) -> LoopcastResult<StatusResponse> {
        let (status, progress, error) = match &self.fail_conversion {
            Some(reason) => (JobState::Failed, 50, Some(reason.clone())),
            None => (JobState::Completed, 100, None),
        };
        Ok(StatusResponse {
            job_id: job_id.to_string(),
            status,
            progress,
            error,
        })
    }

    async fn download(&self, _job_id: &str) -> LoopcastResult<Vec<u8>> {
        Ok(FAKE_ARTIFACT.to_vec())
    }

    async fn delete(&self, job_id: &str) -> LoopcastResult<()> {
        if let Ok(mut deleted) = self.deleted.lock() {
            deleted.push(job_id.to_string());
        }
        Ok(())
    }
}

/// Indicator that remembers every call.
#[derive(Debug, Default)]
pub struct FakeIndicator {
    recording: Mutex<Vec<bool>>,
    ready: Mutex<Vec<bool>>,
}

impl FakeIndicator {
    pub fn recording_calls(&self) -> Vec<bool> {
        self.recording.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn ready_calls(&self) -> Vec<bool> {
        self.ready.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl RecordingIndicator for FakeIndicator {
    fn set_recording(&self, recording: bool) {
        if let Ok(mut calls) = self.recording.lock() {
            calls.push(recording);
        }
    }

    fn set_ready(&self, ready: bool) {
        if let Ok(mut calls) = self.ready.lock() {
            calls.push(ready);
        }
    }
}
