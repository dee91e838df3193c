//! X11 desktop host: windows as surfaces, `x11grab` as the frame source.
//!
//! The system cursor is left out of the grab (`-draw_mouse 0`); the
//! compositor draws its own glyph from `/dev/input/mice` samples.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use image::RgbaImage;
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_cursor_relay::backends::detect_best_backend;
use loopcast_model::target::{SurfaceId, SurfaceRef};
use loopcast_platform_core::ScreenRect;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use crate::encoder::FfmpegClipEncoder;
use crate::host::{AcquiredStream, CaptureHost, ClipEncoder, Frame, FrameSource};

/// Records X11 windows by id.
#[derive(Debug, Clone)]
pub struct DesktopHost {
    ffmpeg: PathBuf,
    display: String,
    capture_fps: u32,
}

impl DesktopHost {
    pub fn new(ffmpeg: PathBuf, capture_fps: u32) -> Self {
        Self {
            ffmpeg,
            display: std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string()),
            capture_fps: capture_fps.max(1),
        }
    }
}

async fn blocking<T, F>(work: F) -> LoopcastResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> LoopcastResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LoopcastError::Other(anyhow::Error::new(e)))?
}

#[async_trait]
impl CaptureHost for DesktopHost {
    async fn active_surface(&self) -> LoopcastResult<Option<SurfaceRef>> {
        let window = blocking(loopcast_platform_linux::active_window).await?;
        Ok(window.map(|w| SurfaceRef::app(w.id, w.app_id)))
    }

    async fn acquire(&self, target: &SurfaceRef) -> LoopcastResult<AcquiredStream> {
        let id = target.id.0;
        let (windows, root) = blocking(|| {
            Ok((
                loopcast_platform_linux::list_windows()?,
                loopcast_platform_linux::root_geometry()?,
            ))
        })
        .await?;
        let window = windows
            .into_iter()
            .find(|w| w.id == id)
            .ok_or_else(|| LoopcastError::target_unavailable(format!("window {id:#x} is gone")))?;

        let region = window.bounds.intersect(&root).even();
        if region.is_empty() {
            return Err(LoopcastError::target_unavailable(format!(
                "window {id:#x} is not on screen"
            )));
        }

        let frames = FfmpegGrabSource::spawn(&self.ffmpeg, &self.display, region, self.capture_fps)?;
        tracing::info!(
            window = %target.id,
            app = %window.app_id,
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            "Capture stream acquired"
        );
        Ok(AcquiredStream {
            frames: Box::new(frames),
            pointer: detect_best_backend(region),
            pointer_space: None,
        })
    }

    async fn open_encoder(
        &self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> LoopcastResult<Box<dyn ClipEncoder>> {
        let encoder = FfmpegClipEncoder::spawn(&self.ffmpeg, width, height, fps).await?;
        Ok(Box::new(encoder))
    }

    async fn focus_surface(&self, surface: SurfaceId) -> LoopcastResult<()> {
        blocking(move || loopcast_platform_linux::activate_window(surface.0)).await
    }
}

/// `ffmpeg` arguments grabbing `region` of `display` as raw RGBA on stdout.
pub fn grab_args(display: &str, region: ScreenRect, fps: u32) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "x11grab".into(),
        "-draw_mouse".into(),
        "0".into(),
        "-framerate".into(),
        fps.max(1).to_string(),
        "-video_size".into(),
        format!("{}x{}", region.width, region.height),
        "-i".into(),
        format!("{display}+{},{}", region.x, region.y),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "pipe:1".into(),
    ]
}

/// Raw RGBA frames from an `ffmpeg -f x11grab` child.
pub struct FfmpegGrabSource {
    child: Child,
    stdout: Option<ChildStdout>,
    width: u32,
    height: u32,
    buffer: Vec<u8>,
    filled: usize,
    started: Instant,
}

impl FfmpegGrabSource {
    pub fn spawn(ffmpeg: &Path, display: &str, region: ScreenRect, fps: u32) -> LoopcastResult<Self> {
        let args = grab_args(display, region, fps);
        tracing::debug!(?args, "Starting x11grab");
        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LoopcastError::capture(format!("Failed to start ffmpeg: {e}")))?;
        let stdout = child.stdout.take();

        Ok(Self {
            child,
            stdout,
            width: region.width,
            height: region.height,
            buffer: vec![0; region.area() as usize * 4],
            filled: 0,
            started: Instant::now(),
        })
    }
}

#[async_trait]
impl FrameSource for FfmpegGrabSource {
    async fn next_frame(&mut self) -> LoopcastResult<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        // `filled` survives cancellation, so a dropped call resumes mid-frame.
        while self.filled < self.buffer.len() {
            let n = stdout
                .read(&mut self.buffer[self.filled..])
                .await
                .map_err(|e| LoopcastError::capture(format!("x11grab read failed: {e}")))?;
            if n == 0 {
                tracing::info!("x11grab stream ended");
                self.stdout = None;
                return Ok(None);
            }
            self.filled += n;
        }
        self.filled = 0;

        let image = RgbaImage::from_raw(self.width, self.height, self.buffer.clone())
            .ok_or_else(|| LoopcastError::capture("frame size mismatch"))?;
        Ok(Some(Frame {
            image,
            presentation_time: self.started.elapsed(),
        }))
    }

    async fn stop(&mut self) {
        self.stdout = None;
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "x11grab already exited");
        }
    }
}
