//! GStreamer capture of a screen region straight into an MP4 file.
//!
//! The system pointer is drawn by `ximagesrc` itself, so no compositing
//! pass sits between capture and the encoder.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use gst::prelude::*;
use gstreamer as gst;
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_platform_core::{ScreenRect, WindowInfo};

const STATE_TIMEOUT: Duration = Duration::from_secs(10);
const EOS_TIMEOUT: Duration = Duration::from_secs(10);

/// A running capture writing to its output file.
pub trait CapturePipeline: Send {
    fn start(&mut self) -> LoopcastResult<()>;

    /// Stop capturing and finalize the container.
    ///
    /// An error means the output file is unusable.
    fn stop(&mut self) -> LoopcastResult<()>;

    fn is_running(&self) -> bool;
}

/// Where windows and capture pipelines come from.
///
/// Both calls block; the controller runs them on the blocking pool.
pub trait CaptureBackend: Send + Sync {
    fn windows(&self) -> LoopcastResult<Vec<WindowInfo>>;

    fn open(
        &self,
        region: ScreenRect,
        fps: u32,
        output: &Path,
    ) -> LoopcastResult<Box<dyn CapturePipeline>>;
}

/// X11 windows from the window manager, frames from `ximagesrc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GstX11Backend;

impl CaptureBackend for GstX11Backend {
    fn windows(&self) -> LoopcastResult<Vec<WindowInfo>> {
        loopcast_platform_linux::list_windows()
    }

    fn open(
        &self,
        region: ScreenRect,
        fps: u32,
        output: &Path,
    ) -> LoopcastResult<Box<dyn CapturePipeline>> {
        let root = loopcast_platform_linux::root_geometry()?;
        let launch = x11_region_launch(region.intersect(&root), fps, output)?;
        tracing::debug!(%launch, "Building capture pipeline");
        Ok(Box::new(GstCapturePipeline::from_launch("x11-region", &launch)?))
    }
}

pub struct GstCapturePipeline {
    name: String,
    pipeline: gst::Pipeline,
    running: bool,
}

impl GstCapturePipeline {
    pub fn from_launch(name: impl Into<String>, launch: &str) -> LoopcastResult<Self> {
        init_gstreamer()?;

        let element = gst::parse::launch(launch)
            .map_err(|e| LoopcastError::capture(format!("Failed to build pipeline: {e}")))?;
        let pipeline = element
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| LoopcastError::capture("Launch string did not produce a pipeline"))?;

        Ok(Self {
            name: name.into(),
            pipeline,
            running: false,
        })
    }

    /// Wait for EOS to reach the sink so `mp4mux` can write its index.
    ///
    /// Returns false when the file may be missing its index.
    fn await_eos(&self) -> bool {
        let Some(bus) = self.pipeline.bus() else {
            return false;
        };
        let wait = gst::ClockTime::from_nseconds(EOS_TIMEOUT.as_nanos() as u64);
        match bus.timed_pop_filtered(wait, &[gst::MessageType::Eos, gst::MessageType::Error]) {
            Some(msg) => match msg.view() {
                gst::MessageView::Error(err) => {
                    tracing::warn!(pipeline = %self.name, error = %err.error(), "Muxer failed while finishing");
                    false
                }
                _ => true,
            },
            None => {
                tracing::warn!(pipeline = %self.name, timeout = ?EOS_TIMEOUT, "No EOS from sink; MP4 index may be missing");
                false
            }
        }
    }
}

impl CapturePipeline for GstCapturePipeline {
    fn start(&mut self) -> LoopcastResult<()> {
        if let Err(e) = self.pipeline.set_state(gst::State::Playing) {
            return Err(LoopcastError::capture(format!(
                "{} pipeline refused to play: {e:?}",
                self.name
            )));
        }

        let (settled, state, _) = self
            .pipeline
            .state(gst::ClockTime::from_nseconds(STATE_TIMEOUT.as_nanos() as u64));
        match settled {
            Ok(_) if state == gst::State::Playing => {}
            Ok(_) => {
                tracing::warn!(pipeline = %self.name, ?state, "Still prerolling; recording anyway");
            }
            Err(e) => {
                let _ = self.pipeline.set_state(gst::State::Null);
                return Err(LoopcastError::capture(format!(
                    "{} pipeline failed to reach Playing: {e:?}",
                    self.name
                )));
            }
        }

        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> LoopcastResult<()> {
        let finished = self.pipeline.send_event(gst::event::Eos::new()) && self.await_eos();

        self.running = false;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            return Err(LoopcastError::encode(format!(
                "{} pipeline did not shut down: {e:?}",
                self.name
            )));
        }
        if !finished {
            return Err(LoopcastError::encode(format!(
                "{} recording did not finalize; the MP4 has no index",
                self.name
            )));
        }
        tracing::debug!(pipeline = %self.name, "Capture finalized");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for GstCapturePipeline {
    fn drop(&mut self) {
        if self.running {
            let _ = self.pipeline.set_state(gst::State::Null);
        }
    }
}

/// Launch line capturing `region` at `fps` into an H.264 MP4 at `output`.
pub fn x11_region_launch(region: ScreenRect, fps: u32, output: &Path) -> LoopcastResult<String> {
    let region = region.even();
    let fragment = x11_capture_region_fragment(region)?;
    let fps = fps.max(1);
    let keyint = fps.saturating_mul(2);
    let path = quoted_location(output);
    Ok(format!(
        "ximagesrc use-damage=false show-pointer=true{fragment} ! queue max-size-buffers=200 leaky=downstream ! videoconvert ! videorate ! video/x-raw,framerate={fps}/1,format=I420 ! queue max-size-buffers=8 ! x264enc tune=zerolatency speed-preset=veryfast key-int-max={keyint} ! h264parse ! queue max-size-buffers=8 ! mp4mux ! filesink location=\"{path}\""
    ))
}

/// `ximagesrc` bounds for `region`; its end coordinates are inclusive.
fn x11_capture_region_fragment(region: ScreenRect) -> LoopcastResult<String> {
    let ScreenRect {
        x,
        y,
        width,
        height,
    } = region;
    if region.is_empty() {
        return Err(LoopcastError::capture(format!(
            "Cannot record an empty {width}x{height} region at ({x},{y})"
        )));
    }
    if x < 0 || y < 0 {
        return Err(LoopcastError::capture(format!(
            "X11 capture region starts off screen at ({x},{y})"
        )));
    }

    let width = i32::try_from(width)
        .map_err(|_| LoopcastError::capture(format!("X11 capture width too large: {width}")))?;
    let height = i32::try_from(height)
        .map_err(|_| LoopcastError::capture(format!("X11 capture height too large: {height}")))?;
    let endx = x
        .checked_add(width - 1)
        .ok_or_else(|| LoopcastError::capture("X11 capture region x-range overflow"))?;
    let endy = y
        .checked_add(height - 1)
        .ok_or_else(|| LoopcastError::capture("X11 capture region y-range overflow"))?;

    Ok(format!(" startx={x} starty={y} endx={endx} endy={endy}"))
}

fn init_gstreamer() -> LoopcastResult<()> {
    static INIT: OnceLock<Option<String>> = OnceLock::new();
    match INIT.get_or_init(|| gst::init().err().map(|e| e.to_string())) {
        None => Ok(()),
        Some(e) => Err(LoopcastError::capture(format!("GStreamer unavailable: {e}"))),
    }
}

/// Quote-safe `location` value for a launch line.
fn quoted_location(path: &Path) -> String {
    path.display().to_string().replace('"', "\\\"")
}
