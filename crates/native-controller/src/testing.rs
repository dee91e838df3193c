//! Scripted capture backend and job service for exercising the controller.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_job_client::{ClipUpload, JobApi};
use loopcast_model::job::{ConversionParams, JobState};
use loopcast_model::wire::StatusResponse;
use loopcast_platform_core::{ScreenRect, WindowInfo};

use crate::pipeline::{CaptureBackend, CapturePipeline};

/// Bytes every fake pipeline leaves in its output file.
pub const FAKE_MP4: &[u8] = b"\0\0\0\x18ftypmp42-fake";

/// Artifact returned by [`FakeJobs::download`].
pub const FAKE_GIF: &[u8] = b"GIF89a-fake";

#[derive(Debug, Default)]
struct BackendLog {
    opened: Vec<(ScreenRect, u32, PathBuf)>,
    stopped: usize,
}

/// Backend with a fixed window list and file-writing pipelines.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    windows: Vec<WindowInfo>,
    fail_start: Option<String>,
    fail_stop: Option<String>,
    log: Arc<Mutex<BackendLog>>,
}

impl FakeBackend {
    pub fn new(windows: Vec<WindowInfo>) -> Self {
        Self {
            windows,
            ..Self::default()
        }
    }

    /// Pipelines refuse to start with `reason`.
    pub fn failing_start(mut self, reason: impl Into<String>) -> Self {
        self.fail_start = Some(reason.into());
        self
    }

    /// Pipelines leave an unfinished file and fail to stop with `reason`.
    pub fn failing_stop(mut self, reason: impl Into<String>) -> Self {
        self.fail_stop = Some(reason.into());
        self
    }

    /// Regions, frame rates and output paths of every opened pipeline.
    pub fn opened(&self) -> Vec<(ScreenRect, u32, PathBuf)> {
        self.log.lock().map(|l| l.opened.clone()).unwrap_or_default()
    }

    pub fn stopped(&self) -> usize {
        self.log.lock().map(|l| l.stopped).unwrap_or_default()
    }
}

/// A browser window of the given size at the origin.
pub fn browser_window(id: u64, width: u32, height: u32) -> WindowInfo {
    WindowInfo {
        id,
        app_id: "google-chrome".to_string(),
        title: format!("Example {id} - Google Chrome"),
        bounds: ScreenRect::new(0, 0, width, height),
    }
}

impl CaptureBackend for FakeBackend {
    fn windows(&self) -> LoopcastResult<Vec<WindowInfo>> {
        Ok(self.windows.clone())
    }

    fn open(
        &self,
        region: ScreenRect,
        fps: u32,
        output: &Path,
    ) -> LoopcastResult<Box<dyn CapturePipeline>> {
        if let Ok(mut log) = self.log.lock() {
            log.opened.push((region, fps, output.to_path_buf()));
        }
        Ok(Box::new(FakePipeline {
            output: output.to_path_buf(),
            fail_start: self.fail_start.clone(),
            fail_stop: self.fail_stop.clone(),
            running: false,
            log: self.log.clone(),
        }))
    }
}

struct FakePipeline {
    output: PathBuf,
    fail_start: Option<String>,
    fail_stop: Option<String>,
    running: bool,
    log: Arc<Mutex<BackendLog>>,
}

impl CapturePipeline for FakePipeline {
    fn start(&mut self) -> LoopcastResult<()> {
        if let Some(reason) = &self.fail_start {
            return Err(LoopcastError::capture(reason.clone()));
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> LoopcastResult<()> {
        self.running = false;
        std::fs::write(&self.output, FAKE_MP4)?;
        if let Ok(mut log) = self.log.lock() {
            log.stopped += 1;
        }
        match &self.fail_stop {
            Some(reason) => Err(LoopcastError::encode(reason.clone())),
            None => Ok(()),
        }
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// Job service that finishes every job on the first poll.
#[derive(Debug, Default)]
pub struct FakeJobs {
    fail_conversion: Option<String>,
    uploads: Mutex<Vec<(String, usize, ConversionParams)>>,
}

impl FakeJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_conversion(reason: impl Into<String>) -> Self {
        Self {
            fail_conversion: Some(reason.into()),
            ..Self::default()
        }
    }

    /// File name, size and parameters of every upload.
    pub fn uploads(&self) -> Vec<(String, usize, ConversionParams)> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobApi for FakeJobs {
    async fn submit(&self, clip: ClipUpload, params: ConversionParams) -> LoopcastResult<String> {
        let mut uploads = self
            .uploads
            .lock()
            .map_err(|_| LoopcastError::upload("upload log poisoned"))?;
        uploads.push((clip.file_name, clip.bytes.len(), params));
        Ok(format!("job-{}", uploads.len()))
    }

    async fn status(&self, job_id: &str) -> LoopcastResult<StatusResponse> {
        let (status, progress, error) = match &self.fail_conversion {
            Some(reason) => (JobState::Failed, 30, Some(reason.clone())),
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
        Ok(FAKE_GIF.to_vec())
    }

    async fn delete(&self, _job_id: &str) -> LoopcastResult<()> {
        Ok(())
    }
}
