//! Command dispatch for the native host.
//!
//! Commands are handled one at a time in arrival order. Replies from the
//! dispatcher and from background processing tasks share one channel,
//! drained by a single writer task, so frames never interleave.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use loopcast_common::config::AppConfig;
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_job_client::{convert_and_deliver, ClipProgress, ClipUpload, JobApi};
use loopcast_model::filename::FALLBACK_LABEL;
use loopcast_model::ipc::{Command, HostReply, IncomingMessage, RecordingOptions};
use loopcast_platform_core::ScreenRect;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::codec::{decode_message, encode_reply, read_frame, write_frame};
use crate::pipeline::{CaptureBackend, CapturePipeline};
use crate::ranker::{capture_region, WindowRanker};

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Frame rate of the local MP4; the output rate travels with the job.
    pub capture_fps: u32,
    pub delivery_dir: PathBuf,
    /// Where in-progress MP4 files are written.
    pub scratch_dir: PathBuf,
    pub poll_interval: Duration,
}

impl ControllerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            capture_fps: config.recording.capture_fps.max(1),
            delivery_dir: config.client.delivery_dir.clone(),
            scratch_dir: std::env::temp_dir(),
            poll_interval: Duration::from_millis(config.client.poll_interval_ms.max(1)),
        }
    }
}

/// The native controller, ready to serve one framed connection.
pub struct NativeHost {
    backend: Arc<dyn CaptureBackend>,
    ranker: Arc<dyn WindowRanker>,
    jobs: Arc<dyn JobApi>,
    settings: ControllerSettings,
}

impl NativeHost {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        ranker: Arc<dyn WindowRanker>,
        jobs: Arc<dyn JobApi>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            backend,
            ranker,
            jobs,
            settings,
        }
    }

    /// Serve commands from `reader` until it ends, replying on `writer`.
    ///
    /// A clean end of input lets in-flight processing finish and report
    /// before returning. A framing error ends the session with that error.
    pub async fn serve<R, W>(self, mut reader: R, mut writer: W) -> LoopcastResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (replies, mut outbox) = mpsc::unbounded_channel::<HostReply>();
        let writer_task = tokio::spawn(async move {
            while let Some(reply) = outbox.recv().await {
                tracing::debug!(?reply, "Reply");
                let sent = match encode_reply(&reply) {
                    Ok(payload) => write_frame(&mut writer, &payload).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    tracing::error!(error = %e, "Failed to write reply; host output closed");
                    return;
                }
            }
        });

        let mut controller = Controller {
            host: self,
            replies,
            active: None,
            processing: JoinSet::new(),
        };

        let outcome = loop {
            match read_frame(&mut reader).await {
                Ok(Some(payload)) => controller.handle_payload(&payload).await,
                Ok(None) => {
                    tracing::info!("Host closed input");
                    break Ok(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Unreadable frame from host");
                    break Err(e);
                }
            }
        };

        controller.shutdown().await;
        drop(controller);
        if let Err(e) = writer_task.await {
            tracing::warn!(error = %e, "Reply writer panicked");
        }
        outcome
    }
}

struct ActiveRecording {
    pipeline: Box<dyn CapturePipeline>,
    output: PathBuf,
    options: RecordingOptions,
}

struct Controller {
    host: NativeHost,
    replies: mpsc::UnboundedSender<HostReply>,
    active: Option<ActiveRecording>,
    processing: JoinSet<()>,
}

impl Controller {
    fn reply(&self, reply: HostReply) {
        if self.replies.send(reply).is_err() {
            tracing::debug!("Reply dropped; writer is gone");
        }
    }

    async fn handle_payload(&mut self, payload: &[u8]) {
        match decode_message(payload) {
            Ok(message) => self.handle(message).await,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed message");
                self.reply(HostReply::error(format!("Invalid message: {e}")));
            }
        }
    }

    async fn handle(&mut self, message: IncomingMessage) {
        let command = message.command();
        tracing::info!(command = %message.command, "Command received");
        match command {
            Command::Ping => self.reply(HostReply::Pong),
            Command::Start => {
                if self.active.is_some() {
                    self.reply(HostReply::error("Recording already in progress"));
                    return;
                }
                match self.start(message.options_or_default()).await {
                    Ok(()) => self.reply(HostReply::RecordingStarted),
                    Err(LoopcastError::TargetUnavailable { message }) => {
                        self.reply(HostReply::error(message))
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Start failed");
                        self.reply(HostReply::error(format!("Start recording failed: {e}")));
                    }
                }
            }
            Command::Stop => self.stop(message.options).await,
            Command::Unknown(name) => {
                self.reply(HostReply::error(format!("Unknown command: {name}")));
            }
        }
    }

    async fn start(&mut self, options: RecordingOptions) -> LoopcastResult<()> {
        let backend = self.host.backend.clone();
        let ranker = self.host.ranker.clone();
        let fps = self.host.settings.capture_fps;
        let viewport = options.viewport;
        let output = self.host.settings.scratch_dir.join(format!(
            "recording-{}.mp4",
            chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f")
        ));

        let target = output.clone();
        let (pipeline, region) = blocking(move || {
            let windows = backend.windows()?;
            let window = ranker.pick(&windows)?;
            let region = capture_region(window, viewport.as_ref());
            tracing::info!(
                window = window.id,
                app = %window.app_id,
                title = %window.title,
                "Capture target selected"
            );
            let mut pipeline = backend.open(region, fps, &target)?;
            pipeline.start()?;
            Ok::<(Box<dyn CapturePipeline>, ScreenRect), LoopcastError>((pipeline, region))
        })
        .await?;

        tracing::info!(
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            fps,
            output = %output.display(),
            "Recording started"
        );
        self.active = Some(ActiveRecording {
            pipeline,
            output,
            options,
        });
        Ok(())
    }

    async fn stop(&mut self, options: Option<RecordingOptions>) {
        let Some(recording) = self.active.take() else {
            self.reply(HostReply::error("No active recording"));
            return;
        };
        let ActiveRecording {
            mut pipeline,
            output,
            options: started_with,
        } = recording;
        let params = options.unwrap_or(started_with).conversion_params();

        if let Err(e) = blocking(move || pipeline.stop()).await {
            tracing::error!(error = %e, "Stop failed");
            discard(&output).await;
            self.reply(HostReply::error(format!("Stop recording failed: {e}")));
            return;
        }
        tracing::info!(output = %output.display(), "Recording finalized");
        self.reply(HostReply::Uploading { progress: 0 });

        let jobs = self.host.jobs.clone();
        let settings = self.host.settings.clone();
        let replies = self.replies.clone();
        self.processing.spawn(async move {
            let outcome = process(jobs.as_ref(), &output, params, &settings, &replies).await;
            discard(&output).await;
            let reply = match outcome {
                Ok(path) => HostReply::complete(path.to_string_lossy()),
                Err(e) => {
                    tracing::error!(error = %e, "Processing failed");
                    HostReply::error(format!("Processing failed: {e}"))
                }
            };
            let _ = replies.send(reply);
        });
    }

    /// Drop an unfinished recording and wait for processing to report.
    async fn shutdown(&mut self) {
        if let Some(ActiveRecording {
            mut pipeline,
            output,
            ..
        }) = self.active.take()
        {
            tracing::info!("Input ended mid-recording; discarding capture");
            let stopped = blocking(move || {
                if pipeline.is_running() {
                    pipeline.stop()?;
                }
                Ok(())
            })
            .await;
            if let Err(e) = stopped {
                tracing::warn!(error = %e, "Failed to stop abandoned capture");
            }
            discard(&output).await;
        }
        while let Some(joined) = self.processing.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Processing task panicked");
            }
        }
    }
}

async fn process(
    jobs: &dyn JobApi,
    output: &std::path::Path,
    params: loopcast_model::job::ConversionParams,
    settings: &ControllerSettings,
    replies: &mpsc::UnboundedSender<HostReply>,
) -> LoopcastResult<PathBuf> {
    let bytes = tokio::fs::read(output).await?;
    if bytes.is_empty() {
        return Err(LoopcastError::encode("recording produced an empty file"));
    }
    convert_and_deliver(
        jobs,
        ClipUpload::mp4(bytes),
        params,
        FALLBACK_LABEL,
        &settings.delivery_dir,
        settings.poll_interval,
        |progress| {
            if let ClipProgress::Converting(progress) = progress {
                let _ = replies.send(HostReply::Processing { progress });
            }
        },
    )
    .await
}

async fn discard(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch recording");
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
