//! Job lifecycle: submit, convert out of band, report, hand out, reclaim.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use loopcast_common::config::ServiceConfig;
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_model::job::{ConversionParams, Job, JobUpdate};
use loopcast_model::wire::{HealthResponse, StatusResponse};
use tokio::task::JoinHandle;

use crate::store::{JobStore, UpdateOutcome};
use crate::transform::Transformer;

/// The transcode job service, independent of its HTTP surface.
pub struct TranscodeService {
    store: Arc<JobStore>,
    transformer: Arc<dyn Transformer>,
    uploads_dir: PathBuf,
    output_dir: PathBuf,
    ttl: Duration,
    started_at: Instant,
}

impl TranscodeService {
    /// Create the service and its `uploads/` and `output/` directories.
    pub fn new(config: &ServiceConfig, transformer: Arc<dyn Transformer>) -> LoopcastResult<Self> {
        let uploads_dir = config.data_dir.join("uploads");
        let output_dir = config.data_dir.join("output");
        std::fs::create_dir_all(&uploads_dir)?;
        std::fs::create_dir_all(&output_dir)?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            transformer = transformer.name(),
            ttl_secs = config.job_ttl_secs,
            "Transcode service ready"
        );

        Ok(Self {
            store: Arc::new(JobStore::new()),
            transformer,
            uploads_dir,
            output_dir,
            ttl: Duration::from_secs(config.job_ttl_secs),
            started_at: Instant::now(),
        })
    }

    /// Persist `clip` under a fresh id and start converting it.
    ///
    /// Returns as soon as the job exists; the transform runs on its own
    /// task.
    pub async fn submit(&self, clip: &[u8], params: ConversionParams) -> LoopcastResult<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let input_path = self.uploads_dir.join(format!("{id}.clip"));
        let output_path = self.output_dir.join(format!("{id}.gif"));
        tokio::fs::write(&input_path, clip).await?;

        let job = Job::new(id.clone(), params, input_path, output_path);
        self.store.insert(job.clone()).await;
        tracing::info!(
            job_id = %id,
            bytes = clip.len(),
            fps = params.fps,
            width = params.width,
            quality = params.quality.as_str(),
            "Job accepted"
        );

        tokio::spawn(run_conversion(
            self.store.clone(),
            self.transformer.clone(),
            job,
        ));
        Ok(id)
    }

    pub async fn status(&self, id: &str) -> LoopcastResult<StatusResponse> {
        let job = self.store.get(id).await?;
        Ok(StatusResponse::from(&job))
    }

    /// Hand out the artifact of a completed job, then reclaim the job.
    pub async fn download(&self, id: &str) -> LoopcastResult<Vec<u8>> {
        let job = self.store.take_completed(id).await?;
        let bytes = tokio::fs::read(&job.output_path).await;
        remove_job_files(&job).await;
        tracing::info!(job_id = %id, "Job downloaded and reclaimed");
        Ok(bytes?)
    }

    /// Reclaim a job regardless of state. Unknown ids are not an error.
    pub async fn delete(&self, id: &str) {
        if let Some(job) = self.store.remove(id).await {
            remove_job_files(&job).await;
            tracing::info!(job_id = %id, state = %job.state, "Job deleted");
        }
    }

    /// Reclaim every job older than the TTL at `now`.
    pub async fn sweep(&self, now: Instant) -> usize {
        let expired = self.store.drain_expired(now, self.ttl).await;
        for job in &expired {
            tracing::info!(job_id = %job.id, state = %job.state, "Job expired");
            remove_job_files(job).await;
        }
        expired.len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = service.sweep(Instant::now()).await;
                if removed > 0 {
                    tracing::info!(removed, "TTL sweep reclaimed jobs");
                }
            }
        })
    }

    pub async fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            active_jobs: self.store.len().await,
            uptime: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

async fn run_conversion(store: Arc<JobStore>, transformer: Arc<dyn Transformer>, job: Job) {
    let palette = palette_path(&job.output_path);
    let result = convert(&store, transformer.as_ref(), &job, &palette).await;
    remove_quietly(&palette).await;

    let outcome = match result {
        Ok(()) => store.update(&job.id, JobUpdate::Completed).await,
        Err(e) => {
            tracing::warn!(job_id = %job.id, error = %e, "Conversion failed");
            let message = match e {
                LoopcastError::Conversion { message } => message,
                other => other.to_string(),
            };
            store.update(&job.id, JobUpdate::Failed(message)).await
        }
    };

    match outcome {
        UpdateOutcome::Applied => tracing::info!(job_id = %job.id, "Conversion finished"),
        UpdateOutcome::Gone => {
            tracing::debug!(job_id = %job.id, "Job reclaimed during conversion; removing leftovers");
            remove_job_files(&job).await;
        }
        UpdateOutcome::Rejected(reason) => {
            tracing::warn!(job_id = %job.id, %reason, "Final job update rejected");
        }
    }
}

async fn convert(
    store: &JobStore,
    transformer: &dyn Transformer,
    job: &Job,
    palette: &Path,
) -> LoopcastResult<()> {
    transformer
        .generate_palette(&job.input_path, palette, &job.params)
        .await?;
    if store.update(&job.id, JobUpdate::Progress(50)).await == UpdateOutcome::Gone {
        return Err(LoopcastError::job_not_found(&job.id));
    }
    transformer
        .apply_palette(&job.input_path, palette, &job.output_path, &job.params)
        .await
}

fn palette_path(output: &Path) -> PathBuf {
    output.with_extension("palette.png")
}

async fn remove_job_files(job: &Job) {
    remove_quietly(&job.input_path).await;
    remove_quietly(&job.output_path).await;
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransformer, Stage};
    use loopcast_model::job::{JobState, QualityTier};

    fn config(name: &str) -> ServiceConfig {
        let dir = std::env::temp_dir().join(format!(
            "loopcast-svc-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        ServiceConfig {
            data_dir: dir,
            ..ServiceConfig::default()
        }
    }

    async fn wait_for_state(service: &TranscodeService, id: &str, state: JobState) -> StatusResponse {
        for _ in 0..400 {
            let status = service.status(id).await.unwrap();
            if status.status == state {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never reached {state}");
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn completed_job_downloads_once() {
        let config = config("once");
        let service = TranscodeService::new(&config, Arc::new(FakeTransformer::new())).unwrap();
        let id = service
            .submit(b"clip", ConversionParams::default())
            .await
            .unwrap();
        assert_eq!(id.len(), 32);

        let status = wait_for_state(&service, &id, JobState::Completed).await;
        assert_eq!(status.progress, 100);

        let bytes = service.download(&id).await.unwrap();
        assert!(!bytes.is_empty());
        assert!(service.download(&id).await.unwrap_err().is_job_gone());
        assert!(service.status(&id).await.unwrap_err().is_job_gone());
        assert!(dir_is_empty(&config.data_dir.join("uploads")));
        assert!(dir_is_empty(&config.data_dir.join("output")));
    }

    #[tokio::test]
    async fn failing_stage_marks_job_failed_and_drops_palette() {
        let config = config("fail");
        let transformer = FakeTransformer::failing_at(Stage::ApplyPalette, "Invalid data found");
        let service = TranscodeService::new(&config, Arc::new(transformer)).unwrap();
        let id = service
            .submit(b"clip", ConversionParams::default())
            .await
            .unwrap();

        let status = wait_for_state(&service, &id, JobState::Failed).await;
        assert_eq!(status.error.as_deref(), Some("Invalid data found"));
        assert_eq!(status.progress, 50);
        assert!(matches!(
            service.download(&id).await,
            Err(LoopcastError::ConversionNotReady { .. })
        ));
        let leftovers: Vec<_> = std::fs::read_dir(config.data_dir.join("output"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".palette.png"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn download_before_completion_is_not_ready() {
        let config = config("gated");
        let transformer = FakeTransformer::gated();
        let gate = transformer.gate();
        let service = TranscodeService::new(&config, Arc::new(transformer)).unwrap();
        let id = service
            .submit(
                b"clip",
                ConversionParams {
                    quality: QualityTier::Low,
                    ..ConversionParams::default()
                },
            )
            .await
            .unwrap();

        for _ in 0..400 {
            if service.status(&id).await.unwrap().progress == 50 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(matches!(
            service.download(&id).await,
            Err(LoopcastError::ConversionNotReady { .. })
        ));
        gate.add_permits(1);
        wait_for_state(&service, &id, JobState::Completed).await;
    }

    #[tokio::test]
    async fn sweep_reclaims_processing_jobs_and_orphans_are_removed() {
        let config = config("sweep");
        let transformer = FakeTransformer::gated();
        let gate = transformer.gate();
        let service = TranscodeService::new(&config, Arc::new(transformer)).unwrap();
        let id = service
            .submit(b"clip", ConversionParams::default())
            .await
            .unwrap();
        for _ in 0..400 {
            if service.status(&id).await.unwrap().progress == 50 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(service.sweep(Instant::now()).await, 0);
        let removed = service
            .sweep(Instant::now() + Duration::from_secs(3601))
            .await;
        assert_eq!(removed, 1);
        assert!(service.status(&id).await.unwrap_err().is_job_gone());
        assert!(service.download(&id).await.unwrap_err().is_job_gone());

        // Let the stalled conversion finish; it must clean up after itself.
        gate.add_permits(1);
        let output = config.data_dir.join("output");
        for _ in 0..400 {
            if dir_is_empty(&output) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(dir_is_empty(&output));
        assert_eq!(service.health().await.active_jobs, 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let config = config("delete");
        let service = TranscodeService::new(&config, Arc::new(FakeTransformer::new())).unwrap();
        let id = service
            .submit(b"clip", ConversionParams::default())
            .await
            .unwrap();
        service.delete(&id).await;
        service.delete(&id).await;
        service.delete("never-existed").await;
        assert!(service.status(&id).await.unwrap_err().is_job_gone());
    }
}
