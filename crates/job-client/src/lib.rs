//! loopcast job client
//!
//! Everything a capture context does after a clip is finalized:
//! - **Api:** the [`JobApi`] seam and its HTTP implementation
//! - **Poll:** fixed-interval status polling until a terminal outcome
//! - **Deliver:** writing the artifact under the naming convention
//!
//! [`convert_and_deliver`] strings the three together.

pub mod api;
pub mod deliver;
pub mod poll;

use std::path::{Path, PathBuf};
use std::time::Duration;

use loopcast_common::error::LoopcastResult;
use loopcast_model::job::ConversionParams;

pub use api::{HttpJobClient, JobApi};
pub use deliver::deliver_artifact;
pub use poll::poll_until_terminal;

/// Post-capture stage reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipProgress {
    /// The clip is being sent to the job service.
    Uploading,
    /// The job was accepted under this id.
    Accepted,
    /// Latest observed conversion progress.
    Converting(u8),
}

/// An encoded clip ready for upload.
#[derive(Debug, Clone)]
pub struct ClipUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime: String,
}

impl ClipUpload {
    pub fn webm(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: "recording.webm".to_string(),
            mime: "video/webm".to_string(),
        }
    }

    pub fn mp4(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: "recording.mp4".to_string(),
            mime: "video/mp4".to_string(),
        }
    }
}

/// Upload `clip`, poll until the job is terminal, download the artifact
/// and deliver it into `delivery_dir` under `label`.
///
/// The job is reclaimed server-side by the download itself; on failure
/// paths the client asks for an explicit cleanup.
pub async fn convert_and_deliver(
    api: &dyn JobApi,
    clip: ClipUpload,
    params: ConversionParams,
    label: &str,
    delivery_dir: &Path,
    poll_interval: Duration,
    mut on_progress: impl FnMut(ClipProgress) + Send,
) -> LoopcastResult<PathBuf> {
    on_progress(ClipProgress::Uploading);
    let job_id = api.submit(clip, params).await?;
    tracing::info!(job_id = %job_id, "Clip accepted by job service");
    on_progress(ClipProgress::Accepted);

    let outcome = poll_until_terminal(api, &job_id, poll_interval, |p| {
        on_progress(ClipProgress::Converting(p))
    })
    .await;
    if let Err(e) = outcome {
        if !e.is_job_gone() {
            if let Err(cleanup) = api.delete(&job_id).await {
                tracing::debug!(job_id = %job_id, error = %cleanup, "Cleanup after failure failed");
            }
        }
        return Err(e);
    }

    let bytes = api.download(&job_id).await?;
    deliver_artifact(&bytes, delivery_dir, label, &chrono::Local::now()).await
}
