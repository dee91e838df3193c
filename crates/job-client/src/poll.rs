//! Fixed-interval status polling.
//!
//! There is no push channel. The client asks at a fixed interval and
//! stops as soon as it sees `completed`, `failed`, or `JobNotFound`.
//! Any other error is retried on the next tick, up to
//! [`STATUS_RETRY_LIMIT`] in a row.

use std::time::Duration;

use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_model::job::JobState;
use loopcast_model::wire::StatusResponse;

use crate::api::JobApi;

/// Consecutive failed status requests tolerated before giving up.
pub const STATUS_RETRY_LIMIT: u32 = 5;

/// Poll `job_id` until it is terminal.
///
/// Returns the final status on `completed`. A `failed` job becomes a
/// `Conversion` error carrying the service's diagnostic; a reclaimed job
/// surfaces as `JobNotFound`.
pub async fn poll_until_terminal(
    api: &dyn JobApi,
    job_id: &str,
    interval: Duration,
    mut on_progress: impl FnMut(u8) + Send,
) -> LoopcastResult<StatusResponse> {
    let mut last_progress = None;
    let mut failures = 0u32;
    loop {
        let status = match api.status(job_id).await {
            Ok(status) => {
                failures = 0;
                status
            }
            Err(e) if e.is_job_gone() => return Err(e),
            Err(e) => {
                failures += 1;
                if failures > STATUS_RETRY_LIMIT {
                    return Err(e);
                }
                tracing::warn!(job_id, error = %e, failures, "Status request failed; retrying");
                tokio::time::sleep(interval).await;
                continue;
            }
        };
        if last_progress != Some(status.progress) {
            tracing::debug!(job_id, progress = status.progress, state = %status.status, "Job status");
            last_progress = Some(status.progress);
            on_progress(status.progress);
        }

        match status.status {
            JobState::Completed => return Ok(status),
            JobState::Failed => {
                let message = status
                    .error
                    .unwrap_or_else(|| "conversion failed".to_string());
                return Err(LoopcastError::conversion(message));
            }
            JobState::Processing => tokio::time::sleep(interval).await,
        }
    }
}
