//! Job service API seam and its HTTP implementation.

use async_trait::async_trait;
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_model::job::ConversionParams;
use loopcast_model::wire::{ApiError, CleanupResponse, ConvertResponse, StatusResponse};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

use crate::ClipUpload;

/// Operations of the transcode job service, as seen by a client.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Upload a clip and start its conversion. Returns the job id.
    async fn submit(&self, clip: ClipUpload, params: ConversionParams) -> LoopcastResult<String>;

    /// Current job status. `JobNotFound` once reclaimed.
    async fn status(&self, job_id: &str) -> LoopcastResult<StatusResponse>;

    /// Fetch the artifact; the service reclaims the job afterwards.
    async fn download(&self, job_id: &str) -> LoopcastResult<Vec<u8>>;

    /// Explicit reclaim. Idempotent.
    async fn delete(&self, job_id: &str) -> LoopcastResult<()>;
}

/// [`JobApi`] over the service's HTTP routes.
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJobClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Pull the `{"error": …}` message out of a failed response.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ApiError>().await {
        Ok(body) => body.error,
        Err(_) => format!("HTTP {status}"),
    }
}

#[async_trait]
impl JobApi for HttpJobClient {
    async fn submit(&self, clip: ClipUpload, params: ConversionParams) -> LoopcastResult<String> {
        let size = clip.bytes.len();
        let part = Part::bytes(clip.bytes)
            .file_name(clip.file_name)
            .mime_str(&clip.mime)
            .map_err(|e| LoopcastError::upload(e.to_string()))?;
        let form = Form::new()
            .part("video", part)
            .text("fps", params.fps.to_string())
            .text("width", params.width.to_string())
            .text("quality", params.quality.as_str().to_string());

        tracing::debug!(bytes = size, url = %self.url("/convert"), "Uploading clip");
        let response = self
            .client
            .post(self.url("/convert"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| LoopcastError::upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LoopcastError::upload(error_message(response).await));
        }
        let body: ConvertResponse = response
            .json()
            .await
            .map_err(|e| LoopcastError::upload(format!("invalid convert response: {e}")))?;
        Ok(body.job_id)
    }

    async fn status(&self, job_id: &str) -> LoopcastResult<StatusResponse> {
        let response = self
            .client
            .get(self.url(&format!("/status/{job_id}")))
            .send()
            .await
            .map_err(|e| LoopcastError::upload(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(LoopcastError::job_not_found(job_id)),
            s if s.is_success() => response
                .json()
                .await
                .map_err(|e| LoopcastError::upload(format!("invalid status response: {e}"))),
            _ => Err(LoopcastError::upload(error_message(response).await)),
        }
    }

    async fn download(&self, job_id: &str) -> LoopcastResult<Vec<u8>> {
        let response = self
            .client
            .get(self.url(&format!("/download/{job_id}")))
            .send()
            .await
            .map_err(|e| LoopcastError::upload(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(LoopcastError::job_not_found(job_id)),
            StatusCode::BAD_REQUEST => Err(LoopcastError::not_ready(job_id)),
            s if s.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| LoopcastError::upload(e.to_string()))?;
                Ok(bytes.to_vec())
            }
            _ => Err(LoopcastError::upload(error_message(response).await)),
        }
    }

    async fn delete(&self, job_id: &str) -> LoopcastResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/cleanup/{job_id}")))
            .send()
            .await
            .map_err(|e| LoopcastError::upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LoopcastError::upload(error_message(response).await));
        }
        let body: CleanupResponse = response
            .json()
            .await
            .map_err(|e| LoopcastError::upload(e.to_string()))?;
        tracing::debug!(job_id, message = %body.message, "Job cleaned up");
        Ok(())
    }
}
