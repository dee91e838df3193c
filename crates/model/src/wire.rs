//! JSON bodies of the job service HTTP API.

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobState};

/// `POST /convert` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub job_id: String,
    pub status: JobState,
    #[serde(default)]
    pub message: String,
}

impl ConvertResponse {
    pub fn started(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobState::Processing,
            message: "Conversion started".to_string(),
        }
    }
}

/// `GET /status/{jobId}` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobState,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for StatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.state,
            progress: job.progress,
            error: job.error.clone(),
        }
    }
}

/// `GET /health` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub active_jobs: usize,
    /// Process uptime in seconds.
    pub uptime: f64,
}

/// `DELETE /cleanup/{jobId}` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub message: String,
}

impl Default for CleanupResponse {
    fn default() -> Self {
        Self {
            message: "Cleaned up successfully".to_string(),
        }
    }
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_response_uses_camel_case() {
        let json = serde_json::to_value(ConvertResponse::started("ab12")).unwrap();
        assert_eq!(json["jobId"], "ab12");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["message"], "Conversion started");
    }

    #[test]
    fn status_omits_absent_error() {
        let body = StatusResponse {
            job_id: "x".into(),
            status: JobState::Completed,
            progress: 100,
            error: None,
        };
        let text = serde_json::to_string(&body).unwrap();
        assert_eq!(text, r#"{"jobId":"x","status":"completed","progress":100}"#);
    }

    #[test]
    fn health_parses() {
        let health: HealthResponse =
            serde_json::from_str(r#"{"status":"ok","activeJobs":2,"uptime":12.5}"#).unwrap();
        assert_eq!(health.active_jobs, 2);
    }
}
