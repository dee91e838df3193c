//! Error types shared across loopcast crates.

/// Top-level error type for loopcast operations.
///
/// Variants follow the failure stages of a recording: target selection,
/// acquisition, encoding, upload, and server-side conversion. TTL eviction
/// of a job is reported as [`LoopcastError::JobNotFound`].
#[derive(Debug, thiserror::Error)]
pub enum LoopcastError {
    #[error("Target unavailable: {message}")]
    TargetUnavailable { message: String },

    #[error("Capture acquisition failed: {message}")]
    CaptureAcquisition { message: String },

    #[error("Encode failed: {message}")]
    Encode { message: String },

    #[error("Upload failed: {message}")]
    Upload { message: String },

    #[error("Conversion failed: {message}")]
    Conversion { message: String },

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Conversion not complete: {job_id}")]
    ConversionNotReady { job_id: String },

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using LoopcastError.
pub type LoopcastResult<T> = Result<T, LoopcastError>;

impl LoopcastError {
    pub fn target_unavailable(msg: impl Into<String>) -> Self {
        Self::TargetUnavailable {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::CaptureAcquisition {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload {
            message: msg.into(),
        }
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion {
            message: msg.into(),
        }
    }

    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound {
            job_id: job_id.into(),
        }
    }

    pub fn not_ready(job_id: impl Into<String>) -> Self {
        Self::ConversionNotReady {
            job_id: job_id.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether an observer should treat this error as "the job is gone".
    ///
    /// Covers unknown ids, reclaimed jobs, and TTL eviction.
    pub fn is_job_gone(&self) -> bool {
        matches!(self, Self::JobNotFound { .. })
    }
}
