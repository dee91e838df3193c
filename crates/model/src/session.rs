//! Recording session state machine.
//!
//! One [`Session`] exists per coordinator. Its [`SessionState`] only moves
//! along the edges listed in [`SessionState::can_transition_to`]; anything
//! else is an invalid transition that callers must reject and log.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target::{CaptureTarget, SurfaceId};

/// Coordinator session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    /// No capture in progress; ready for a start request.
    Idle,
    /// Target validated, waiting for the capture stream.
    AwaitingTarget,
    /// Frames are being composited and encoded.
    Recording,
    /// The compositor is finalizing the clip.
    Stopping,
    /// The clip is being handed to the job service.
    Uploading,
    /// The job service is transcoding; the coordinator polls.
    Converting,
    /// Artifact delivered.
    Done,
    /// Terminal failure with a human-readable reason.
    Error(String),
}

impl SessionState {
    /// Short, stable name used in logs and status notifications.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingTarget => "awaiting_target",
            SessionState::Recording => "recording",
            SessionState::Stopping => "stopping",
            SessionState::Uploading => "uploading",
            SessionState::Converting => "converting",
            SessionState::Done => "done",
            SessionState::Error(_) => "error",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Idle, AwaitingTarget) => true,
            (AwaitingTarget, Recording) => true,
            (Recording, Stopping) => true,
            (Stopping, Uploading) => true,
            (Uploading, Converting) => true,
            (Converting, Done) => true,
            (AwaitingTarget | Recording | Stopping | Uploading | Converting, Error(_)) => true,
            (Done | Error(_), Idle) => true,
            (Idle, _)
            | (AwaitingTarget, _)
            | (Recording, _)
            | (Stopping, _)
            | (Uploading, _)
            | (Converting, _)
            | (Done, _)
            | (Error(_), _) => false,
        }
    }

    /// Whether a capture or its post-processing currently owns the session.
    ///
    /// Start requests are only accepted when this is false.
    pub fn is_busy(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }

    /// Whether this is a terminal outcome (`Done` or `Error`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Error(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Error(reason) => write!(f, "error({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// One recording attempt, start to terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session identifier.
    pub id: String,

    /// Current state.
    pub state: SessionState,

    /// The surface being recorded, once validated.
    pub capture_target: Option<CaptureTarget>,

    /// The control/status surface; never recordable.
    pub monitor_surface: Option<SurfaceId>,

    /// When the capture stream was acquired.
    pub started_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A fresh idle session.
    pub fn new(id: impl Into<String>, monitor_surface: Option<SurfaceId>) -> Self {
        Self {
            id: id.into(),
            state: SessionState::Idle,
            capture_target: None,
            monitor_surface,
            started_at: None,
        }
    }
}

/// Status update emitted to the monitor surface on every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusNotification {
    /// Session the update belongs to.
    pub session_id: Option<String>,

    /// State after the transition.
    #[serde(flatten)]
    pub state: SessionState,

    /// Human-readable message for the monitor surface.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conversion progress while `Converting`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    /// Delivered artifact on `Done`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl StatusNotification {
    pub fn new(session_id: Option<String>, state: SessionState) -> Self {
        Self {
            session_id,
            state,
            message: None,
            progress: None,
            artifact: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_artifact(mut self, artifact: PathBuf) -> Self {
        self.artifact = Some(artifact);
        self
    }
}
