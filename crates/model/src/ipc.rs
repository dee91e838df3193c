//! Native host message vocabulary.
//!
//! Each frame on the native transport carries one JSON object. Requests
//! name a `command`; replies carry a `status` tag plus optional fields.

use serde::{Deserialize, Serialize};

use std::path::PathBuf;

use crate::job::{ConversionParams, QualityTier};
use crate::session::{SessionState, StatusNotification};

/// Raw request as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RecordingOptions>,
}

impl IncomingMessage {
    pub fn command(&self) -> Command {
        Command::parse(&self.command)
    }

    pub fn options_or_default(&self) -> RecordingOptions {
        self.options.clone().unwrap_or_default()
    }
}

/// Parsed command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Ping,
    Unknown(String),
}

impl Command {
    pub fn parse(name: &str) -> Self {
        match name {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "ping" => Command::Ping,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Options attached to `start`/`stop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordingOptions {
    pub fps: u32,
    pub width: u32,
    pub quality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<ViewportInfo>,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        let params = ConversionParams::default();
        Self {
            fps: params.fps,
            width: params.width,
            quality: params.quality.as_str().to_string(),
            viewport: None,
        }
    }
}

impl RecordingOptions {
    pub fn conversion_params(&self) -> ConversionParams {
        let defaults = ConversionParams::default();
        ConversionParams {
            fps: if self.fps == 0 { defaults.fps } else { self.fps },
            width: if self.width == 0 {
                defaults.width
            } else {
                self.width
            },
            quality: QualityTier::from_name(&self.quality),
        }
    }
}

/// Browser window geometry reported alongside `start`, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportInfo {
    pub inner_width: f64,
    pub inner_height: f64,
    pub screen_x: f64,
    pub screen_y: f64,
    pub outer_width: f64,
    pub outer_height: f64,
    #[serde(default = "default_pixel_ratio")]
    pub device_pixel_ratio: f64,
}

fn default_pixel_ratio() -> f64 {
    1.0
}

/// Reply sent back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HostReply {
    Pong,
    RecordingStarted,
    Uploading { progress: u8 },
    Processing { progress: u8 },
    Complete { progress: u8, filepath: String },
    Error { error: String },
}

impl HostReply {
    pub fn error(message: impl Into<String>) -> Self {
        HostReply::Error {
            error: message.into(),
        }
    }

    pub fn complete(filepath: impl Into<String>) -> Self {
        HostReply::Complete {
            progress: 100,
            filepath: filepath.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HostReply::Complete { .. } | HostReply::Error { .. })
    }

    /// The coordinator notification equivalent to this reply.
    ///
    /// Terminal replies land on `Idle`, carrying the artifact or the error
    /// text. `pong` has no session meaning.
    pub fn to_notification(&self, session_id: Option<String>) -> Option<StatusNotification> {
        let note = match self {
            HostReply::Pong => return None,
            HostReply::RecordingStarted => StatusNotification::new(session_id, SessionState::Recording),
            HostReply::Uploading { .. } => StatusNotification::new(session_id, SessionState::Uploading),
            HostReply::Processing { progress } => {
                StatusNotification::new(session_id, SessionState::Converting)
                    .with_progress(*progress)
            }
            HostReply::Complete { progress, filepath } => {
                StatusNotification::new(session_id, SessionState::Idle)
                    .with_progress(*progress)
                    .with_artifact(PathBuf::from(filepath))
                    .with_message(format!("Saved to {filepath}"))
            }
            HostReply::Error { error } => {
                StatusNotification::new(session_id, SessionState::Idle).with_message(error.clone())
            }
        };
        Some(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_with_viewport() {
        let msg: IncomingMessage = serde_json::from_str(
            r#"{"command":"start","options":{"fps":15,"width":480,"quality":"high",
                "viewport":{"innerWidth":1200,"innerHeight":700,"screenX":10,"screenY":20,
                "outerWidth":1280,"outerHeight":800,"devicePixelRatio":2}}}"#,
        )
        .unwrap();
        assert_eq!(msg.command(), Command::Start);
        let options = msg.options_or_default();
        let viewport = options.viewport.unwrap();
        assert_eq!(viewport.screen_x, 10.0);
        assert_eq!(viewport.device_pixel_ratio, 2.0);
        let params = options.conversion_params();
        assert_eq!(params.fps, 15);
        assert_eq!(params.quality, QualityTier::High);
    }

    #[test]
    fn missing_options_use_defaults() {
        let msg: IncomingMessage = serde_json::from_str(r#"{"command":"stop"}"#).unwrap();
        assert_eq!(msg.command(), Command::Stop);
        let params = msg.options_or_default().conversion_params();
        assert_eq!((params.fps, params.width), (10, 720));
        assert_eq!(params.quality, QualityTier::Medium);
    }

    #[test]
    fn unknown_command_is_kept() {
        assert_eq!(Command::parse("rewind"), Command::Unknown("rewind".into()));
    }

    #[test]
    fn replies_forward_as_coordinator_notifications() {
        assert!(HostReply::Pong.to_notification(None).is_none());
        let started = HostReply::RecordingStarted.to_notification(None).unwrap();
        assert_eq!(started.state, SessionState::Recording);

        let processing = HostReply::Processing { progress: 40 }
            .to_notification(Some("s1".into()))
            .unwrap();
        assert_eq!(processing.state, SessionState::Converting);
        assert_eq!(processing.progress, Some(40));
        assert_eq!(processing.session_id.as_deref(), Some("s1"));

        let done = HostReply::complete("/tmp/a.gif").to_notification(None).unwrap();
        assert_eq!(done.state, SessionState::Idle);
        assert_eq!(done.artifact, Some(PathBuf::from("/tmp/a.gif")));

        let failed = HostReply::error("No active recording").to_notification(None).unwrap();
        assert_eq!(failed.state, SessionState::Idle);
        assert_eq!(failed.message.as_deref(), Some("No active recording"));
    }

    #[test]
    fn replies_are_status_tagged() {
        assert_eq!(
            serde_json::to_string(&HostReply::Pong).unwrap(),
            r#"{"status":"pong"}"#
        );
        assert_eq!(
            serde_json::to_string(&HostReply::RecordingStarted).unwrap(),
            r#"{"status":"recording_started"}"#
        );
        assert_eq!(
            serde_json::to_string(&HostReply::complete("/home/u/Downloads/a.gif")).unwrap(),
            r#"{"status":"complete","progress":100,"filepath":"/home/u/Downloads/a.gif"}"#
        );
        assert_eq!(
            serde_json::to_string(&HostReply::error("No active recording")).unwrap(),
            r#"{"status":"error","error":"No active recording"}"#
        );
    }
}
