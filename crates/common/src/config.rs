//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Transcode job service settings.
    pub service: ServiceConfig,

    /// Settings for talking to the job service.
    pub client: ClientConfig,

    /// Default recording settings.
    pub recording: RecordingDefaults,

    /// Capture target eligibility rules.
    pub target: TargetRules,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Transcode job service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Socket address the HTTP API binds to.
    pub bind_addr: String,

    /// Root directory for `uploads/` and `output/`.
    pub data_dir: PathBuf,

    /// Age after which a job is reclaimed regardless of state.
    pub job_ttl_secs: u64,

    /// Interval between TTL sweeps.
    pub sweep_interval_secs: u64,

    /// Largest accepted clip upload.
    pub max_upload_bytes: usize,

    /// ffmpeg binary used by both transform stages.
    pub ffmpeg_path: PathBuf,
}

/// Client-side job service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the job service.
    pub server_url: String,

    /// Fixed status polling interval.
    pub poll_interval_ms: u64,

    /// Directory finished artifacts are delivered to.
    pub delivery_dir: PathBuf,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Output frame rate requested from the converter.
    pub fps: u32,

    /// Frame rate of the composited/encoded clip.
    pub capture_fps: u32,

    /// Output width in pixels.
    pub width: u32,

    /// Quality tier name (`low`, `medium`, `high`).
    pub quality: String,
}

/// Rules deciding which surfaces may be recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetRules {
    /// URL prefixes that are never recordable.
    pub privileged_schemes: Vec<String>,

    /// Application identities that are never recordable.
    pub excluded_apps: Vec<String>,

    /// Application identities the native controller may pick.
    pub browser_allow_list: Vec<String>,

    /// Minimum window width/height for native target selection.
    pub min_window_edge: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "loopcast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path. Logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3003".to_string(),
            data_dir: dirs_default_data(),
            job_ttl_secs: 60 * 60,
            sweep_interval_secs: 60 * 60,
            max_upload_bytes: 100 * 1024 * 1024,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3003".to_string(),
            poll_interval_ms: 500,
            delivery_dir: dirs_default_downloads(),
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            fps: 10,
            capture_fps: 30,
            width: 720,
            quality: "medium".to_string(),
        }
    }
}

impl Default for TargetRules {
    fn default() -> Self {
        Self {
            privileged_schemes: [
                "chrome://",
                "chrome-extension://",
                "about:",
                "edge://",
                "devtools://",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            excluded_apps: Vec::new(),
            browser_allow_list: [
                "google-chrome",
                "google-chrome-beta",
                "google-chrome-unstable",
                "chromium",
                "chromium-browser",
                "brave-browser",
                "microsoft-edge",
                "vivaldi-stable",
                "opera",
                "arc",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            min_window_edge: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Config file (if any) plus environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_from(&config_file_path());
        config.apply_env_overrides();
        config
    }

    /// Read `path`, keeping defaults when it is missing or unparsable.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable config; using defaults");
                return Self::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Invalid config; using defaults");
            Self::default()
        })
    }

    /// Apply `PORT`, `LOOPCAST_SERVER_URL` and `LOOPCAST_DATA_DIR`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.service.bind_addr = with_port(&self.service.bind_addr, port),
                Err(_) => tracing::warn!(%port, "Ignoring non-numeric PORT"),
            }
        }
        if let Ok(url) = std::env::var("LOOPCAST_SERVER_URL") {
            self.client.server_url = url;
        }
        if let Ok(dir) = std::env::var("LOOPCAST_DATA_DIR") {
            self.service.data_dir = PathBuf::from(dir);
        }
    }
}

/// Replace the port of a `host:port` bind address.
fn with_port(bind_addr: &str, port: u16) -> String {
    let host = bind_addr
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(bind_addr);
    format!("{host}:{port}")
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("loopcast").join("config.json")
}

/// Default job service data directory.
fn dirs_default_data() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"));
    base.join("loopcast").join("jobs")
}

/// Default user-visible delivery directory.
fn dirs_default_downloads() -> PathBuf {
    std::env::var("XDG_DOWNLOAD_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join("Downloads"))
}
