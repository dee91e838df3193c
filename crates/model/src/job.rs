//! Transcode job lifecycle and quality tiers.
//!
//! A job starts `processing` at progress 0. Progress never decreases, and
//! once the job reaches `completed` or `failed` nothing about it changes
//! again. [`Job::apply`] is the only mutator and enforces both rules.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Server-side job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dithering applied when mapping frames onto the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DitherAlgorithm {
    None,
    /// Ordered dithering.
    Bayer,
    /// Error-diffusion dithering.
    Sierra2_4a,
}

impl DitherAlgorithm {
    /// Value of ffmpeg's `paletteuse=dither=` option.
    pub fn ffmpeg_arg(self) -> &'static str {
        match self {
            DitherAlgorithm::None => "none",
            DitherAlgorithm::Bayer => "bayer:bayer_scale=3",
            DitherAlgorithm::Sierra2_4a => "sierra2_4a",
        }
    }
}

/// Palette size and dither pair derived from a quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteSettings {
    pub max_colors: u16,
    pub dither: DitherAlgorithm,
}

/// Output quality tier requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityTier {
    /// Parse a tier name; anything unrecognized is `Medium`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => QualityTier::Low,
            "high" => QualityTier::High,
            _ => QualityTier::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }

    pub fn palette(self) -> PaletteSettings {
        match self {
            QualityTier::Low => PaletteSettings {
                max_colors: 128,
                dither: DitherAlgorithm::None,
            },
            QualityTier::Medium => PaletteSettings {
                max_colors: 256,
                dither: DitherAlgorithm::Bayer,
            },
            QualityTier::High => PaletteSettings {
                max_colors: 256,
                dither: DitherAlgorithm::Sierra2_4a,
            },
        }
    }
}

/// Parameters of one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionParams {
    pub fps: u32,
    pub width: u32,
    pub quality: QualityTier,
}

impl Default for ConversionParams {
    fn default() -> Self {
        Self {
            fps: 10,
            width: 720,
            quality: QualityTier::Medium,
        }
    }
}

/// A mutation reported by the conversion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    Progress(u8),
    Completed,
    Failed(String),
}

/// Why [`Job::apply`] refused an update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectedUpdate {
    #[error("job is already {0}")]
    AlreadyTerminal(JobState),

    #[error("progress would go backwards: {current} -> {requested}")]
    Regression { current: u8, requested: u8 },
}

/// One transcode request.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub state: JobState,
    pub progress: u8,
    pub params: ConversionParams,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub created_at: Instant,
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        params: ConversionParams,
        input_path: PathBuf,
        output_path: PathBuf,
    ) -> Self {
        Self {
            id: id.into(),
            state: JobState::Processing,
            progress: 0,
            params,
            input_path,
            output_path,
            created_at: Instant::now(),
            error: None,
        }
    }

    /// Apply a pipeline update, refusing anything that would break the
    /// monotonic-progress or terminal-once rules.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), RejectedUpdate> {
        if self.state.is_terminal() {
            return Err(RejectedUpdate::AlreadyTerminal(self.state));
        }
        match update {
            JobUpdate::Progress(requested) => {
                let requested = requested.min(100);
                if requested < self.progress {
                    return Err(RejectedUpdate::Regression {
                        current: self.progress,
                        requested,
                    });
                }
                self.progress = requested;
            }
            JobUpdate::Completed => {
                self.progress = 100;
                self.state = JobState::Completed;
            }
            JobUpdate::Failed(message) => {
                self.state = JobState::Failed;
                self.error = Some(message);
            }
        }
        Ok(())
    }

    /// Whether the job is older than `ttl` at `now`, whatever its state.
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}
