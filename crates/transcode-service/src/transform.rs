//! Two-stage palette transform.
//!
//! Stage 1 derives a bounded palette from the clip at the requested frame
//! rate and width. Stage 2 maps every frame onto that palette with the
//! tier's dither algorithm. Stage 2 consumes stage 1's output, so the two
//! never overlap within one job.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_model::job::ConversionParams;
use tokio::process::Command;

/// Backend running the two external stages.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Stage 1: write a palette image for `input` to `palette`.
    async fn generate_palette(
        &self,
        input: &Path,
        palette: &Path,
        params: &ConversionParams,
    ) -> LoopcastResult<()>;

    /// Stage 2: write the final artifact to `output`.
    async fn apply_palette(
        &self,
        input: &Path,
        palette: &Path,
        output: &Path,
        params: &ConversionParams,
    ) -> LoopcastResult<()>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// ffmpeg `palettegen`/`paletteuse` transformer.
#[derive(Debug, Clone)]
pub struct FfmpegTransformer {
    ffmpeg: PathBuf,
}

impl FfmpegTransformer {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    async fn run(&self, stage: &str, args: Vec<String>) -> LoopcastResult<()> {
        tracing::debug!(stage, args = ?args, "Running ffmpeg");
        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LoopcastError::conversion(format!("Failed to start ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LoopcastError::conversion(format!(
                "ffmpeg {stage} failed ({}): {}",
                output.status,
                last_lines(stderr.trim(), 8)
            )));
        }
        Ok(())
    }
}

fn scale_chain(params: &ConversionParams) -> String {
    format!("fps={},scale={}:-1:flags=lanczos", params.fps, params.width)
}

/// Arguments of stage 1.
pub fn palette_args(input: &Path, palette: &Path, params: &ConversionParams) -> Vec<String> {
    let palette_settings = params.quality.palette();
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.display().to_string(),
        "-vf".into(),
        format!(
            "{},palettegen=max_colors={}",
            scale_chain(params),
            palette_settings.max_colors
        ),
        "-y".into(),
        palette.display().to_string(),
    ]
}

/// Arguments of stage 2.
pub fn gif_args(
    input: &Path,
    palette: &Path,
    output: &Path,
    params: &ConversionParams,
) -> Vec<String> {
    let dither = params.quality.palette().dither.ffmpeg_arg();
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.display().to_string(),
        "-i".into(),
        palette.display().to_string(),
        "-lavfi".into(),
        format!(
            "{} [x]; [x][1:v] paletteuse=dither={dither}",
            scale_chain(params)
        ),
        "-y".into(),
        output.display().to_string(),
    ]
}

/// ffmpeg prints its banner and stream info first; the cause is last.
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[async_trait]
impl Transformer for FfmpegTransformer {
    async fn generate_palette(
        &self,
        input: &Path,
        palette: &Path,
        params: &ConversionParams,
    ) -> LoopcastResult<()> {
        self.run("palettegen", palette_args(input, palette, params))
            .await
    }

    async fn apply_palette(
        &self,
        input: &Path,
        palette: &Path,
        output: &Path,
        params: &ConversionParams,
    ) -> LoopcastResult<()> {
        self.run("paletteuse", gif_args(input, palette, output, params))
            .await
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopcast_model::job::QualityTier;

    fn params(quality: QualityTier) -> ConversionParams {
        ConversionParams {
            fps: 10,
            width: 480,
            quality,
        }
    }

    #[test]
    fn palette_filter_uses_tier_color_count() {
        let args = palette_args(
            Path::new("/in.webm"),
            Path::new("/p.png"),
            &params(QualityTier::Low),
        );
        assert!(args.contains(
            &"fps=10,scale=480:-1:flags=lanczos,palettegen=max_colors=128".to_string()
        ));
        assert_eq!(args.last().unwrap(), "/p.png");
    }

    #[test]
    fn gif_filter_uses_tier_dither() {
        let args = gif_args(
            Path::new("/in.webm"),
            Path::new("/p.png"),
            Path::new("/out.gif"),
            &params(QualityTier::Medium),
        );
        assert!(args.contains(
            &"fps=10,scale=480:-1:flags=lanczos [x]; [x][1:v] paletteuse=dither=bayer:bayer_scale=3"
                .to_string()
        ));
        let high = gif_args(
            Path::new("/in.webm"),
            Path::new("/p.png"),
            Path::new("/out.gif"),
            &params(QualityTier::High),
        );
        assert!(high.iter().any(|a| a.ends_with("paletteuse=dither=sierra2_4a")));
    }

    #[test]
    fn last_lines_keeps_tail() {
        assert_eq!(last_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(last_lines("only", 8), "only");
    }

    #[tokio::test]
    async fn missing_binary_is_conversion_failure() {
        let t = FfmpegTransformer::new("/nonexistent/ffmpeg");
        let err = t
            .generate_palette(
                Path::new("/in"),
                Path::new("/p.png"),
                &ConversionParams::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LoopcastError::Conversion { .. }));
    }
}
