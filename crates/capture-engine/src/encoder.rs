//! ffmpeg-backed WebM clip encoder.
//!
//! Composited RGBA frames are piped to ffmpeg's stdin as rawvideo; the
//! WebM container is streamed back on stdout and collected by a reader
//! task, so encoded data never waits for the recording to end.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use image::RgbaImage;
use loopcast_common::error::{LoopcastError, LoopcastResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use crate::host::ClipEncoder;

/// Preferred WebM video codecs, best first.
pub const WEBM_CODECS: [&str; 2] = ["libvpx-vp9", "libvpx"];

/// Pick the best WebM codec listed in `ffmpeg -encoders` output.
pub fn pick_webm_codec(encoders_listing: &str) -> Option<&'static str> {
    WEBM_CODECS.into_iter().find(|codec| {
        encoders_listing
            .lines()
            .any(|line| line.split_whitespace().nth(1) == Some(*codec))
    })
}

/// Ask `ffmpeg` which WebM codec it supports.
pub async fn probe_webm_codec(ffmpeg: &Path) -> LoopcastResult<&'static str> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| LoopcastError::encode(format!("Failed to run {}: {e}", ffmpeg.display())))?;
    let listing = String::from_utf8_lossy(&output.stdout);
    pick_webm_codec(&listing)
        .ok_or_else(|| LoopcastError::encode("ffmpeg has neither libvpx-vp9 nor libvpx"))
}

/// Arguments for a rawvideo-in, WebM-out ffmpeg process.
pub fn encoder_args(codec: &str, width: u32, height: u32, fps: u32) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{width}x{height}"));
    args.push("-r".to_string());
    args.push(fps.max(1).to_string());
    args.extend(["-i", "pipe:0", "-c:v", codec].map(String::from));
    if codec == "libvpx-vp9" {
        args.extend(["-row-mt", "1"].map(String::from));
    }
    args.extend(
        [
            "-deadline",
            "realtime",
            "-b:v",
            "2M",
            "-pix_fmt",
            "yuv420p",
            "-flush_packets",
            "1",
            "-f",
            "webm",
            "pipe:1",
        ]
        .map(String::from),
    );
    args
}

pub struct FfmpegClipEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    collector: JoinHandle<std::io::Result<Vec<u8>>>,
    stderr: JoinHandle<String>,
    frame_len: usize,
}

impl FfmpegClipEncoder {
    /// Spawn ffmpeg for `width`x`height` frames at `fps`.
    pub async fn spawn(ffmpeg: &Path, width: u32, height: u32, fps: u32) -> LoopcastResult<Self> {
        if width == 0 || height == 0 {
            return Err(LoopcastError::encode(format!(
                "cannot encode a {width}x{height} surface"
            )));
        }
        let codec = probe_webm_codec(ffmpeg).await?;
        let args = encoder_args(codec, width, height, fps);
        tracing::debug!(?args, "Starting clip encoder");

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LoopcastError::encode(format!("Failed to start ffmpeg: {e}")))?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| LoopcastError::encode("Failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| LoopcastError::encode("Failed to capture ffmpeg stderr"))?;

        let collector = tokio::spawn(async move {
            let mut clip = Vec::new();
            let mut chunk = vec![0u8; 64 * 1024];
            loop {
                let n = stdout.read(&mut chunk).await?;
                if n == 0 {
                    return Ok(clip);
                }
                clip.extend_from_slice(&chunk[..n]);
            }
        });
        let stderr = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        tracing::info!(codec, width, height, fps, "Clip encoder started");
        Ok(Self {
            child,
            stdin,
            collector,
            stderr,
            frame_len: width as usize * height as usize * 4,
        })
    }
}

#[async_trait]
impl ClipEncoder for FfmpegClipEncoder {
    async fn push_frame(&mut self, frame: &RgbaImage) -> LoopcastResult<()> {
        let raw = frame.as_raw();
        if raw.len() != self.frame_len {
            return Err(LoopcastError::encode(format!(
                "frame is {} bytes, encoder expects {}",
                raw.len(),
                self.frame_len
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| LoopcastError::encode("encoder input already closed"))?;
        stdin
            .write_all(raw)
            .await
            .map_err(|e| LoopcastError::encode(format!("ffmpeg rejected frame: {e}")))
    }

    async fn finish(mut self: Box<Self>) -> LoopcastResult<Vec<u8>> {
        drop(self.stdin.take());
        let status = self.child.wait().await?;
        let clip = (&mut self.collector)
            .await
            .map_err(|e| LoopcastError::encode(e.to_string()))??;
        let diagnostic = (&mut self.stderr).await.unwrap_or_default();
        if !status.success() {
            return Err(LoopcastError::encode(format!(
                "ffmpeg exited with {status}: {}",
                diagnostic.trim()
            )));
        }
        Ok(clip)
    }

    async fn abort(mut self: Box<Self>) {
        drop(self.stdin.take());
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "Encoder already exited");
        }
        self.collector.abort();
        self.stderr.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Encoders:\n V..... = Video\n ------\n V....D libvpx               libvpx VP8 (codec vp8)\n V....D libvpx-vp9           libvpx VP9 (codec vp9)\n V....D libx264              libx264 H.264\n";

    #[test]
    fn prefers_vp9_then_falls_back_to_vp8() {
        assert_eq!(pick_webm_codec(LISTING), Some("libvpx-vp9"));
        let vp8_only = LISTING.replace("libvpx-vp9", "libaom-av1");
        assert_eq!(pick_webm_codec(&vp8_only), Some("libvpx"));
        assert_eq!(pick_webm_codec(" V....D libx264 H.264\n"), None);
    }

    #[test]
    fn args_describe_raw_rgba_input_and_webm_output() {
        let args = encoder_args("libvpx", 640, 480, 30);
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt rgba -s 640x480 -r 30 -i pipe:0"));
        assert!(joined.contains("-c:v libvpx "));
        assert!(!joined.contains("-row-mt"));
        assert!(joined.ends_with("-f webm pipe:1"));
        assert!(encoder_args("libvpx-vp9", 2, 2, 0).contains(&"-row-mt".to_string()));
    }
}
