//! Upload an existing clip, wait for the job, deliver the GIF.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use loopcast_common::config::AppConfig;
use loopcast_job_client::{convert_and_deliver, ClipProgress, ClipUpload, HttpJobClient};
use loopcast_model::job::{ConversionParams, QualityTier};

pub async fn run(
    config: AppConfig,
    clip: PathBuf,
    fps: Option<u32>,
    width: Option<u32>,
    quality: Option<String>,
    label: String,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&clip).await?;
    let upload = match clip.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("mp4") => ClipUpload::mp4(bytes),
        _ => ClipUpload::webm(bytes),
    };
    let params = ConversionParams {
        fps: fps.unwrap_or(config.recording.fps).max(1),
        width: width.unwrap_or(config.recording.width).max(1),
        quality: QualityTier::from_name(quality.as_deref().unwrap_or(&config.recording.quality)),
    };

    println!("Converting {}", clip.display());
    println!(
        "  fps={} width={} quality={}",
        params.fps,
        params.width,
        params.quality.as_str()
    );

    let client = Arc::new(HttpJobClient::new(config.client.server_url.clone()));
    let delivered = convert_and_deliver(
        client.as_ref(),
        upload,
        params,
        &label,
        &config.client.delivery_dir,
        Duration::from_millis(config.client.poll_interval_ms.max(1)),
        |progress| match progress {
            ClipProgress::Uploading => println!("  uploading..."),
            ClipProgress::Accepted => println!("  accepted"),
            ClipProgress::Converting(p) => println!("  converting {p}%"),
        },
    )
    .await?;

    println!("Saved to {}", delivered.display());
    Ok(())
}
