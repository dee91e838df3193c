//! Run the transcode job service.

use std::path::PathBuf;
use std::sync::Arc;

use loopcast_common::config::AppConfig;
use loopcast_transcode_service::FfmpegTransformer;

pub async fn run(
    mut config: AppConfig,
    bind: Option<String>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.service.bind_addr = bind;
    }
    if let Some(dir) = data_dir {
        config.service.data_dir = dir;
    }

    println!("loopcast job service");
    println!("  Bind: {}", config.service.bind_addr);
    println!("  Data: {}", config.service.data_dir.display());
    println!("  Job TTL: {}s", config.service.job_ttl_secs);
    println!();

    let transformer = Arc::new(FfmpegTransformer::new(config.service.ffmpeg_path.clone()));
    loopcast_transcode_service::serve(&config.service, transformer).await?;
    Ok(())
}
