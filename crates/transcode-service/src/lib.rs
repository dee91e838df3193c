//! loopcast Transcode Job Service
//!
//! Accepts uploaded clips, converts each into a palette-based GIF with a
//! two-stage external transform, and exposes poll-based status over HTTP.
//! Jobs live in memory for a bounded time:
//!
//! - **Store:** the job table and its atomic take/remove operations
//! - **Transform:** the [`Transformer`] seam and the ffmpeg implementation
//! - **Service:** submit/status/download/delete and the TTL sweeper
//! - **Http:** the axum router

pub mod http;
pub mod service;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transform;

use std::sync::Arc;
use std::time::Duration;

use loopcast_common::config::ServiceConfig;
use loopcast_common::error::LoopcastResult;

pub use http::build_router;
pub use service::TranscodeService;
pub use transform::{FfmpegTransformer, Transformer};

/// Run the service on `config.bind_addr` until Ctrl-C.
pub async fn serve(config: &ServiceConfig, transformer: Arc<dyn Transformer>) -> LoopcastResult<()> {
    let service = Arc::new(TranscodeService::new(config, transformer)?);
    let sweeper = service.spawn_sweeper(Duration::from_secs(config.sweep_interval_secs.max(1)));
    let app = build_router(service, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Transcode service listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await;
    sweeper.abort();
    result?;
    Ok(())
}
