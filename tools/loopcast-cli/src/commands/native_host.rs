//! Framed stdio host launched by the browser.

use std::sync::Arc;

use loopcast_common::config::AppConfig;
use loopcast_job_client::HttpJobClient;
use loopcast_native_controller::{ControllerSettings, GstX11Backend, LargestAllowListed, NativeHost};

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        server = %config.client.server_url,
        delivery = %config.client.delivery_dir.display(),
        "Native host starting"
    );

    let host = NativeHost::new(
        Arc::new(GstX11Backend),
        Arc::new(LargestAllowListed::from_rules(&config.target)),
        Arc::new(HttpJobClient::new(config.client.server_url.clone())),
        ControllerSettings::from_config(&config),
    );
    host.serve(tokio::io::stdin(), tokio::io::stdout()).await?;

    tracing::info!("Native host exiting");
    Ok(())
}
