//! Show a job's status.

use loopcast_common::config::AppConfig;
use loopcast_job_client::{HttpJobClient, JobApi};

pub async fn run(config: AppConfig, job_id: String) -> anyhow::Result<()> {
    let client = HttpJobClient::new(config.client.server_url);
    let status = client.status(&job_id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
