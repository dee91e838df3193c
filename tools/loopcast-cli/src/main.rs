//! loopcast CLI
//!
//! Usage:
//!   loopcast serve               Run the transcode job service
//!   loopcast native-host         Speak the framed protocol on stdin/stdout
//!   loopcast record              Record the focused window until Ctrl+C
//!   loopcast convert <CLIP>      Convert an existing clip into a GIF
//!   loopcast status <JOB_ID>     Show a job's status
//!   loopcast check               Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use loopcast_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "loopcast",
    about = "Record a window with a synthetic cursor and turn it into a looping GIF",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Job service base URL (overrides the config file)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the transcode job service
    Serve {
        /// Address to bind, e.g. 0.0.0.0:3003
        #[arg(long)]
        bind: Option<String>,

        /// Directory for uploads and converted output
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Run as a browser native-messaging host
    NativeHost,

    /// Record the focused window until Ctrl+C
    Record {
        /// Seconds to wait before starting, to focus the target window
        #[arg(long, default_value = "3")]
        delay: u64,
    },

    /// Upload an existing clip and deliver the converted GIF
    Convert {
        /// Path to a .webm or .mp4 clip
        clip: PathBuf,

        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Output width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Quality tier: low|medium|high
        #[arg(long)]
        quality: Option<String>,

        /// Label used in the delivered file name
        #[arg(long, default_value = "recording")]
        label: String,
    },

    /// Show a job's status
    Status {
        /// Job id returned by the service
        job_id: String,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if let Some(server) = cli.server {
        config.client.server_url = server;
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if matches!(cli.command, Commands::NativeHost) && config.logging.file.is_none() {
        // stdout carries the framing protocol.
        config.logging.file = Some(config.client.delivery_dir.join("loopcast.log"));
    }
    loopcast_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Serve { bind, data_dir } => commands::serve::run(config, bind, data_dir).await,
        Commands::NativeHost => commands::native_host::run(config).await,
        Commands::Record { delay } => commands::record::run(config, delay).await,
        Commands::Convert {
            clip,
            fps,
            width,
            quality,
            label,
        } => commands::convert::run(config, clip, fps, width, quality, label).await,
        Commands::Status { job_id } => commands::status::run(config, job_id).await,
        Commands::Check => commands::check::run(config),
    }
}
