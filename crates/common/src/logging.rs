//! Tracing setup.
//!
//! Output never goes to stdout: the native host speaks its framing
//! protocol there.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` wins over `config.level`.
///
/// A log file that cannot be opened is reported on stderr and logging
/// falls back to stderr.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (writer, ansi) = match config.file.as_deref().map(open_log_file) {
        Some(Ok(file)) => (BoxMakeWriter::new(Mutex::new(file)), false),
        Some(Err((path, e))) => {
            eprintln!("loopcast: cannot open log file {path}: {e}");
            (BoxMakeWriter::new(std::io::stderr), true)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    if installed.is_err() {
        tracing::debug!("Subscriber already installed; keeping it");
    }
}

fn open_log_file(path: &Path) -> Result<std::fs::File, (String, std::io::Error)> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| (path.display().to_string(), e))
}
