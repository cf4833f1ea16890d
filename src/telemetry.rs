//! Logging setup for host applications.

use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::infrastructure::config::LogLevel;

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log file or its directory could not be opened.
    #[error("failed to open log file: {0}")]
    Io(#[from] std::io::Error),
    /// Another global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` overrides `level` when set. With `log_path`, events are
/// appended to that file without ANSI colors; otherwise they go to stderr.
///
/// # Errors
/// Returns error if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init_logging(level: LogLevel, log_path: Option<&Path>) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(level.to_tracing_level()).into())
    });

    if let Some(log_path) = log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .try_init()?;

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}
