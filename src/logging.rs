//! Tracing subscriber setup for the `imep` binary.
//!
//! Logs always go to stderr. When a log directory is configured a
//! daily-rolling file is written as well, through a non-blocking writer
//! whose guard must live until shutdown.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{Result, ServiceError};

/// File name prefix of the rolling log files.
const LOG_FILE_PREFIX: &str = "imep.log";

/// Install the global subscriber. `RUST_LOG` overrides `config.level`.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a subscriber
/// is already installed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let Some(dir) = &config.directory else {
        tracing_subscriber::registry()
            .with(stderr)
            .try_init()
            .map_err(|e| ServiceError::Config(format!("logging init failed: {e}")))?;
        return Ok(None);
    };

    std::fs::create_dir_all(dir)?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
    let file = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter());
    tracing_subscriber::registry()
        .with(stderr)
        .with(file)
        .try_init()
        .map_err(|e| ServiceError::Config(format!("logging init failed: {e}")))?;
    Ok(Some(guard))
}
