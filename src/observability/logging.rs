//! Structured logging.
//!
//! `RUST_LOG` overrides `logging.level`. When a log directory is configured,
//! events are also written to `lapollo-agent.YYYY-MM-DD` files in it, rolled
//! daily. A directory that cannot be used falls back to stdout only.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "lapollo-agent";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held
/// for the lifetime of the process.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut file_error = None;
    let appender = config.directory.as_deref().and_then(|dir| match daily_appender(dir) {
        Ok(appender) => Some(appender),
        Err(e) => {
            file_error = Some((dir.display().to_string(), e));
            None
        }
    });

    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    if let Some((directory, error)) = file_error {
        tracing::warn!(%directory, %error, "Log directory unusable, logging to stdout only");
    }
    guard
}

fn daily_appender(dir: &Path) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(dir)?;
    Ok(appender)
}
