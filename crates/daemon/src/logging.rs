//! Tracing subscriber setup

use crate::config::LogFormat;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "tunekeeper=info";
const LOG_FILE_PREFIX: &str = "tunekeeper.log";

/// Install the global subscriber
///
/// `RUST_LOG` overrides the default filter. With `log_dir` set, a daily
/// rolling JSON file is written next to stdout; keep the returned guard
/// alive until exit or buffered lines are lost.
pub fn init(format: LogFormat, log_dir: Option<&str>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    match format {
        // Production: JSON structured logging
        LogFormat::Json => registry
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install tracing subscriber")?,
        // Development: pretty formatting with colors
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty())
            .try_init()
            .context("Failed to install tracing subscriber")?,
    }

    Ok(guard)
}
