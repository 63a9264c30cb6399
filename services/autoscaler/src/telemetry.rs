//! Logging setup.
//!
//! Log lines go to stderr and to a daily-rotated file. `RUST_LOG` overrides
//! the configured level.

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

/// Prefix of the rotated log file names.
pub const LOG_FILE_PREFIX: &str = "autoscaler";

/// Console-only subscriber used until the config has been read, so that
/// usage and config errors are still reported.
pub fn bootstrap_subscriber() -> impl Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(LevelFilter::INFO)
        .finish()
}

/// Install the global subscriber. The returned guard flushes the file writer
/// on drop and must be held for the life of the process.
pub fn init(logging: &LoggingConfig) -> Result<WorkerGuard> {
    let (subscriber, guard) = build(logging)?;
    subscriber
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Build the console + rotating file subscriber without installing it.
pub fn build(logging: &LoggingConfig) -> Result<(impl Subscriber + Send + Sync, WorkerGuard)> {
    let level = logging
        .level_filter()
        .with_context(|| format!("invalid log level {:?}", logging.level))?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    std::fs::create_dir_all(&logging.directory).with_context(|| {
        format!("Failed to create log directory {}", logging.directory.display())
    })?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(logging.retention_days)
        .build(&logging.directory)
        .context("Failed to create rolling log file")?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(logging.format, std::io::stderr, true))
        .with(fmt_layer(logging.format, file_writer, false));

    Ok((subscriber, guard))
}

fn fmt_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);

    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}
