use anyhow::{Context, Result};
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info,rag_memory_agent=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    /// Anything other than `json` falls back to pretty output.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(if s.trim().eq_ignore_ascii_case("json") { Self::Json } else { Self::Pretty })
    }
}

/// Installs the global subscriber: stderr plus a daily-rolling
/// `<directory>/agent.*.log` file.
///
/// `RUST_LOG` selects the filter and `LOG_FORMAT` overrides the configured
/// format. The returned guard flushes the file writer on drop and must be
/// held for the life of the process.
pub fn init_logger(config: &LoggingConfig) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Invalid log filter")?;

    let format = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| config.format.clone())
        .parse::<LogFormat>()
        .unwrap_or(LogFormat::Pretty);

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("agent")
        .filename_suffix("log")
        .build(&config.directory)
        .with_context(|| format!("Failed to open log directory {}", config.directory.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let (console, file) = match format {
        LogFormat::Json => (
            fmt::layer().json().with_writer(std::io::stderr).boxed(),
            fmt::layer().json().with_writer(file_writer).boxed(),
        ),
        LogFormat::Pretty => (
            fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
            fmt::layer().with_ansi(false).with_writer(file_writer).boxed(),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("Global subscriber already installed")?;

    Ok(guard)
}
