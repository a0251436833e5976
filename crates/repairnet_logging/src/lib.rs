//! Shared logging utilities for RepairNet binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "repairnet=info,repairnet_sentinel=info,repairnet_db=info";

/// Environment variable overriding the RepairNet home directory.
pub const HOME_ENV: &str = "REPAIRNET_HOME";

/// Logging configuration shared by RepairNet binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a daily-rolling file writer and stderr output.
///
/// The returned guard flushes the non-blocking file writer on drop, so the
/// caller must keep it alive for the lifetime of the process.
pub fn init_logging(config: LogConfig<'_>) -> Result<WorkerGuard> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let appender = tracing_appender::rolling::daily(&log_dir, log_file_name(config.app_name));
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Get the RepairNet home directory: ~/.repairnet
pub fn repairnet_home() -> PathBuf {
    resolve_home(std::env::var(HOME_ENV).ok(), dirs::home_dir())
}

fn resolve_home(override_path: Option<String>, home: Option<PathBuf>) -> PathBuf {
    if let Some(path) = override_path.filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(path);
    }
    home.unwrap_or_else(|| PathBuf::from(".")).join(".repairnet")
}

/// Get the logs directory: ~/.repairnet/logs
pub fn logs_dir() -> PathBuf {
    repairnet_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

fn log_file_name(app_name: &str) -> String {
    format!("{}.log", sanitize_name(app_name))
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
