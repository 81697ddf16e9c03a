use chrono::Local;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Logs to stdout and to `<log_dir>/<prefix>_<YYYYmmdd_HHMMSS>.log`.
/// `RUST_LOG` overrides the default `info` filter for both. Keep the
/// returned guard alive for as long as the file should be written.
pub fn configure_logging(log_dir: &Path, prefix: &str) -> io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_name = format!("{}_{}.log", prefix, Local::now().format("%Y%m%d_%H%M%S"));
    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_log = fmt::layer()
        .with_writer(io::stdout)
        .with_filter(env_filter());

    let file_log = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(env_filter());

    tracing_subscriber::Registry::default()
        .with(stdout_log)
        .with(file_log)
        .init();

    Ok(guard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
