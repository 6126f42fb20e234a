//! Tracing configuration and log routing.
//!
//! Logs go to stdout using a compact formatter and to `<log_dir>/run_<timestamp>/app.log`,
//! one directory per process run. A non‑blocking writer keeps file I/O off request paths.
use std::path::{Path, PathBuf};

use time::{OffsetDateTime, macros::format_description};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_NAME: &str = "app.log";

/// Configure tracing subscribers for stdout and file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Installs a compact stdout layer and, when the run directory can be created, a file layer.
/// - Returns the writer guard; hold it for the process lifetime so buffered lines are flushed.
pub fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    if let Some((writer, guard, path)) = configure_file_writer(log_dir) {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).init();
        tracing::info!(path = %path.display(), "File logging enabled");
        Some(guard)
    } else {
        registry.init();
        None
    }
}

/// Directory for this run's log file.
pub fn run_directory(log_dir: &Path, started_at: OffsetDateTime) -> PathBuf {
    let stamp = started_at
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| started_at.unix_timestamp().to_string());
    log_dir.join(format!("run_{stamp}"))
}

/// Build a non‑blocking writer for file logging.
///
/// Returns `None` when the run directory cannot be created.
fn configure_file_writer(log_dir: &Path) -> Option<(NonBlocking, WorkerGuard, PathBuf)> {
    let started_at = OffsetDateTime::now_utc();
    let run_dir = run_directory(log_dir, started_at);
    if let Err(err) = std::fs::create_dir_all(&run_dir) {
        eprintln!("Failed to create log directory {}: {err}", run_dir.display());
        return None;
    }
    let file_appender = tracing_appender::rolling::never(&run_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    Some((non_blocking, guard, run_dir.join(LOG_FILE_NAME)))
}
