//! File logging for qdev sessions
//!
//! Stdout belongs to the headless event stream and stderr to user notices,
//! so every `tracing` record goes to a daily log file instead. Output of
//! build commands, hooks and platform tools is logged at `debug` under the
//! `qdev_daemon::output` target.

use std::path::PathBuf;

use chrono::Utc;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable holding an `EnvFilter` directive
pub const LOG_ENV: &str = "QDEV_LOG";

/// Session lifecycle at info, child process output and dependencies quiet
const DEFAULT_FILTER: &str = "qdev=info,qdev_app=info,qdev_daemon=info,warn";

const LOG_FILE_PREFIX: &str = "qdev.log";

/// Install the global subscriber writing to `<data dir>/qdev/logs/`.
///
/// ```bash
/// # everything the session does, including build command output
/// QDEV_LOG=debug qdev --mode spa
/// # only address negotiation details
/// QDEV_LOG=qdev_app::network=trace,warn qdev --mode cordova --target android
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("qdev {} logging to {}", env!("CARGO_PKG_VERSION"), log_dir.display());
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn get_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qdev")
        .join("logs")
}

/// File today's records go to; the appender rolls over at UTC midnight
pub fn get_current_log_file() -> Result<PathBuf> {
    Ok(get_log_directory().join(log_file_name(Utc::now())))
}

fn log_file_name(now: chrono::DateTime<Utc>) -> String {
    format!("{}.{}", LOG_FILE_PREFIX, now.format("%Y-%m-%d"))
}
