//! Logging initialization for the ckg application.
//!
//! Two modes:
//! - CLI mode: logs to STDOUT for interactive commands.
//! - Hook mode: logs as JSON to a rolling file under the repository's
//!   data directory, keeping the hook's stdio clean for git.
//!
//! Hook logs roll over at 5 MB; rotated logs are compressed and at most
//! 20 are kept.

use anyhow::Result;
use file_rotate::{ContentLimit, FileRotate, compression::Compression, suffix::AppendCount};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt::writer::MakeWriterExt};

pub enum LogMode<'a> {
    Cli,
    /// Log to `<data_dir>/logs/ckg.log`, rotated.
    Hook { data_dir: &'a Path },
}

/// Guard that keeps background logging workers alive.
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

pub fn init(mode: LogMode, verbose: bool) -> Result<Option<LoggingGuards>> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match mode {
        LogMode::Cli => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            Ok(None)
        }
        LogMode::Hook { data_dir } => {
            let log_dir = data_dir.join("logs");
            std::fs::create_dir_all(&log_dir)?;

            let writer = FileRotate::new(
                log_dir.join("ckg.log"),
                AppendCount::new(20),
                ContentLimit::Bytes(5 * 1024 * 1024),
                Compression::OnRotate(1),
                None,
            );

            let (non_blocking, guard) = tracing_appender::non_blocking(writer);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking.with_max_level(tracing::Level::INFO))
                .with_ansi(false)
                .json()
                .init();

            Ok(Some(LoggingGuards {
                _guards: vec![guard],
            }))
        }
    }
}
