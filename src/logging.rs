//! Logging setup
//!
//! Console: INFO and below to stdout, WARN/ERROR to stderr.
//! Files (append-only, per command): `<cmd>_info.log` gets everything,
//! `<cmd>_error.log` gets WARN/ERROR.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Keeps the file writers flushing; drop at exit
#[must_use]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Paths of the two log files of a command
pub fn log_paths(log_dir: &Path, command: &str) -> (PathBuf, PathBuf) {
    (
        log_dir.join(format!("{command}_info.log")),
        log_dir.join(format!("{command}_error.log")),
    )
}

fn open_append(path: &Path) -> Result<File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Install the global subscriber. `RUST_LOG` directives, when set, refine `level`.
pub fn init(level: LogLevel, log_dir: &Path, command: &str) -> Result<LogGuards> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let (info_path, error_path) = log_paths(log_dir, command);
    let (info_writer, info_guard) = tracing_appender::non_blocking(open_append(&info_path)?);
    let (error_writer, error_guard) = tracing_appender::non_blocking(open_append(&error_path)?);

    let filter = EnvFilter::builder()
        .with_default_directive(level.to_level_filter().into())
        .from_env_lossy();

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr.with_max_level(Level::WARN).or_else(std::io::stdout));

    let files = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(info_writer.and(error_writer.with_max_level(Level::WARN)));

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(files)
        .try_init()
        .context("Failed to install log subscriber")?;

    tracing::debug!("Logging to {:?} and {:?}", info_path, error_path);

    Ok(LogGuards {
        _guards: vec![info_guard, error_guard],
    })
}
