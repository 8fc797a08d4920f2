//! Rolling file logging for the goal graph core.
//!
//! # Responsibility
//! - Start one flexi_logger backend per process from a [`LoggingConfig`].
//! - Report what is active so hosts can surface it.
//!
//! # Invariants
//! - Repeating init with an identical level and directory is a no-op.
//! - A different level or directory after the first init is rejected.
//! - Init never panics.

use crate::config::LoggingConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::info;
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "igoal_graph";

static LOGGING_STATE: OnceCell<ActiveLogging> = OnceCell::new();

struct ActiveLogging {
    level: &'static str,
    log_dir: PathBuf,
    _handle: LoggerHandle,
}

/// Errors from logging bootstrap.
#[derive(Debug)]
pub enum LoggingError {
    /// `log_dir` was unset, blank or relative.
    InvalidDirectory(String),
    /// The level is not one of `trace|debug|info|warn|error`.
    InvalidLevel(String),
    /// Logging is already running with different settings.
    Conflict(String),
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    Backend(flexi_logger::FlexiLoggerError),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDirectory(message)
            | Self::InvalidLevel(message)
            | Self::Conflict(message) => write!(f, "{message}"),
            Self::CreateDirectory { path, source } => write!(
                f,
                "failed to create log directory `{}`: {source}",
                path.display()
            ),
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDirectory { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

/// Starts file logging as described by `config`.
///
/// # Errors
/// - [`LoggingError::InvalidDirectory`] when `log_dir` is missing or relative.
/// - [`LoggingError::Conflict`] when a different setup is already active.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let level = normalize_level(&config.level).map_err(LoggingError::InvalidLevel)?;
    let log_dir = normalize_log_dir(config.log_dir.as_deref())?;

    let state = LOGGING_STATE.get_or_try_init(|| start_backend(config, level, &log_dir))?;

    if state.log_dir != log_dir {
        return Err(LoggingError::Conflict(format!(
            "logging already initialized at `{}`; refusing to switch to `{}`",
            state.log_dir.display(),
            log_dir.display()
        )));
    }
    if state.level != level {
        return Err(LoggingError::Conflict(format!(
            "logging already initialized with level `{}`; refusing to switch to `{level}`",
            state.level
        )));
    }
    Ok(())
}

/// Returns `(level, log_dir)` of the active logger, if any.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.log_dir.clone()))
}

/// `debug` in debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

pub(crate) fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(log_dir: Option<&Path>) -> Result<PathBuf, LoggingError> {
    let Some(path) = log_dir else {
        return Err(LoggingError::InvalidDirectory(
            "log_dir must be set to enable logging".to_string(),
        ));
    };
    if path.as_os_str().is_empty() {
        return Err(LoggingError::InvalidDirectory(
            "log_dir cannot be empty".to_string(),
        ));
    }
    if !path.is_absolute() {
        return Err(LoggingError::InvalidDirectory(format!(
            "log_dir must be an absolute path, got `{}`",
            path.display()
        )));
    }
    Ok(path.to_path_buf())
}

fn start_backend(
    config: &LoggingConfig,
    level: &'static str,
    log_dir: &Path,
) -> Result<ActiveLogging, LoggingError> {
    std::fs::create_dir_all(log_dir).map_err(|source| LoggingError::CreateDirectory {
        path: log_dir.to_path_buf(),
        source,
    })?;

    let handle = Logger::try_with_str(level)
        .map_err(LoggingError::Backend)?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(config.max_file_size_bytes),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.max_files),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(LoggingError::Backend)?;

    info!(
        "event=logging_init module=core status=ok level={level} log_dir={} version={}",
        log_dir.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogging {
        level,
        log_dir: log_dir.to_path_buf(),
        _handle: handle,
    })
}
