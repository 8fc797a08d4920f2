//! Runtime configuration for the goal graph core.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.
//! - `validate()` runs on every load path before the config is returned.

use crate::service::visibility::DEFAULT_VISIBILITY_DEPTH;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_VISIBILITY_DEPTH: u32 = 64;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_LOG_FILES: usize = 5;

/// Store, traversal and logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphConfig {
    /// Database file. `None` opens a private in-memory graph.
    pub db_path: Option<PathBuf>,
    /// Maximum edge hops followed by visibility queries.
    pub visibility_depth: u32,
    /// Deadline applied to each service call when the caller passes none.
    pub op_timeout_ms: Option<u64>,
    /// How long a write waits for another writer's lock.
    pub busy_timeout_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            visibility_depth: DEFAULT_VISIBILITY_DEPTH,
            op_timeout_ms: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            logging: LoggingConfig::default(),
        }
    }
}

/// File logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files. `None` leaves logging off.
    pub log_dir: Option<PathBuf>,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: None,
            max_file_size_bytes: DEFAULT_MAX_LOG_FILE_SIZE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

impl GraphConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.visibility_depth == 0 || self.visibility_depth > MAX_VISIBILITY_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "visibility_depth must be within 1..={MAX_VISIBILITY_DEPTH}, got {}",
                self.visibility_depth
            )));
        }
        if self.op_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "op_timeout_ms must be positive when set".to_string(),
            ));
        }
        if self.logging.max_files == 0 {
            return Err(ConfigError::Invalid(
                "logging.max_files must be at least 1".to_string(),
            ));
        }
        if self.logging.max_file_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "logging.max_file_size_bytes must be positive".to_string(),
            ));
        }
        crate::logging::normalize_level(&self.logging.level).map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn op_timeout(&self) -> Option<Duration> {
        self.op_timeout_ms.map(Duration::from_millis)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Errors from loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "cannot parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}
