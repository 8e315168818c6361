//! Process configuration read from the environment.
//!
//! # Invariants
//! - Every setting has a default; an unset variable is never an error.
//! - Blank values count as unset.
//! - `log_dir` is always absolute once resolved.

use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DB_PATH_VAR: &str = "NINJA_DB_PATH";
pub const LOG_LEVEL_VAR: &str = "NINJA_LOG_LEVEL";
pub const LOG_DIR_VAR: &str = "NINJA_LOG_DIR";

const DEFAULT_DB_FILE: &str = "ninja.sqlite3";
const DEFAULT_LOG_DIR: &str = "logs";

/// Configuration resolution error.
#[derive(Debug)]
pub enum ConfigError {
    /// Working directory is needed to resolve a default and is unavailable.
    WorkingDir(std::io::Error),
    /// Variable is set but cannot be used.
    Invalid { var: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorkingDir(err) => write!(f, "cannot resolve working directory: {err}"),
            Self::Invalid { var, reason } => write!(f, "invalid `{var}`: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::WorkingDir(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

/// Settings shared by the CLI and the walkthrough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads configuration through `lookup`, relative paths resolved
    /// against the current working directory.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::WorkingDir)?;
        let read = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let db_path = read(DB_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));

        let log_level = match read(LOG_LEVEL_VAR) {
            Some(level) => validate_level(&level)?,
            None => default_log_level().to_string(),
        };

        let log_dir = read(LOG_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
        let log_dir = if log_dir.is_absolute() {
            log_dir
        } else {
            cwd.join(log_dir)
        };

        Ok(Self {
            db_path,
            log_level,
            log_dir,
        })
    }

    /// `log_dir` as UTF-8, as required by `init_logging`.
    pub fn log_dir_str(&self) -> Result<&str, ConfigError> {
        self.log_dir.to_str().ok_or_else(|| ConfigError::Invalid {
            var: LOG_DIR_VAR,
            reason: "path is not valid UTF-8".to_string(),
        })
    }
}

fn validate_level(level: &str) -> Result<String, ConfigError> {
    let lowered = level.to_ascii_lowercase();
    match lowered.as_str() {
        "trace" | "debug" | "info" | "warn" | "warning" | "error" => Ok(lowered),
        _ => Err(ConfigError::Invalid {
            var: LOG_LEVEL_VAR,
            reason: format!("unsupported log level `{level}`; expected trace|debug|info|warn|error"),
        }),
    }
}
