//! Store configuration.
//!
//! # Responsibility
//! - Describe which backend to open and where its data lives.
//! - Load that description from TOML or build it in code.
//!
//! # Invariants
//! - Every field has a default; an empty TOML file is a valid config.
//! - `validate` runs on every load path before a store is opened.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_SQLITE_FILE: &str = "licensedb.sqlite3";
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Which storage engine a `Database` opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Json,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io { path: String, message: String },
    Parse { path: String, message: String },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "cannot read config `{path}`: {message}"),
            Self::Parse { path, message } => write!(f, "invalid config `{path}`: {message}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Where and how the store keeps its collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Directory holding collection files (json) or the database file.
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir` (sqlite only).
    pub sqlite_file: String,
    /// How long a writer waits for a held collection lock.
    pub lock_timeout_ms: u64,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Json,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            sqlite_file: DEFAULT_SQLITE_FILE.to_string(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            log_level: None,
            log_dir: None,
        }
    }
}

impl StoreConfig {
    /// Flat-file store rooted at `data_dir`.
    pub fn json(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// SQLite store whose database file lives in `data_dir`.
    pub fn sqlite(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Sqlite,
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::parse(&raw, &path.display().to_string())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw, "<inline>")
    }

    fn parse(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|err| ConfigError::Parse {
            path: origin.to_string(),
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".to_string()));
        }
        if self.backend == BackendKind::Sqlite && self.sqlite_file.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "sqlite_file must not be empty for the sqlite backend".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join(&self.sqlite_file)
    }
}
