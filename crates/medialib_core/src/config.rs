//! Library configuration model.
//!
//! # Responsibility
//! - Describe where the durable store lives and how repositories cache it.
//! - Parse and validate JSON configuration documents.
//!
//! # Invariants
//! - Unknown repository names in cache overrides are rejected at load time.
//! - File databases require a non-empty path.

use crate::repo::CacheMode;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Repository names accepted in `cache.overrides`.
pub const REPOSITORY_NAMES: &[&str] = &[
    "groups",
    "series",
    "episodes",
    "filters",
    "episode_users",
    "group_users",
];

/// Errors from loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config document: {err}"),
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

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Location of the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatabaseConfig {
    /// SQLite database file, created and migrated on open.
    File { path: PathBuf },
    /// Private in-memory SQLite database, discarded on close.
    Memory,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Per-repository cache mode selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Mode used by repositories without an override.
    pub default_mode: CacheMode,
    /// Repository name -> mode.
    pub overrides: BTreeMap<String, CacheMode>,
}

impl CacheConfig {
    /// Returns the effective mode for one repository.
    pub fn mode_for(&self, repository: &str) -> CacheMode {
        self.overrides
            .get(repository)
            .copied()
            .unwrap_or(self.default_mode)
    }
}

/// Optional file logging section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`; build default when omitted.
    #[serde(default)]
    pub level: Option<String>,
    /// Absolute directory for rotating log files.
    pub directory: PathBuf,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LibraryConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
    /// Runs a full aggregate reconciliation sweep right after populating.
    #[serde(default)]
    pub reconcile_on_open: bool,
}

impl LibraryConfig {
    /// In-memory database with every repository cached.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let DatabaseConfig::File { path } = &self.database {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "database.path must not be empty".to_string(),
                ));
            }
        }
        for name in self.cache.overrides.keys() {
            if !REPOSITORY_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "unknown repository `{name}` in cache.overrides"
                )));
            }
        }
        if let Some(logging) = &self.logging {
            if !logging.directory.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "logging.directory must be absolute, got `{}`",
                    logging.directory.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheMode, ConfigError, DatabaseConfig, LibraryConfig};
    use std::path::PathBuf;

    #[test]
    fn empty_document_uses_in_memory_cached_defaults() {
        let config = LibraryConfig::from_json_str("{}").unwrap();
        assert_eq!(config.database, DatabaseConfig::Memory);
        assert_eq!(config.cache.mode_for("groups"), CacheMode::Cached);
        assert!(!config.reconcile_on_open);
    }

    #[test]
    fn overrides_apply_per_repository() {
        let config = LibraryConfig::from_json_str(
            r#"{
                "database": { "kind": "file", "path": "/var/lib/medialib/library.db" },
                "cache": { "default_mode": "cached", "overrides": { "episode_users": "direct" } },
                "reconcile_on_open": true
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.database,
            DatabaseConfig::File {
                path: PathBuf::from("/var/lib/medialib/library.db")
            }
        );
        assert_eq!(config.cache.mode_for("episode_users"), CacheMode::Direct);
        assert_eq!(config.cache.mode_for("series"), CacheMode::Cached);
        assert!(config.reconcile_on_open);
    }

    #[test]
    fn unknown_override_is_rejected() {
        let err = LibraryConfig::from_json_str(r#"{ "cache": { "overrides": { "atoms": "direct" } } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("atoms")));
    }

    #[test]
    fn relative_log_directory_is_rejected() {
        let err = LibraryConfig::from_json_str(r#"{ "logging": { "directory": "logs" } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = LibraryConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
