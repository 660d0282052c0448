//! TOML configuration.
//!
//! Every section and key is optional:
//!
//! ```toml
//! [storage]
//! data_dir = "./data"
//! sync_on_write = true
//!
//! [dedup]
//! similarity_threshold = 0.85
//!
//! [staging]
//! id_length = 12
//! retention_days = 30
//!
//! [logging]
//! filter = "dossier=info"
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;

use crate::dedup::{DuplicateResolver, DEFAULT_SIMILARITY_THRESHOLD};
use crate::error::ConfigError;
use crate::hash::{MAX_ID_LENGTH, MIN_ID_LENGTH};
use crate::staging::DEFAULT_ID_LENGTH;
use crate::storage::persistent::{PersistentConfig, KNOWLEDGE_DIR, STAGING_DIR};

/// Config file looked up when none is given explicitly.
pub const DEFAULT_CONFIG_PATH: &str = "dossier.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `[storage]` section.
    #[serde(default)]
    pub storage: StorageConfig,
    /// `[dedup]` section.
    #[serde(default)]
    pub dedup: DedupConfig,
    /// `[staging]` section.
    #[serde(default)]
    pub staging: StagingConfig,
    /// `[logging]` section.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Holds `staging/` and `knowledge_base/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Fsync every file write before it is renamed into place.
    #[serde(default = "default_sync_on_write")]
    pub sync_on_write: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sync_on_write: default_sync_on_write(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_sync_on_write() -> bool {
    true
}

/// `[dedup]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    /// Mean similarity a pair must exceed to be a duplicate.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

/// `[staging]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagingConfig {
    /// Hex characters kept from the content digest of a staged id.
    #[serde(default = "default_id_length")]
    pub id_length: usize,
    /// Default age after which `cleanup` removes terminal records.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            id_length: default_id_length(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_id_length() -> usize {
    DEFAULT_ID_LENGTH
}
fn default_retention_days() -> u32 {
    30
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "dossier=info".to_string()
}

impl Config {
    /// Reads and validates `path`.
    ///
    /// # Errors
    ///
    /// `Read` if the file cannot be read, `Parse` if it is not valid TOML
    /// for this schema, `Invalid` if a value is out of range.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load), except for a missing file.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// `Parse` for malformed TOML, `Invalid` for out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.dedup.similarity_threshold;
        if !(t > 0.0 && t < 1.0) {
            return Err(ConfigError::Invalid {
                field: "dedup.similarity_threshold",
                reason: format!("must be strictly between 0 and 1 (got {t})"),
            });
        }

        let len = self.staging.id_length;
        if !(MIN_ID_LENGTH..=MAX_ID_LENGTH).contains(&len) {
            return Err(ConfigError::Invalid {
                field: "staging.id_length",
                reason: format!("must be within {MIN_ID_LENGTH}..={MAX_ID_LENGTH} (got {len})"),
            });
        }

        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "logging.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// A resolver with the configured threshold.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the threshold is out of range.
    pub fn resolver(&self) -> Result<DuplicateResolver, ConfigError> {
        DuplicateResolver::new(self.dedup.similarity_threshold)
    }

    /// Options for the file-backed stores.
    #[must_use]
    pub fn persistent(&self) -> PersistentConfig {
        PersistentConfig {
            sync_on_write: self.storage.sync_on_write,
        }
    }

    /// Directory holding one JSON file per staged record.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.storage.data_dir.join(STAGING_DIR)
    }

    /// Directory holding the canonical collections.
    #[must_use]
    pub fn knowledge_dir(&self) -> PathBuf {
        self.storage.data_dir.join(KNOWLEDGE_DIR)
    }

    /// Default `max_age` for cleanup.
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::days(i64::from(self.staging.retention_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.staging.id_length, 12);
        assert_eq!(config.retention(), Duration::days(30));
        assert_eq!(config.staging_dir(), PathBuf::from("./data").join("staging"));
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            data_dir = "/var/lib/dossier"

            [dedup]
            similarity_threshold = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/dossier"));
        assert!(config.storage.sync_on_write);
        assert!((config.resolver().unwrap().similarity_threshold() - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.staging.retention_days, 30);
    }

    #[test]
    fn test_threshold_bounds() {
        for bad in ["0.0", "1.0", "1.5", "-0.2"] {
            let err = Config::from_toml_str(&format!("[dedup]\nsimilarity_threshold = {bad}\n")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { field: "dedup.similarity_threshold", .. }));
        }
    }

    #[test]
    fn test_id_length_bounds() {
        let err = Config::from_toml_str("[staging]\nid_length = 4\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "staging.id_length", .. }));
        assert!(Config::from_toml_str("[staging]\nid_length = 64\n").is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Config::from_toml_str("[dedup]\nthreshold = 0.9\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(Config::load(&dir.path().join("absent.toml")).is_err());
    }
}
