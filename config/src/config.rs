//! Store configuration.
//!
//! Tunables of the file metadata store which are not part of an image set's
//! own data: batch sizes, backup policy and file ordering. Every field has a
//! default, so an empty file or a partial one is a valid configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! rows_per_transaction: 5000
//! backup:
//!   interval_seconds: 300
//!   folder_name: Backups
//!   backups_to_keep: 8
//! order_files_by_date_time: false
//! custom_selection_combiner: And
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

use carnassial_core::LogicalOperator;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Rows written per transaction by bulk operations unless configured.
pub const DEFAULT_ROWS_PER_TRANSACTION: usize = 5000;

/// Backup settings.
///
/// # Examples
///
/// ```
/// # use carnassial_config::BackupConfig;
/// let backup = BackupConfig::default();
/// assert_eq!(backup.folder_name, "Backups");
/// assert_eq!(backup.backups_to_keep, 8);
/// assert_eq!(backup.interval().as_secs(), 300);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Minimum time between backups of the same database.
    pub interval_seconds: u64,
    /// Name of the folder, next to the database, holding backups.
    pub folder_name: String,
    /// Number of backups of each database retained. Zero disables backups.
    pub backups_to_keep: usize,
}

impl BackupConfig {
    /// Backup interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5 * 60,
            folder_name: "Backups".to_string(),
            backups_to_keep: 8,
        }
    }
}

/// Top-level store configuration.
///
/// # Examples
///
/// ```no_run
/// use carnassial_config::StoreConfig;
///
/// let config = StoreConfig::load("carnassial.yml").unwrap();
/// println!("{} rows per transaction", config.rows_per_transaction);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Rows executed before a bulk operation commits and begins a new
    /// transaction.
    pub rows_per_transaction: usize,
    /// Backup policy.
    pub backup: BackupConfig,
    /// Load selections ordered by DateTime rather than by ID.
    pub order_files_by_date_time: bool,
    /// Operator joining the terms of a new custom selection.
    pub custom_selection_combiner: LogicalOperator,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            rows_per_transaction: DEFAULT_ROWS_PER_TRANSACTION,
            backup: BackupConfig::default(),
            order_files_by_date_time: false,
            custom_selection_combiner: LogicalOperator::And,
        }
    }
}

impl StoreConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](ConfigError::IoError) if the file cannot be read,
    /// [`YamlError`](ConfigError::YamlError) if parsing fails, or
    /// [`InvalidSetting`](ConfigError::InvalidSetting) if a value is
    /// unusable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: StoreConfig = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](ConfigError::IoError) if the file cannot be
    /// written, or [`YamlError`](ConfigError::YamlError) if serialization
    /// fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks settings that deserialize but cannot be used.
    pub fn validate(&self) -> Result<()> {
        if self.rows_per_transaction == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "rows_per_transaction",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.backup.folder_name.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "backup.folder_name",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Sets the transaction window, as tests and bulk imports tune it.
    pub fn with_rows_per_transaction(mut self, rows_per_transaction: usize) -> Self {
        self.rows_per_transaction = rows_per_transaction;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
rows_per_transaction: 1000
backup:
  interval_seconds: 60
  folder_name: Snapshots
  backups_to_keep: 3
order_files_by_date_time: true
custom_selection_combiner: Or
"#
    }

    #[test]
    fn test_deserialize_complete() {
        let config: StoreConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(config.rows_per_transaction, 1000);
        assert_eq!(config.backup.interval(), Duration::from_secs(60));
        assert_eq!(config.backup.folder_name, "Snapshots");
        assert_eq!(config.backup.backups_to_keep, 3);
        assert!(config.order_files_by_date_time);
        assert_eq!(config.custom_selection_combiner, LogicalOperator::Or);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: StoreConfig = serde_yaml::from_str("backup:\n  backups_to_keep: 2\n").unwrap();
        assert_eq!(config.rows_per_transaction, DEFAULT_ROWS_PER_TRANSACTION);
        assert_eq!(config.backup.backups_to_keep, 2);
        assert_eq!(config.backup.folder_name, "Backups");
        assert_eq!(config.custom_selection_combiner, LogicalOperator::And);
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let config = StoreConfig::default().with_rows_per_transaction(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { name: "rows_per_transaction", .. })
        ));
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carnassial.yml");

        let original: StoreConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        original.save(&path).unwrap();

        let loaded = StoreConfig::load(&path).unwrap();
        assert_eq!(loaded, original);
    }
}
