//! Configuration for the Carnassial file metadata store.
//!
//! [`StoreConfig`] carries the tunables of the SQLite layer: the number of
//! rows written per transaction by bulk operations, the backup policy and
//! how file selections are ordered. Configuration is YAML, typically kept
//! beside the template.
//!
//! # Example
//!
//! ```
//! use carnassial_config::StoreConfig;
//!
//! let config: StoreConfig = serde_yaml::from_str("rows_per_transaction: 250").unwrap();
//! assert_eq!(config.rows_per_transaction, 250);
//! assert_eq!(config.backup.backups_to_keep, 8);
//! assert!(config.validate().is_ok());
//! ```

mod config;
mod error;

pub use config::{BackupConfig, DEFAULT_ROWS_PER_TRANSACTION, StoreConfig};
pub use error::{ConfigError, Result};
