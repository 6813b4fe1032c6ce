//! Error type for loading and saving store configuration.

use thiserror::Error;

/// Errors that can occur while reading or writing a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A setting parsed but is outside its usable range.
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting {
        /// Setting name as it appears in YAML.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Convenience alias for results with [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
