//! Error types for the file metadata store.
//!
//! Schema integrity problems and migration failures are fatal for the
//! database being opened. Invalid arguments and values rejected by a
//! control are caller errors and leave the database untouched.

use carnassial_config::ConfigError;
use carnassial_core::{CoreError, ValidationError};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// The database's tables do not match the controls describing them.
    #[error("schema error: {0}")]
    SchemaError(String),

    /// A stored value could not be converted to its in-memory type.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// Upgrade of an older database failed; the version marker is unchanged.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// A caller supplied argument is out of range or refers to nothing.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// File name whose extension is neither a supported image nor video.
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// File I/O failure while backing up or moving files.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Store configuration could not be loaded.
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// A persisted encoding could not be parsed.
    #[error(transparent)]
    CoreError(#[from] CoreError),

    /// A value or template edit was rejected by validation.
    #[error(transparent)]
    ValidationError(#[from] ValidationError),
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
