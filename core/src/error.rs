//! Error type for parsing persisted encodings.

use thiserror::Error;

/// Errors raised when a persisted or user supplied value cannot be
/// interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Control type name or integer outside the closed set.
    #[error("unknown control type: {0}")]
    UnknownControlType(String),

    /// Classification name or integer outside the closed set.
    #[error("unknown file classification: {0}")]
    UnknownClassification(String),

    /// File selection integer outside the persisted range.
    #[error("unknown file selection: {0}")]
    UnknownFileSelection(i64),

    /// Search operator outside the supported vocabulary.
    #[error("unsupported search operator '{0}'")]
    UnsupportedOperator(String),

    /// Marker position blob whose length is not a whole number of points.
    #[error("marker position blob of {0} bytes is not a multiple of 8")]
    InvalidMarkerBlob(usize),

    /// Marker positions in spreadsheet form that could not be parsed.
    #[error("invalid marker positions '{0}'")]
    InvalidMarkerPositions(String),

    /// Date, time or UTC offset not in the database encoding.
    #[error("invalid {kind} '{value}'")]
    InvalidTime {
        /// What was being parsed.
        kind: &'static str,
        /// The rejected text.
        value: String,
    },

    /// Two controls were synchronized which describe different fields.
    #[error("cannot synchronize control '{this}' with control '{other}'")]
    DataLabelMismatch {
        /// Data label of the control being updated.
        this: String,
        /// Data label of the control supplying the values.
        other: String,
    },
}

/// Convenience alias for results with [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
