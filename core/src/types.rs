//! Enumerations shared by the control schema and the file store.
//!
//! Every enum that is persisted has a fixed integer or string encoding; the
//! encodings are part of the on-disk format and must not be reordered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Column and data label names of the standard controls present in every
/// template.
pub mod label {
    /// Image quality classification of a file.
    pub const CLASSIFICATION: &str = "Classification";
    /// Date and time the file was taken, stored as a UTC instant.
    pub const DATE_TIME: &str = "DateTime";
    /// Soft delete marker.
    pub const DELETE_FLAG: &str = "DeleteFlag";
    /// File name, without any folder components.
    pub const FILE: &str = "File";
    /// Store assigned primary key.
    pub const ID: &str = "Id";
    /// Folder of the file relative to the image set's root folder.
    pub const RELATIVE_PATH: &str = "RelativePath";
    /// Offset from UTC of the time zone the file was taken in.
    pub const UTC_OFFSET: &str = "UtcOffset";

    /// Standard controls in the order their columns bind in insert and update
    /// statements.
    pub const STANDARD_CONTROLS: [&str; 6] = [
        CLASSIFICATION,
        DATE_TIME,
        DELETE_FLAG,
        FILE,
        RELATIVE_PATH,
        UTC_OFFSET,
    ];

    /// Suffix appended to a counter's data label to name its marker column.
    pub const MARKER_POSITION_SUFFIX: &str = "Markers";

    /// Returns `true` if `data_label` names one of the standard controls.
    pub fn is_standard(data_label: &str) -> bool {
        STANDARD_CONTROLS.contains(&data_label)
    }
}

/// Kind of data entry field a control represents.
///
/// The variant determines the physical storage of the field's column, how
/// values are validated, and which default comparison a search term
/// starts with.
///
/// # Examples
///
/// ```
/// use carnassial_core::{ControlType, SqlDataType};
///
/// assert_eq!(ControlType::Counter.sql_data_type(), SqlDataType::Integer);
/// assert_eq!("FixedChoice".parse::<ControlType>().unwrap(), ControlType::FixedChoice);
/// assert!("Slider".parse::<ControlType>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ControlType {
    /// Non-negative integer count, with markers placed on the image.
    Counter,
    /// Date and time a file was taken.
    DateTime,
    /// One value from a fixed list of choices.
    FixedChoice,
    /// Boolean.
    Flag,
    /// Free text (the default).
    #[default]
    Note,
    /// Offset from UTC of the file's time zone.
    UtcOffset,
}

impl ControlType {
    /// All control types in their persisted order.
    pub const ALL: [ControlType; 6] = [
        ControlType::Counter,
        ControlType::DateTime,
        ControlType::FixedChoice,
        ControlType::Flag,
        ControlType::Note,
        ControlType::UtcOffset,
    ];

    /// Storage class of a column holding values of this type.
    pub fn sql_data_type(self) -> SqlDataType {
        match self {
            ControlType::Counter => SqlDataType::Integer,
            ControlType::DateTime => SqlDataType::DateTime,
            ControlType::FixedChoice | ControlType::Note => SqlDataType::String,
            ControlType::Flag => SqlDataType::Boolean,
            ControlType::UtcOffset => SqlDataType::Real,
        }
    }

    /// Integer stored in the `Type` column of the `Controls` table.
    pub fn to_database_value(self) -> i64 {
        match self {
            ControlType::Counter => 0,
            ControlType::DateTime => 1,
            ControlType::FixedChoice => 2,
            ControlType::Flag => 3,
            ControlType::Note => 4,
            ControlType::UtcOffset => 5,
        }
    }

    /// Parses the integer stored in the `Controls` table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownControlType`] for values outside the
    /// persisted range.
    pub fn from_database_value(value: i64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|control_type| control_type.to_database_value() == value)
            .ok_or_else(|| CoreError::UnknownControlType(value.to_string()))
    }

    /// Name of the type as it appears in templates and messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ControlType::Counter => "Counter",
            ControlType::DateTime => "DateTime",
            ControlType::FixedChoice => "FixedChoice",
            ControlType::Flag => "Flag",
            ControlType::Note => "Note",
            ControlType::UtcOffset => "UtcOffset",
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|control_type| control_type.as_str() == s)
            .ok_or_else(|| CoreError::UnknownControlType(s.to_string()))
    }
}

/// Physical data type of a column in the `Files` table.
///
/// User columns are loaded into one of four typed arrays based on this type:
/// booleans, blobs, integers and strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlDataType {
    /// Packed marker positions.
    Blob,
    /// Integer column holding 0 or 1.
    Boolean,
    /// Text column holding a canonical UTC instant.
    DateTime,
    /// 32 bit integer.
    Integer,
    /// Double precision float.
    Real,
    /// Text.
    String,
}

impl SqlDataType {
    /// Column type used in `CREATE TABLE` and `ALTER TABLE` statements.
    pub fn affinity(self) -> &'static str {
        match self {
            SqlDataType::Blob => "BLOB",
            SqlDataType::Boolean | SqlDataType::Integer => "INTEGER",
            SqlDataType::DateTime => "DATETIME",
            SqlDataType::Real => "REAL",
            SqlDataType::String => "TEXT",
        }
    }
}

/// Image quality classification of a file.
///
/// # Examples
///
/// ```
/// use carnassial_core::FileClassification;
///
/// assert_eq!(FileClassification::default(), FileClassification::Color);
/// assert_eq!("Ok".parse::<FileClassification>().unwrap(), FileClassification::Color);
/// assert_eq!(FileClassification::Video.to_database_value(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum FileClassification {
    /// Color image (the default).
    #[default]
    Color,
    /// File could not be decoded.
    Corrupt,
    /// Image too dark to be useful.
    Dark,
    /// Greyscale image, typically taken at night.
    Greyscale,
    /// File is no longer present on disk.
    NoLongerAvailable,
    /// Video.
    Video,
}

impl FileClassification {
    /// All classifications in their persisted order.
    pub const ALL: [FileClassification; 6] = [
        FileClassification::Color,
        FileClassification::Corrupt,
        FileClassification::Dark,
        FileClassification::Greyscale,
        FileClassification::NoLongerAvailable,
        FileClassification::Video,
    ];

    /// Choices offered by the standard Classification control. `Ok` is the
    /// legacy name of `Color`.
    pub const WELL_KNOWN_VALUES: &'static str = "Color|Ok|Corrupt|Dark|Greyscale|NoLongerAvailable|Video";

    /// Integer stored in the `Classification` column.
    pub fn to_database_value(self) -> i64 {
        match self {
            FileClassification::Color => 0,
            FileClassification::Corrupt => 1,
            FileClassification::Dark => 2,
            FileClassification::Greyscale => 3,
            FileClassification::NoLongerAvailable => 4,
            FileClassification::Video => 5,
        }
    }

    /// Parses the integer stored in the `Classification` column.
    pub fn from_database_value(value: i64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|classification| classification.to_database_value() == value)
            .ok_or_else(|| CoreError::UnknownClassification(value.to_string()))
    }

    /// Display name.
    pub fn as_str(self) -> &'static str {
        match self {
            FileClassification::Color => "Color",
            FileClassification::Corrupt => "Corrupt",
            FileClassification::Dark => "Dark",
            FileClassification::Greyscale => "Greyscale",
            FileClassification::NoLongerAvailable => "NoLongerAvailable",
            FileClassification::Video => "Video",
        }
    }
}

impl fmt::Display for FileClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileClassification {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Color" | "Ok" => Ok(FileClassification::Color),
            "Corrupt" => Ok(FileClassification::Corrupt),
            "Dark" => Ok(FileClassification::Dark),
            "Greyscale" => Ok(FileClassification::Greyscale),
            "NoLongerAvailable" => Ok(FileClassification::NoLongerAvailable),
            "Video" => Ok(FileClassification::Video),
            other => Err(CoreError::UnknownClassification(other.to_string())),
        }
    }
}

/// Which files are loaded into the in-memory file table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FileSelection {
    /// Every file (the default).
    #[default]
    All,
    /// Files classified as color.
    Color,
    /// Files classified as corrupt.
    Corrupt,
    /// Files matching the custom selection's search terms.
    Custom,
    /// Files classified as dark.
    Dark,
    /// Files classified as greyscale.
    Greyscale,
    /// Files with the delete flag set.
    MarkedForDeletion,
    /// Files no longer present on disk.
    NoLongerAvailable,
    /// Videos.
    Video,
}

impl FileSelection {
    /// All selections in their persisted order.
    pub const ALL: [FileSelection; 9] = [
        FileSelection::All,
        FileSelection::Color,
        FileSelection::Corrupt,
        FileSelection::Custom,
        FileSelection::Dark,
        FileSelection::Greyscale,
        FileSelection::MarkedForDeletion,
        FileSelection::NoLongerAvailable,
        FileSelection::Video,
    ];

    /// Integer stored in the image set's `FileSelection` column.
    pub fn to_database_value(self) -> i64 {
        Self::ALL
            .iter()
            .position(|selection| *selection == self)
            .map_or(0, |position| position as i64)
    }

    /// Parses the integer stored in the image set table.
    pub fn from_database_value(value: i64) -> Result<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .ok_or_else(|| CoreError::UnknownFileSelection(value))
    }

    /// Classification selected by this selection, if it selects by
    /// classification.
    pub fn classification(self) -> Option<FileClassification> {
        match self {
            FileSelection::Color => Some(FileClassification::Color),
            FileSelection::Corrupt => Some(FileClassification::Corrupt),
            FileSelection::Dark => Some(FileClassification::Dark),
            FileSelection::Greyscale => Some(FileClassification::Greyscale),
            FileSelection::NoLongerAvailable => Some(FileClassification::NoLongerAvailable),
            FileSelection::Video => Some(FileClassification::Video),
            FileSelection::All | FileSelection::Custom | FileSelection::MarkedForDeletion => None,
        }
    }
}

/// Operator joining the clauses of a custom selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LogicalOperator {
    /// Every enabled term must match (the default).
    #[default]
    And,
    /// Any enabled term may match.
    Or,
}

impl LogicalOperator {
    /// SQL keyword.
    pub fn as_sql(self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}
