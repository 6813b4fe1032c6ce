//! Conversions between field values and their SQL forms.
//!
//! Values cross the store boundary in three shapes: typed [`FieldValue`]s
//! bound as statement parameters, SQL literals embedded in `WHERE` clauses
//! and column `DEFAULT`s, and the string form controls validate. This module
//! owns the mapping between them so the schema, the selection builder and
//! the row model agree on storage encodings.

use std::fmt;

use carnassial_core::{
    Control, ControlType, FileClassification, FLAG_FALSE, FLAG_TRUE, flag_to_string, label, parse_flag, time,
};
use chrono::{DateTime, FixedOffset};
use rusqlite::types::Value;

use crate::error::{Result, SqliteError};

/// A typed value of one `Files` column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Flag or delete flag.
    Boolean(bool),
    /// Date-time with the file's offset.
    DateTime(DateTime<FixedOffset>),
    /// Counter or classification.
    Integer(i32),
    /// UTC offset in hours.
    Real(f64),
    /// Note, choice or path component.
    Text(String),
    /// Packed marker positions.
    Blob(Vec<u8>),
}

impl FieldValue {
    /// Value in its parameter form.
    pub fn to_sql_value(&self) -> Value {
        match self {
            FieldValue::Boolean(value) => Value::Integer(i64::from(*value)),
            FieldValue::DateTime(value) => Value::Text(time::to_database_date_time_string(value)),
            FieldValue::Integer(value) => Value::Integer(i64::from(*value)),
            FieldValue::Real(value) => Value::Real(*value),
            FieldValue::Text(value) => Value::Text(value.clone()),
            FieldValue::Blob(value) => Value::Blob(value.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Boolean(value) => f.write_str(flag_to_string(*value)),
            FieldValue::DateTime(value) => f.write_str(&time::to_database_date_time_string(value)),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Real(value) => write!(f, "{value}"),
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Blob(value) => write!(f, "<{} bytes>", value.len()),
        }
    }
}

/// Quotes text as a SQL string literal, doubling embedded quotes.
///
/// # Examples
///
/// ```
/// use carnassial_sqlite::quote_text;
///
/// assert_eq!(quote_text("O'Brien"), "'O''Brien'");
/// assert_eq!(quote_text(""), "''");
/// ```
pub fn quote_text(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quotes an identifier for DDL and queries.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Converts a field value in string form to the SQL literal of its stored
/// form.
///
/// Flags become `0`/`1`, classification names their integer, counters an
/// integer, date-times a quoted canonical UTC string and offsets their hour
/// count. Other text is quoted.
///
/// # Errors
///
/// Returns [`SqliteError::ConversionError`] if the value is not valid for
/// the field.
///
/// # Examples
///
/// ```
/// use carnassial_core::ControlType;
/// use carnassial_sqlite::to_storage_literal;
///
/// assert_eq!(to_storage_literal(ControlType::Flag, "Juvenile", "TRUE").unwrap(), "1");
/// assert_eq!(to_storage_literal(ControlType::FixedChoice, "Classification", "Dark").unwrap(), "2");
/// assert_eq!(to_storage_literal(ControlType::Note, "Comments", "it's").unwrap(), "'it''s'");
/// ```
pub fn to_storage_literal(control_type: ControlType, data_label: &str, value: &str) -> Result<String> {
    let invalid = || SqliteError::ConversionError(format!("'{value}' is not a valid value for {data_label}"));
    if data_label == label::CLASSIFICATION {
        let classification: FileClassification = value.parse().map_err(|_| invalid())?;
        return Ok(classification.to_database_value().to_string());
    }
    match control_type {
        ControlType::Counter => value
            .trim()
            .parse::<i32>()
            .map(|count| count.to_string())
            .map_err(|_| invalid()),
        ControlType::DateTime => time::parse_database_date_time(value)
            .map(|instant| quote_text(&time::to_database_date_time_string(&instant)))
            .map_err(|_| invalid()),
        ControlType::Flag => parse_flag(value)
            .map(|flag| i64::from(flag).to_string())
            .ok_or_else(invalid),
        ControlType::FixedChoice | ControlType::Note => Ok(quote_text(value)),
        ControlType::UtcOffset => time::parse_database_utc_offset(value)
            .map(|offset| time::utc_offset_to_hours(offset).to_string())
            .map_err(|_| invalid()),
    }
}

/// SQL literal used as the column `DEFAULT` of a control, if it has one.
///
/// File path components and blank text defaults have none.
pub fn default_to_sql_literal(control: &Control) -> Result<Option<String>> {
    if control.is_file_path_component() {
        return Ok(None);
    }
    if control.data_label == label::CLASSIFICATION {
        return Ok(Some(control.default_classification().to_database_value().to_string()));
    }
    match control.control_type {
        ControlType::Counter => Ok(Some(control.default_counter_value().to_string())),
        ControlType::Flag => Ok(Some(i64::from(control.default_flag_value()).to_string())),
        ControlType::FixedChoice | ControlType::Note => {
            if control.default_value.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(quote_text(&control.default_value)))
            }
        }
        ControlType::DateTime | ControlType::UtcOffset => {
            to_storage_literal(control.control_type, &control.data_label, &control.default_value).map(Some)
        }
    }
}

/// Reads a flag column, accepting integers and the legacy text literals.
pub(crate) fn flag_from_sql(value: &Value, column: &str) -> Result<bool> {
    match value {
        Value::Integer(flag) => Ok(*flag != 0),
        Value::Text(text) => parse_flag(text)
            .ok_or_else(|| SqliteError::ConversionError(format!("'{text}' in {column} is not {FLAG_TRUE} or {FLAG_FALSE}"))),
        Value::Null => Ok(false),
        other => Err(SqliteError::ConversionError(format!(
            "unexpected {:?} in flag column {column}",
            other.data_type()
        ))),
    }
}

/// Combines the stored UTC instant and hour offset of a file.
pub(crate) fn date_time_from_sql(instant: &str, offset_hours: f64) -> Result<DateTime<FixedOffset>> {
    let instant = time::parse_database_date_time(instant)?;
    let offset = time::utc_offset_from_hours(offset_hours)?;
    Ok(instant.with_timezone(&offset))
}
