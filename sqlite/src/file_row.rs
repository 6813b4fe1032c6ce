//! One image or video in a file table.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use carnassial_core::marker::{packed_floats_to_spreadsheet_string, spreadsheet_string_to_packed_floats};
use carnassial_core::{
    FileClassification, MarkersForCounter, flag_to_string, parse_flag, time, validate_value,
};
use chrono::{DateTime, FixedOffset};
use rusqlite::types::Value;

use crate::column::{ColumnSlot, FileTableColumn, FileTableColumnMap};
use crate::convert::FieldValue;
use crate::error::{Result, SqliteError};

/// Primary key of a row not yet stored.
pub const INVALID_ID: i64 = -1;

/// Kind of media a row describes, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// `.jpg`
    Image,
    /// `.avi` or `.mp4`
    Video,
}

impl FileKind {
    /// Classifies a file name by extension, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::UnsupportedFileType`] for any other extension.
    ///
    /// # Examples
    ///
    /// ```
    /// use carnassial_sqlite::FileKind;
    ///
    /// assert_eq!(FileKind::from_file_name("IMG_0001.JPG").unwrap(), FileKind::Image);
    /// assert_eq!(FileKind::from_file_name("clip.Mp4").unwrap(), FileKind::Video);
    /// assert!(FileKind::from_file_name("notes.txt").is_err());
    /// ```
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("jpg") => Ok(FileKind::Image),
            Some("avi") | Some("mp4") => Ok(FileKind::Video),
            _ => Err(SqliteError::UnsupportedFileType(file_name.to_string())),
        }
    }
}

/// Metadata of one file.
///
/// Standard fields are struct fields; user fields live in typed arrays
/// addressed through the shared [`FileTableColumnMap`]. Every setter marks
/// the row changed so it joins the next update batch.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub(crate) columns: Arc<FileTableColumnMap>,
    pub(crate) id: i64,
    pub(crate) kind: FileKind,
    pub(crate) classification: FileClassification,
    pub(crate) date_time: DateTime<FixedOffset>,
    pub(crate) delete_flag: bool,
    pub(crate) file_name: String,
    pub(crate) relative_path: String,
    pub(crate) user_counters: Vec<i32>,
    pub(crate) user_flags: Vec<bool>,
    pub(crate) user_marker_positions: Vec<Vec<u8>>,
    pub(crate) user_notes_and_choices: Vec<String>,
    pub(crate) has_changes: bool,
}

impl FileRow {
    /// Creates a row for a newly found file with every other field at its
    /// default.
    ///
    /// Videos are classified as [`FileClassification::Video`].
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::UnsupportedFileType`] if the file is neither a
    /// supported image nor video.
    pub fn new(
        file_name: impl Into<String>,
        relative_path: impl Into<String>,
        columns: Arc<FileTableColumnMap>,
    ) -> Result<Self> {
        let file_name = file_name.into();
        let kind = FileKind::from_file_name(&file_name)?;
        let classification = match kind {
            FileKind::Image => columns.default_classification(),
            FileKind::Video => FileClassification::Video,
        };
        Ok(Self {
            id: INVALID_ID,
            kind,
            classification,
            date_time: columns.default_date_time(),
            delete_flag: columns.default_delete_flag(),
            file_name,
            relative_path: relative_path.into(),
            user_counters: columns.default_counters().to_vec(),
            user_flags: columns.default_flags().to_vec(),
            user_marker_positions: vec![Vec::new(); columns.counter_count()],
            user_notes_and_choices: columns.default_notes_and_choices().to_vec(),
            has_changes: true,
            columns,
        })
    }

    /// Store assigned ID, or [`INVALID_ID`] before the row is inserted.
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn is_video(&self) -> bool {
        self.kind == FileKind::Video
    }

    /// Column map the row's user fields are laid out by.
    pub fn columns(&self) -> &Arc<FileTableColumnMap> {
        &self.columns
    }

    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    pub fn accept_changes(&mut self) {
        self.has_changes = false;
    }

    pub fn classification(&self) -> FileClassification {
        self.classification
    }

    pub fn set_classification(&mut self, classification: FileClassification) {
        if self.classification != classification {
            self.classification = classification;
            self.has_changes = true;
        }
    }

    /// Date and time taken, in the file's time zone.
    pub fn date_time(&self) -> DateTime<FixedOffset> {
        self.date_time
    }

    /// Sets the date and time taken together with its offset.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidArgument`] if the offset is outside
    /// [-12, +14] hours or not on a quarter hour.
    pub fn set_date_time(&mut self, date_time: DateTime<FixedOffset>) -> Result<()> {
        if !time::is_valid_utc_offset(*date_time.offset()) {
            return Err(SqliteError::InvalidArgument(format!(
                "UTC offset {} of {} is not supported",
                date_time.offset(),
                self.file_name
            )));
        }
        // an equal instant in a different zone is still a change
        if self.date_time != date_time || self.date_time.offset() != date_time.offset() {
            self.date_time = date_time;
            self.has_changes = true;
        }
        Ok(())
    }

    pub fn utc_offset(&self) -> FixedOffset {
        *self.date_time.offset()
    }

    pub fn delete_flag(&self) -> bool {
        self.delete_flag
    }

    pub fn set_delete_flag(&mut self, delete_flag: bool) {
        if self.delete_flag != delete_flag {
            self.delete_flag = delete_flag;
            self.has_changes = true;
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn set_relative_path(&mut self, relative_path: impl Into<String>) {
        let relative_path = relative_path.into();
        if self.relative_path != relative_path {
            self.relative_path = relative_path;
            self.has_changes = true;
        }
    }

    /// Path of the file relative to the image set's root folder.
    pub fn get_relative_path(&self) -> PathBuf {
        if self.relative_path.is_empty() {
            PathBuf::from(&self.file_name)
        } else {
            Path::new(&self.relative_path).join(&self.file_name)
        }
    }

    /// Absolute path of the file under `root_folder`.
    pub fn get_file_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(self.get_relative_path())
    }

    /// Whether the file can be shown: it is neither corrupt nor missing.
    pub fn is_displayable(&self) -> bool {
        !matches!(
            self.classification,
            FileClassification::Corrupt | FileClassification::NoLongerAvailable
        )
    }

    /// Moves the file on disk to `destination_relative_path` under
    /// `root_folder` and updates the relative path.
    ///
    /// Returns `false` without touching anything if the file is missing or
    /// the destination already holds a file of the same name.
    pub fn try_move_file_to_folder(&mut self, root_folder: &Path, destination_relative_path: &str) -> Result<bool> {
        let source = self.get_file_path(root_folder);
        if !source.is_file() {
            return Ok(false);
        }
        let destination_folder = root_folder.join(destination_relative_path);
        let destination = destination_folder.join(&self.file_name);
        if destination.exists() {
            return Ok(false);
        }
        fs::create_dir_all(&destination_folder)?;
        fs::rename(&source, &destination)?;
        self.set_relative_path(destination_relative_path);
        Ok(true)
    }

    fn column(&self, data_label: &str) -> Result<&FileTableColumn> {
        self.columns.require(data_label)
    }

    /// Typed value of a column.
    pub fn get_database_value(&self, data_label: &str) -> Result<FieldValue> {
        let slot = self.column(data_label)?.slot;
        Ok(self.slot_value(slot))
    }

    fn slot_value(&self, slot: ColumnSlot) -> FieldValue {
        match slot {
            ColumnSlot::Classification => FieldValue::Integer(self.classification.to_database_value() as i32),
            ColumnSlot::DateTime => FieldValue::DateTime(self.date_time),
            ColumnSlot::DeleteFlag => FieldValue::Boolean(self.delete_flag),
            ColumnSlot::File => FieldValue::Text(self.file_name.clone()),
            ColumnSlot::RelativePath => FieldValue::Text(self.relative_path.clone()),
            ColumnSlot::UtcOffset => FieldValue::Real(time::utc_offset_to_hours(self.utc_offset())),
            ColumnSlot::Counter(index) => FieldValue::Integer(self.user_counters[index]),
            ColumnSlot::Flag(index) => FieldValue::Boolean(self.user_flags[index]),
            ColumnSlot::NoteOrChoice(index) => FieldValue::Text(self.user_notes_and_choices[index].clone()),
            ColumnSlot::MarkerPositions(index) => FieldValue::Blob(self.user_marker_positions[index].clone()),
        }
    }

    /// Sets a column from a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::ConversionError`] if the value's type does not
    /// match the column, or an error from the typed setter.
    pub fn set_database_value(&mut self, data_label: &str, value: FieldValue) -> Result<()> {
        let slot = self.column(data_label)?.slot;
        let mismatch = |value: &FieldValue| {
            SqliteError::ConversionError(format!("{value:?} cannot be stored in {data_label}"))
        };
        match (slot, value) {
            (ColumnSlot::Classification, FieldValue::Integer(value)) => {
                self.set_classification(FileClassification::from_database_value(i64::from(value))?);
            }
            (ColumnSlot::DateTime, FieldValue::DateTime(value)) => self.set_date_time(value)?,
            (ColumnSlot::DeleteFlag, FieldValue::Boolean(value)) => self.set_delete_flag(value),
            (ColumnSlot::File, FieldValue::Text(value)) => {
                if self.file_name != value {
                    self.kind = FileKind::from_file_name(&value)?;
                    self.file_name = value;
                    self.has_changes = true;
                }
            }
            (ColumnSlot::RelativePath, FieldValue::Text(value)) => self.set_relative_path(value),
            (ColumnSlot::UtcOffset, FieldValue::Real(hours)) => {
                let offset = time::utc_offset_from_hours(hours)?;
                self.set_date_time(self.date_time.with_timezone(&offset))?;
            }
            (ColumnSlot::Counter(index), FieldValue::Integer(value)) => self.set_counter_slot(index, value),
            (ColumnSlot::Flag(index), FieldValue::Boolean(value)) => self.set_flag_slot(index, value),
            (ColumnSlot::NoteOrChoice(index), FieldValue::Text(value)) => self.set_note_slot(index, value),
            (ColumnSlot::MarkerPositions(index), FieldValue::Blob(value)) => {
                if self.user_marker_positions[index] != value {
                    self.user_marker_positions[index] = value;
                    self.has_changes = true;
                }
            }
            (_, value) => return Err(mismatch(&value)),
        }
        Ok(())
    }

    /// Value of a column in the string form controls validate.
    ///
    /// Classifications give their name, date-times the canonical UTC
    /// string, offsets hours with two decimals and flags `true`/`false`.
    pub fn get_database_string(&self, data_label: &str) -> Result<String> {
        let slot = self.column(data_label)?.slot;
        Ok(match slot {
            ColumnSlot::Classification => self.classification.to_string(),
            ColumnSlot::DateTime => time::to_database_date_time_string(&self.date_time),
            ColumnSlot::DeleteFlag => flag_to_string(self.delete_flag).to_string(),
            ColumnSlot::File => self.file_name.clone(),
            ColumnSlot::RelativePath => self.relative_path.clone(),
            ColumnSlot::UtcOffset => time::to_database_utc_offset_string(self.utc_offset()),
            ColumnSlot::Counter(index) => self.user_counters[index].to_string(),
            ColumnSlot::Flag(index) => flag_to_string(self.user_flags[index]).to_string(),
            ColumnSlot::NoteOrChoice(index) => self.user_notes_and_choices[index].clone(),
            ColumnSlot::MarkerPositions(index) => {
                packed_floats_to_spreadsheet_string(&self.user_marker_positions[index])?.unwrap_or_default()
            }
        })
    }

    /// Sets a column from its string form after validating it against the
    /// column's control.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::ValidationError`] if the control rejects the
    /// value.
    pub fn set_database_string(&mut self, data_label: &str, value: &str) -> Result<()> {
        let slot = self.column(data_label)?.slot;
        if let Some(control) = self.columns.control(data_label) {
            validate_value(control, value)?;
        }
        match slot {
            ColumnSlot::Classification => self.set_classification(value.parse()?),
            ColumnSlot::DateTime => {
                let instant = time::parse_database_date_time(value)?;
                let offset = self.utc_offset();
                self.set_date_time(instant.with_timezone(&offset))?;
            }
            ColumnSlot::DeleteFlag => self.set_delete_flag(parse_flag(value).unwrap_or(false)),
            ColumnSlot::File => self.set_database_value(data_label, FieldValue::Text(value.to_string()))?,
            ColumnSlot::RelativePath => self.set_relative_path(value),
            ColumnSlot::UtcOffset => {
                let offset = time::parse_database_utc_offset(value)?;
                self.set_date_time(self.date_time.with_timezone(&offset))?;
            }
            ColumnSlot::Counter(index) => {
                let count = value
                    .parse()
                    .map_err(|_| SqliteError::ConversionError(format!("'{value}' is not a count")))?;
                self.set_counter_slot(index, count);
            }
            ColumnSlot::Flag(index) => self.set_flag_slot(index, parse_flag(value).unwrap_or(false)),
            ColumnSlot::NoteOrChoice(index) => self.set_note_slot(index, value.to_string()),
            ColumnSlot::MarkerPositions(_) => {
                let packed = spreadsheet_string_to_packed_floats(value)?;
                self.set_database_value(data_label, FieldValue::Blob(packed))?;
            }
        }
        Ok(())
    }

    /// Value of a column as written to a spreadsheet.
    ///
    /// Flags are `0` or `1` and markers `x,y` pairs separated by `|`; other
    /// columns use their database string.
    pub fn get_spreadsheet_string(&self, data_label: &str) -> Result<String> {
        match self.column(data_label)?.slot {
            ColumnSlot::DeleteFlag => Ok(u8::from(self.delete_flag).to_string()),
            ColumnSlot::Flag(index) => Ok(u8::from(self.user_flags[index]).to_string()),
            _ => self.get_database_string(data_label),
        }
    }

    pub fn get_counter(&self, data_label: &str) -> Result<i32> {
        match self.column(data_label)?.slot {
            ColumnSlot::Counter(index) => Ok(self.user_counters[index]),
            _ => Err(not_a(data_label, "counter")),
        }
    }

    pub fn set_counter(&mut self, data_label: &str, count: i32) -> Result<()> {
        match self.column(data_label)?.slot {
            ColumnSlot::Counter(index) => {
                self.set_counter_slot(index, count);
                Ok(())
            }
            _ => Err(not_a(data_label, "counter")),
        }
    }

    pub fn get_flag(&self, data_label: &str) -> Result<bool> {
        match self.column(data_label)?.slot {
            ColumnSlot::Flag(index) => Ok(self.user_flags[index]),
            ColumnSlot::DeleteFlag => Ok(self.delete_flag),
            _ => Err(not_a(data_label, "flag")),
        }
    }

    pub fn set_flag(&mut self, data_label: &str, value: bool) -> Result<()> {
        match self.column(data_label)?.slot {
            ColumnSlot::Flag(index) => self.set_flag_slot(index, value),
            ColumnSlot::DeleteFlag => self.set_delete_flag(value),
            _ => return Err(not_a(data_label, "flag")),
        }
        Ok(())
    }

    pub fn get_note_or_choice(&self, data_label: &str) -> Result<&str> {
        match self.column(data_label)?.slot {
            ColumnSlot::NoteOrChoice(index) => Ok(&self.user_notes_and_choices[index]),
            _ => Err(not_a(data_label, "note or choice")),
        }
    }

    /// Sets a note or choice. Choices are validated against their control.
    pub fn set_note_or_choice(&mut self, data_label: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        match self.column(data_label)?.slot {
            ColumnSlot::NoteOrChoice(index) => {
                if let Some(control) = self.columns.control(data_label) {
                    validate_value(control, &value)?;
                }
                self.set_note_slot(index, value);
                Ok(())
            }
            _ => Err(not_a(data_label, "note or choice")),
        }
    }

    /// Markers of a counter together with its count.
    pub fn get_markers_for_counter(&self, counter_data_label: &str) -> Result<MarkersForCounter> {
        match self.column(counter_data_label)?.slot {
            ColumnSlot::Counter(index) => Ok(MarkersForCounter::from_packed_floats(
                counter_data_label,
                self.user_counters[index],
                &self.user_marker_positions[index],
            )?),
            _ => Err(not_a(counter_data_label, "counter")),
        }
    }

    /// Stores a counter's markers and count.
    pub fn set_markers_for_counter(&mut self, markers: &MarkersForCounter) -> Result<()> {
        match self.column(markers.data_label())?.slot {
            ColumnSlot::Counter(index) => {
                self.set_counter_slot(index, markers.count());
                let packed = markers.to_packed_floats();
                if self.user_marker_positions[index] != packed {
                    self.user_marker_positions[index] = packed;
                    self.has_changes = true;
                }
                Ok(())
            }
            _ => Err(not_a(markers.data_label(), "counter")),
        }
    }

    fn set_counter_slot(&mut self, index: usize, count: i32) {
        if self.user_counters[index] != count {
            self.user_counters[index] = count;
            self.has_changes = true;
        }
    }

    fn set_flag_slot(&mut self, index: usize, value: bool) {
        if self.user_flags[index] != value {
            self.user_flags[index] = value;
            self.has_changes = true;
        }
    }

    fn set_note_slot(&mut self, index: usize, value: String) {
        if self.user_notes_and_choices[index] != value {
            self.user_notes_and_choices[index] = value;
            self.has_changes = true;
        }
    }

    /// Parameters of an insert or update statement in binding order,
    /// followed by the ID when `include_id` is set.
    pub fn to_sql_values(&self, include_id: bool) -> Vec<Value> {
        let mut values: Vec<Value> = self
            .columns
            .columns()
            .iter()
            .map(|column| self.slot_value(column.slot).to_sql_value())
            .collect();
        if include_id {
            values.push(Value::Integer(self.id));
        }
        values
    }

    /// Copies the value of one column from another row.
    pub fn copy_value_from(&mut self, other: &FileRow, data_label: &str) -> Result<()> {
        let value = other.get_database_value(data_label)?;
        self.set_database_value(data_label, value)
    }
}

fn not_a(data_label: &str, kind: &str) -> SqliteError {
    SqliteError::InvalidArgument(format!("{data_label} is not a {kind}"))
}
