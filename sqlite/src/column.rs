//! Column map of the `Files` table.
//!
//! [`FileTableColumnMap`] is compiled once from the controls when a database
//! opens. It fixes the order columns bind in insert and update statements
//! and assigns each user column a slot in one of the typed arrays of a
//! [`FileRow`](crate::FileRow), so rows never look columns up by name while
//! loading or saving.

use std::collections::HashMap;

use carnassial_core::{Control, ControlType, FileClassification, SqlDataType, label, time};
use chrono::{DateTime, FixedOffset};

use crate::error::{Result, SqliteError};
use crate::schema::marker_column_name;

/// Where a column's value lives in a file row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnSlot {
    Classification,
    DateTime,
    DeleteFlag,
    File,
    RelativePath,
    UtcOffset,
    /// Index into the row's counters.
    Counter(usize),
    /// Index into the row's flags.
    Flag(usize),
    /// Index into the row's notes and choices.
    NoteOrChoice(usize),
    /// Index into the row's marker blobs; equal to the owning counter's index.
    MarkerPositions(usize),
}

/// One bound column of the `Files` table.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTableColumn {
    /// Column name.
    pub data_label: String,
    /// Type of the owning control. Marker columns report `Counter`.
    pub control_type: ControlType,
    /// Physical type, which selects the typed array of user columns.
    pub data_type: SqlDataType,
    /// Location in a file row.
    pub slot: ColumnSlot,
}

impl FileTableColumn {
    /// Whether this column belongs to a user defined control.
    pub fn is_user_column(&self) -> bool {
        matches!(
            self.slot,
            ColumnSlot::Counter(_) | ColumnSlot::Flag(_) | ColumnSlot::NoteOrChoice(_) | ColumnSlot::MarkerPositions(_)
        )
    }
}

/// Bound columns of the `Files` table and the defaults new rows take.
///
/// Standard columns come first in the fixed order Classification, DateTime,
/// DeleteFlag, File, RelativePath, UtcOffset. User columns follow in control
/// order with each counter's marker column right after the counter.
///
/// # Examples
///
/// ```
/// use carnassial_core::{Control, ControlType};
/// use carnassial_sqlite::{ColumnSlot, FileTableColumnMap};
///
/// let mut controls = Control::standard_controls();
/// controls.push(Control::new(ControlType::Counter, "Animals", 7));
/// let map = FileTableColumnMap::new(&controls).unwrap();
/// assert_eq!(map.require("AnimalsMarkers").unwrap().slot, ColumnSlot::MarkerPositions(0));
/// assert_eq!(map.columns().len(), 8);
/// ```
#[derive(Debug, Clone)]
pub struct FileTableColumnMap {
    columns: Vec<FileTableColumn>,
    by_label: HashMap<String, usize>,
    controls: HashMap<String, Control>,
    default_classification: FileClassification,
    default_date_time: DateTime<FixedOffset>,
    default_delete_flag: bool,
    default_counters: Vec<i32>,
    default_flags: Vec<bool>,
    default_notes_and_choices: Vec<String>,
}

impl FileTableColumnMap {
    /// Compiles the column map of a template.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::SchemaError`] if a standard control is missing,
    /// a user control is of a type only standard controls may have, or a
    /// default cannot be parsed.
    pub fn new(controls: &[Control]) -> Result<Self> {
        let find_standard = |data_label: &str| {
            controls
                .iter()
                .find(|control| control.data_label == data_label)
                .ok_or_else(|| SqliteError::SchemaError(format!("standard control {data_label} is missing")))
        };

        let mut map = Self {
            columns: Vec::with_capacity(controls.len() + 1),
            by_label: HashMap::new(),
            controls: controls
                .iter()
                .map(|control| (control.data_label.clone(), control.clone()))
                .collect(),
            default_classification: FileClassification::default(),
            default_date_time: time::default_date_time(),
            default_delete_flag: false,
            default_counters: Vec::new(),
            default_flags: Vec::new(),
            default_notes_and_choices: Vec::new(),
        };

        for standard in label::STANDARD_CONTROLS {
            let control = find_standard(standard)?;
            let (slot, data_type) = match standard {
                label::CLASSIFICATION => (ColumnSlot::Classification, SqlDataType::String),
                label::DATE_TIME => (ColumnSlot::DateTime, SqlDataType::DateTime),
                label::DELETE_FLAG => (ColumnSlot::DeleteFlag, SqlDataType::Boolean),
                label::FILE => (ColumnSlot::File, SqlDataType::String),
                label::RELATIVE_PATH => (ColumnSlot::RelativePath, SqlDataType::String),
                _ => (ColumnSlot::UtcOffset, SqlDataType::Real),
            };
            map.push(FileTableColumn {
                data_label: control.data_label.clone(),
                control_type: control.control_type,
                data_type,
                slot,
            });
        }

        map.default_classification = find_standard(label::CLASSIFICATION)?.default_classification();
        map.default_delete_flag = find_standard(label::DELETE_FLAG)?.default_flag_value();
        let offset_default = &find_standard(label::UTC_OFFSET)?.default_value;
        let offset = time::parse_database_utc_offset(offset_default)
            .map_err(|e| SqliteError::SchemaError(format!("UtcOffset default: {e}")))?;
        map.default_date_time = find_standard(label::DATE_TIME)?.default_date_time(offset);

        let mut user_controls: Vec<&Control> = controls.iter().filter(|control| control.is_user_control()).collect();
        user_controls.sort_by_key(|control| control.control_order);
        for control in user_controls {
            let data_type = control.control_type.sql_data_type();
            let slot = match control.control_type {
                ControlType::Counter => {
                    map.default_counters.push(control.default_counter_value());
                    ColumnSlot::Counter(map.default_counters.len() - 1)
                }
                ControlType::Flag => {
                    map.default_flags.push(control.default_flag_value());
                    ColumnSlot::Flag(map.default_flags.len() - 1)
                }
                ControlType::FixedChoice | ControlType::Note => {
                    map.default_notes_and_choices.push(control.default_value.clone());
                    ColumnSlot::NoteOrChoice(map.default_notes_and_choices.len() - 1)
                }
                ControlType::DateTime | ControlType::UtcOffset => {
                    return Err(SqliteError::SchemaError(format!(
                        "user control {} cannot be of type {}",
                        control.data_label, control.control_type
                    )));
                }
            };
            map.push(FileTableColumn {
                data_label: control.data_label.clone(),
                control_type: control.control_type,
                data_type,
                slot,
            });
            if let ColumnSlot::Counter(index) = slot {
                map.push(FileTableColumn {
                    data_label: marker_column_name(&control.data_label),
                    control_type: ControlType::Counter,
                    data_type: SqlDataType::Blob,
                    slot: ColumnSlot::MarkerPositions(index),
                });
            }
        }

        Ok(map)
    }

    fn push(&mut self, column: FileTableColumn) {
        self.by_label.insert(column.data_label.clone(), self.columns.len());
        self.columns.push(column);
    }

    /// Columns in binding order, without `Id`.
    pub fn columns(&self) -> &[FileTableColumn] {
        &self.columns
    }

    /// User columns, including marker columns, in binding order.
    pub fn user_columns(&self) -> impl Iterator<Item = &FileTableColumn> {
        self.columns.iter().filter(|column| column.is_user_column())
    }

    /// Looks up a column by name.
    pub fn get(&self, data_label: &str) -> Option<&FileTableColumn> {
        self.by_label.get(data_label).map(|index| &self.columns[*index])
    }

    /// Looks up a column by name, failing if it is not part of the table.
    pub fn require(&self, data_label: &str) -> Result<&FileTableColumn> {
        self.get(data_label)
            .ok_or_else(|| SqliteError::InvalidArgument(format!("{data_label} is not a column of the Files table")))
    }

    /// Control owning a column. Marker columns have none.
    pub fn control(&self, data_label: &str) -> Option<&Control> {
        self.controls.get(data_label)
    }

    pub fn counter_count(&self) -> usize {
        self.default_counters.len()
    }

    pub fn flag_count(&self) -> usize {
        self.default_flags.len()
    }

    pub fn note_and_choice_count(&self) -> usize {
        self.default_notes_and_choices.len()
    }

    pub(crate) fn default_classification(&self) -> FileClassification {
        self.default_classification
    }

    pub(crate) fn default_date_time(&self) -> DateTime<FixedOffset> {
        self.default_date_time
    }

    pub(crate) fn default_delete_flag(&self) -> bool {
        self.default_delete_flag
    }

    pub(crate) fn default_counters(&self) -> &[i32] {
        &self.default_counters
    }

    pub(crate) fn default_flags(&self) -> &[bool] {
        &self.default_flags
    }

    pub(crate) fn default_notes_and_choices(&self) -> &[String] {
        &self.default_notes_and_choices
    }
}
