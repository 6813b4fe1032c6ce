//! In-memory mirror of a selection of the `Files` table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use carnassial_core::{FileClassification, label};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use tracing::debug;

use crate::column::{ColumnSlot, FileTableColumnMap};
use crate::convert::{date_time_from_sql, flag_from_sql};
use crate::error::{Result, SqliteError};
use crate::file_row::FileRow;

/// Where each column of a result set goes, resolved once per load.
enum LoadTarget {
    Id,
    Slot(ColumnSlot),
}

/// Rows loaded from the `Files` table, in result order.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use carnassial_core::Control;
/// use carnassial_sqlite::{FileTable, FileTableColumnMap, generate_files_table_sql};
/// use rusqlite::Connection;
///
/// let controls = Control::standard_controls();
/// let conn = Connection::open_in_memory().unwrap();
/// conn.execute_batch(&generate_files_table_sql(&controls).unwrap()).unwrap();
/// conn.execute("INSERT INTO Files (File, RelativePath) VALUES ('IMG_0001.JPG', 'Station1')", []).unwrap();
///
/// let columns = Arc::new(FileTableColumnMap::new(&controls).unwrap());
/// let files = FileTable::load(&conn, "SELECT * FROM Files", columns).unwrap();
/// assert_eq!(files.len(), 1);
/// assert!(!files.get(0).unwrap().has_changes());
/// ```
#[derive(Debug, Clone)]
pub struct FileTable {
    columns: Arc<FileTableColumnMap>,
    rows: Vec<FileRow>,
}

impl FileTable {
    /// Creates an empty table.
    pub fn new(columns: Arc<FileTableColumnMap>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Runs `sql` and loads every row of its result.
    ///
    /// Loaded rows are clean.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::SchemaError`] if the result lacks `Id` or a
    /// standard column, or has a column the map does not know.
    pub fn load(conn: &Connection, sql: &str, columns: Arc<FileTableColumnMap>) -> Result<Self> {
        let mut statement = conn.prepare(sql)?;
        let targets = resolve_columns(&statement.column_names(), &columns)?;

        let mut rows = Vec::new();
        let mut result = statement.query([])?;
        while let Some(row) = result.next()? {
            rows.push(read_row(row, &targets, &columns)?);
        }
        debug!(rows = rows.len(), "loaded file table");
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &Arc<FileTableColumnMap> {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FileRow> {
        self.rows.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut FileRow> {
        self.rows.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileRow> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[FileRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [FileRow] {
        &mut self.rows
    }

    /// Appends a row, typically one just inserted.
    pub fn push(&mut self, row: FileRow) {
        self.rows.push(row);
    }

    /// Finds a row by ID with a linear scan.
    pub fn try_find(&self, id: i64) -> Option<&FileRow> {
        self.rows.iter().find(|row| row.id() == id)
    }

    /// Index of the row with `id` or, when no row has it, of the row with the
    /// next larger ID.
    ///
    /// Rows are assumed ordered by ID. Returns the last index when every ID
    /// is smaller and 0 for an empty table.
    pub fn get_file_or_next_file_index(&self, id: i64) -> usize {
        if self.rows.is_empty() {
            return 0;
        }
        match self.rows.binary_search_by_key(&id, FileRow::id) {
            Ok(index) => index,
            Err(insertion) => insertion.min(self.rows.len() - 1),
        }
    }

    /// Rows keyed by lower cased relative path, then lower cased file name.
    ///
    /// Built on demand; the map does not follow later edits.
    pub fn get_files_by_relative_path_and_name(&self) -> HashMap<String, HashMap<String, usize>> {
        let mut by_path: HashMap<String, HashMap<String, usize>> = HashMap::new();
        for (index, row) in self.rows.iter().enumerate() {
            by_path
                .entry(row.relative_path().to_lowercase())
                .or_default()
                .insert(row.file_name().to_lowercase(), index);
        }
        by_path
    }

    /// Lower cased file names of each lower cased relative path.
    pub fn hash_file_names_by_relative_path(&self) -> HashMap<String, HashSet<String>> {
        let mut by_path: HashMap<String, HashSet<String>> = HashMap::new();
        for row in &self.rows {
            by_path
                .entry(row.relative_path().to_lowercase())
                .or_default()
                .insert(row.file_name().to_lowercase());
        }
        by_path
    }

    /// Distinct relative paths, in first seen order.
    pub fn get_relative_paths(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|row| seen.insert(row.relative_path()))
            .map(|row| row.relative_path().to_string())
            .collect()
    }
}

impl<'a> IntoIterator for &'a FileTable {
    type Item = &'a FileRow;
    type IntoIter = std::slice::Iter<'a, FileRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

fn resolve_columns(names: &[&str], columns: &FileTableColumnMap) -> Result<Vec<LoadTarget>> {
    let mut targets = Vec::with_capacity(names.len());
    for name in names {
        if *name == label::ID {
            targets.push(LoadTarget::Id);
            continue;
        }
        let column = columns
            .get(name)
            .ok_or_else(|| SqliteError::SchemaError(format!("column {name} of the Files table has no control")))?;
        targets.push(LoadTarget::Slot(column.slot));
    }

    for required in std::iter::once(label::ID).chain(label::STANDARD_CONTROLS) {
        if !names.contains(&required) {
            return Err(SqliteError::SchemaError(format!("Files table is missing column {required}")));
        }
    }
    Ok(targets)
}

fn read_row(row: &Row<'_>, targets: &[LoadTarget], columns: &Arc<FileTableColumnMap>) -> Result<FileRow> {
    let mut id = 0;
    let mut file_name = String::new();
    let mut date_time_text = String::new();
    let mut offset_hours = 0.0;
    let mut values = Vec::with_capacity(targets.len());

    for (index, target) in targets.iter().enumerate() {
        let value: Value = row.get(index)?;
        match target {
            LoadTarget::Id => id = integer(&value, label::ID)?,
            LoadTarget::Slot(ColumnSlot::File) => file_name = text(value),
            LoadTarget::Slot(ColumnSlot::DateTime) => date_time_text = text(value),
            LoadTarget::Slot(ColumnSlot::UtcOffset) => offset_hours = real(&value, label::UTC_OFFSET)?,
            LoadTarget::Slot(slot) => values.push((*slot, value)),
        }
    }

    let mut file = FileRow::new(file_name, "", Arc::clone(columns))?;
    file.id = id;
    file.date_time = date_time_from_sql(&date_time_text, offset_hours)
        .map_err(|e| SqliteError::ConversionError(format!("file {id}: {e}")))?;

    for (slot, value) in values {
        match slot {
            ColumnSlot::Classification => {
                file.classification = FileClassification::from_database_value(integer(&value, label::CLASSIFICATION)?)?;
            }
            ColumnSlot::DeleteFlag => file.delete_flag = flag_from_sql(&value, label::DELETE_FLAG)?,
            ColumnSlot::RelativePath => file.relative_path = text(value),
            ColumnSlot::Counter(index) => {
                file.user_counters[index] = i32::try_from(integer(&value, "counter")?)
                    .map_err(|_| SqliteError::ConversionError(format!("count of file {id} is out of range")))?;
            }
            ColumnSlot::Flag(index) => file.user_flags[index] = flag_from_sql(&value, "flag")?,
            ColumnSlot::NoteOrChoice(index) => file.user_notes_and_choices[index] = text(value),
            ColumnSlot::MarkerPositions(index) => {
                file.user_marker_positions[index] = match value {
                    Value::Blob(bytes) => bytes,
                    _ => Vec::new(),
                };
            }
            ColumnSlot::File | ColumnSlot::DateTime | ColumnSlot::UtcOffset => {}
        }
    }

    file.accept_changes();
    Ok(file)
}

fn text(value: Value) -> String {
    match value {
        Value::Text(text) => text,
        Value::Integer(number) => number.to_string(),
        Value::Real(number) => number.to_string(),
        Value::Null | Value::Blob(_) => String::new(),
    }
}

/// Integer value of a column; null reads as zero.
fn integer(value: &Value, data_label: &str) -> Result<i64> {
    match value {
        Value::Integer(number) => Ok(*number),
        Value::Real(number) if number.fract() == 0.0 && number.abs() < i64::MAX as f64 => Ok(*number as i64),
        Value::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| SqliteError::ConversionError(format!("{data_label} value '{text}' is not an integer"))),
        Value::Null => Ok(0),
        Value::Real(number) => Err(SqliteError::ConversionError(format!(
            "{data_label} value {number} is not an integer"
        ))),
        Value::Blob(_) => Err(SqliteError::ConversionError(format!("{data_label} holds a binary value"))),
    }
}

/// Real value of a column; null reads as zero.
fn real(value: &Value, data_label: &str) -> Result<f64> {
    match value {
        Value::Real(number) => Ok(*number),
        Value::Integer(number) => Ok(*number as f64),
        Value::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| SqliteError::ConversionError(format!("{data_label} value '{text}' is not a number"))),
        Value::Null => Ok(0.0),
        Value::Blob(_) => Err(SqliteError::ConversionError(format!("{data_label} holds a binary value"))),
    }
}
