//! Transaction sequences over the `Files` table.
//!
//! Each sequence builds its statement from the column map, so the binding
//! order of [`FileRow::to_sql_values`] and the statement's placeholders
//! always agree.

use std::ops::Range;

use carnassial_core::{label, time};
use rusqlite::Connection;
use rusqlite::types::Value;

use crate::column::FileTableColumnMap;
use crate::convert::quote_identifier;
use crate::error::{Result, SqliteError};
use crate::file_row::FileRow;
use crate::schema::table;
use crate::transaction::{RowPolicy, TransactionSequence};

/// Validates a window `[offset, offset + length)` against a slice length.
pub(crate) fn window(len: usize, offset: usize, length: usize) -> Result<Range<usize>> {
    match offset.checked_add(length) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(SqliteError::InvalidArgument(format!(
            "window of {length} rows at offset {offset} exceeds {len} rows"
        ))),
    }
}

/// `INSERT INTO Files` binding every mapped column.
pub fn insert_files_sql(columns: &FileTableColumnMap) -> String {
    let names: Vec<String> = columns
        .columns()
        .iter()
        .map(|column| quote_identifier(&column.data_label))
        .collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|index| format!("?{index}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table::FILES),
        names.join(", "),
        placeholders.join(", ")
    )
}

/// `UPDATE Files` setting every mapped column, keyed by `Id`.
pub fn update_files_sql(columns: &FileTableColumnMap) -> String {
    let assignments: Vec<String> = columns
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| format!("{} = ?{}", quote_identifier(&column.data_label), index + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        quote_identifier(table::FILES),
        assignments.join(", "),
        quote_identifier(label::ID),
        assignments.len() + 1
    )
}

/// Inserts or updates whole file rows.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use carnassial_core::Control;
/// use carnassial_sqlite::{FileRow, FileTableColumnMap, FileTransactionSequence, generate_files_table_sql};
/// use rusqlite::Connection;
///
/// let controls = Control::standard_controls();
/// let conn = Connection::open_in_memory().unwrap();
/// conn.execute_batch(&generate_files_table_sql(&controls).unwrap()).unwrap();
/// let columns = Arc::new(FileTableColumnMap::new(&controls).unwrap());
///
/// let mut files = vec![FileRow::new("IMG_0001.JPG", "", Arc::clone(&columns)).unwrap()];
/// let mut insert = FileTransactionSequence::create_insert(&conn, &columns, 1000).unwrap();
/// insert.add_files(&mut files, 0, 1).unwrap();
/// assert_eq!(files[0].id(), 1);
/// assert!(!files[0].has_changes());
/// ```
pub struct FileTransactionSequence<'c> {
    sequence: TransactionSequence<'c>,
    is_insert: bool,
}

impl<'c> FileTransactionSequence<'c> {
    /// Prepares an insert of new rows.
    pub fn create_insert(conn: &'c Connection, columns: &FileTableColumnMap, rows_per_transaction: usize) -> Result<Self> {
        Ok(Self {
            sequence: TransactionSequence::new(conn, &insert_files_sql(columns), rows_per_transaction)?,
            is_insert: true,
        })
    }

    /// Prepares an update of stored rows.
    pub fn create_update(conn: &'c Connection, columns: &FileTableColumnMap, rows_per_transaction: usize) -> Result<Self> {
        Ok(Self {
            sequence: TransactionSequence::new(conn, &update_files_sql(columns), rows_per_transaction)?,
            is_insert: false,
        })
    }

    /// Inserts `files[offset..offset + length]`, recording their IDs.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidArgument`] for a window beyond the
    /// slice, or the first failing row's error.
    pub fn add_files(&mut self, files: &mut [FileRow], offset: usize, length: usize) -> Result<usize> {
        if !self.is_insert {
            return Err(SqliteError::InvalidArgument("sequence was prepared for update".to_string()));
        }
        let range = window(files.len(), offset, length)?;
        self.sequence
            .execute_rows(files[range].iter_mut(), RowPolicy::INSERT, |file| file.to_sql_values(false))
    }

    /// Writes back the changed rows of `files[offset..offset + length]`.
    pub fn update_files(&mut self, files: &mut [FileRow], offset: usize, length: usize) -> Result<usize> {
        if self.is_insert {
            return Err(SqliteError::InvalidArgument("sequence was prepared for insert".to_string()));
        }
        let range = window(files.len(), offset, length)?;
        self.sequence
            .execute_rows(files[range].iter_mut(), RowPolicy::UPDATE, |file| file.to_sql_values(true))
    }

    pub fn commits(&self) -> usize {
        self.sequence.commits()
    }

    pub fn rows_committed(&self) -> usize {
        self.sequence.rows_committed()
    }
}

/// Inserts newly found files held in a sparse buffer.
///
/// Slots left `None` by the caller, such as files which turned out to be
/// duplicates, are skipped.
pub struct AddFilesTransactionSequence<'c> {
    sequence: TransactionSequence<'c>,
}

impl<'c> AddFilesTransactionSequence<'c> {
    pub fn new(conn: &'c Connection, columns: &FileTableColumnMap, rows_per_transaction: usize) -> Result<Self> {
        Ok(Self {
            sequence: TransactionSequence::new(conn, &insert_files_sql(columns), rows_per_transaction)?,
        })
    }

    /// Inserts the present files of `files[offset..offset + length]`.
    ///
    /// Returns the number of files inserted.
    pub fn add_files(&mut self, files: &mut [Option<FileRow>], offset: usize, length: usize) -> Result<usize> {
        let range = window(files.len(), offset, length)?;
        self.sequence.execute_rows(
            files[range].iter_mut().flatten(),
            RowPolicy::INSERT,
            |file| file.to_sql_values(false),
        )
    }

    pub fn commits(&self) -> usize {
        self.sequence.commits()
    }

    pub fn rows_committed(&self) -> usize {
        self.sequence.rows_committed()
    }
}

/// Writes one column of each changed row in a window.
///
/// Rows without changes are skipped and written rows are accepted once their
/// window commits. A caller with edits pending in other columns runs the
/// sequence inside its own transaction, which leaves acceptance to it.
pub struct UpdateFileColumnTransactionSequence<'c> {
    sequence: TransactionSequence<'c>,
    data_label: String,
}

impl<'c> UpdateFileColumnTransactionSequence<'c> {
    /// Prepares an update of `data_label`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidArgument`] if the column is not mapped.
    pub fn new(
        conn: &'c Connection,
        data_label: &str,
        columns: &FileTableColumnMap,
        rows_per_transaction: usize,
    ) -> Result<Self> {
        columns.require(data_label)?;
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2",
            quote_identifier(table::FILES),
            quote_identifier(data_label),
            quote_identifier(label::ID)
        );
        Ok(Self {
            sequence: TransactionSequence::new(conn, &sql, rows_per_transaction)?,
            data_label: data_label.to_string(),
        })
    }

    /// Writes the column for the changed rows of `files[offset..offset + length]`.
    pub fn update_files(&mut self, files: &mut [FileRow], offset: usize, length: usize) -> Result<usize> {
        let range = window(files.len(), offset, length)?;
        let data_label = self.data_label.as_str();
        self.sequence
            .execute_rows(files[range].iter_mut(), RowPolicy::UPDATE, |file| {
                // the column was checked when the sequence was prepared
                let value = file
                    .get_database_value(data_label)
                    .map_or(Value::Null, |value| value.to_sql_value());
                vec![value, Value::Integer(file.id())]
            })
    }

    pub fn commits(&self) -> usize {
        self.sequence.commits()
    }
}

/// Writes the DateTime and UtcOffset columns of each changed row in a window.
pub struct UpdateFileDateTimeOffsetTransactionSequence<'c> {
    sequence: TransactionSequence<'c>,
}

impl<'c> UpdateFileDateTimeOffsetTransactionSequence<'c> {
    pub fn new(conn: &'c Connection, rows_per_transaction: usize) -> Result<Self> {
        let sql = format!(
            "UPDATE {} SET {} = ?1, {} = ?2 WHERE {} = ?3",
            quote_identifier(table::FILES),
            quote_identifier(label::DATE_TIME),
            quote_identifier(label::UTC_OFFSET),
            quote_identifier(label::ID)
        );
        Ok(Self {
            sequence: TransactionSequence::new(conn, &sql, rows_per_transaction)?,
        })
    }

    /// Writes date-times and offsets for the changed rows of
    /// `files[offset..offset + length]`.
    pub fn update_files(&mut self, files: &mut [FileRow], offset: usize, length: usize) -> Result<usize> {
        let range = window(files.len(), offset, length)?;
        self.sequence
            .execute_rows(files[range].iter_mut(), RowPolicy::UPDATE, |file| {
                vec![
                    Value::Text(time::to_database_date_time_string(&file.date_time())),
                    Value::Real(time::utc_offset_to_hours(file.utc_offset())),
                    Value::Integer(file.id()),
                ]
            })
    }

    pub fn commits(&self) -> usize {
        self.sequence.commits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use carnassial_core::{Control, ControlType};

    use crate::file_table::FileTable;

    fn setup() -> (Connection, Arc<FileTableColumnMap>) {
        let mut controls = Control::standard_controls();
        controls.push(Control::new(ControlType::Counter, "Animals", 7));
        controls.push(Control::new(ControlType::Note, "Comments", 8));
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&crate::schema::generate_files_table_sql(&controls).unwrap())
            .unwrap();
        (conn, Arc::new(FileTableColumnMap::new(&controls).unwrap()))
    }

    fn new_files(columns: &Arc<FileTableColumnMap>, count: usize) -> Vec<FileRow> {
        (0..count)
            .map(|index| FileRow::new(format!("IMG_{index:04}.JPG"), "Station1", Arc::clone(columns)).unwrap())
            .collect()
    }

    #[test]
    fn test_statements_follow_binding_order() {
        let (_, columns) = setup();
        assert_eq!(
            insert_files_sql(&columns),
            "INSERT INTO \"Files\" (\"Classification\", \"DateTime\", \"DeleteFlag\", \"File\", \"RelativePath\", \"UtcOffset\", \"Animals\", \"AnimalsMarkers\", \"Comments\") VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        );
        assert!(update_files_sql(&columns).ends_with("\"Comments\" = ?9 WHERE \"Id\" = ?10"));
    }

    #[test]
    fn test_window_bounds() {
        assert_eq!(window(10, 2, 8).unwrap(), 2..10);
        assert!(window(10, 2, 9).is_err());
        assert!(window(10, usize::MAX, 2).is_err());
    }

    #[test]
    fn test_insert_then_update_changed_rows() {
        let (conn, columns) = setup();
        let mut files = new_files(&columns, 5);
        let mut insert = FileTransactionSequence::create_insert(&conn, &columns, 2).unwrap();
        assert_eq!(insert.add_files(&mut files, 0, 5).unwrap(), 5);
        assert_eq!(insert.commits(), 3);
        drop(insert);

        files[3].set_counter("Animals", 4).unwrap();
        let mut update = FileTransactionSequence::create_update(&conn, &columns, 2).unwrap();
        assert_eq!(update.update_files(&mut files, 0, 5).unwrap(), 1);
        assert!(update.add_files(&mut files, 0, 1).is_err());
        drop(update);

        let loaded = FileTable::load(&conn, "SELECT * FROM Files ORDER BY Id", Arc::clone(&columns)).unwrap();
        assert_eq!(loaded.get(3).unwrap().get_counter("Animals").unwrap(), 4);
        assert!(files.iter().all(|file| !file.has_changes()));
    }

    #[test]
    fn test_add_files_skips_placeholders() {
        let (conn, columns) = setup();
        let mut files: Vec<Option<FileRow>> = new_files(&columns, 4).into_iter().map(Some).collect();
        files[1] = None;
        let mut add = AddFilesTransactionSequence::new(&conn, &columns, 1000).unwrap();
        assert_eq!(add.add_files(&mut files, 0, 4).unwrap(), 3);
        assert_eq!(add.rows_committed(), 3);
        assert_eq!(files[3].as_ref().unwrap().id(), 3);
    }

    #[test]
    fn test_column_update_writes_changed_rows_only() {
        let (conn, columns) = setup();
        let mut files = new_files(&columns, 3);
        FileTransactionSequence::create_insert(&conn, &columns, 10)
            .unwrap()
            .add_files(&mut files, 0, 3)
            .unwrap();
        files[2].set_note_or_choice("Comments", "seen").unwrap();

        let mut update = UpdateFileColumnTransactionSequence::new(&conn, "Comments", &columns, 10).unwrap();
        assert_eq!(update.update_files(&mut files, 1, 2).unwrap(), 1);
        drop(update);
        assert!(files.iter().all(|file| !file.has_changes()));

        let loaded = FileTable::load(&conn, "SELECT * FROM Files ORDER BY Id", Arc::clone(&columns)).unwrap();
        assert_eq!(loaded.get(1).unwrap().get_note_or_choice("Comments").unwrap(), "");
        assert_eq!(loaded.get(2).unwrap().get_note_or_choice("Comments").unwrap(), "seen");
        assert!(UpdateFileColumnTransactionSequence::new(&conn, "Species", &columns, 10).is_err());
    }

    #[test]
    fn test_column_update_in_owner_transaction_leaves_change_flags() {
        let (conn, columns) = setup();
        let mut files = new_files(&columns, 2);
        FileTransactionSequence::create_insert(&conn, &columns, 10)
            .unwrap()
            .add_files(&mut files, 0, 2)
            .unwrap();
        files[0].set_note_or_choice("Comments", "seen").unwrap();
        files[0].set_counter("Animals", 9).unwrap();

        let transaction = conn.unchecked_transaction().unwrap();
        let mut update = UpdateFileColumnTransactionSequence::new(&conn, "Comments", &columns, 1).unwrap();
        assert_eq!(update.update_files(&mut files, 0, 2).unwrap(), 1);
        assert_eq!(update.commits(), 0);
        drop(update);
        transaction.commit().unwrap();
        assert!(files[0].has_changes());

        let loaded = FileTable::load(&conn, "SELECT * FROM Files ORDER BY Id", Arc::clone(&columns)).unwrap();
        assert_eq!(loaded.get(0).unwrap().get_note_or_choice("Comments").unwrap(), "seen");
        assert_eq!(loaded.get(0).unwrap().get_counter("Animals").unwrap(), 0);
    }

    #[test]
    fn test_date_time_offset_update() {
        let (conn, columns) = setup();
        let mut files = new_files(&columns, 2);
        FileTransactionSequence::create_insert(&conn, &columns, 10)
            .unwrap()
            .add_files(&mut files, 0, 2)
            .unwrap();
        files[1]
            .set_database_string("DateTime", "2019-08-01T10:30:00.000Z")
            .unwrap();
        files[1].set_database_string("UtcOffset", "5.75").unwrap();

        let mut update = UpdateFileDateTimeOffsetTransactionSequence::new(&conn, 10).unwrap();
        assert_eq!(update.update_files(&mut files, 0, 2).unwrap(), 1);
        drop(update);
        assert!(!files[1].has_changes());

        let loaded = FileTable::load(&conn, "SELECT * FROM Files ORDER BY Id", Arc::clone(&columns)).unwrap();
        let row = loaded.get(1).unwrap();
        assert_eq!(row.get_database_string("DateTime").unwrap(), "2019-08-01T10:30:00.000Z");
        assert_eq!(row.get_database_string("UtcOffset").unwrap(), "5.75");
    }
}
