//! The `ImageSet` singleton.

use carnassial_core::{FileSelection, label};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};

use crate::convert::quote_identifier;
use crate::error::{Result, SqliteError};
use crate::schema::{image_set_column, table};
use crate::transaction::{ChangeTracked, RowPolicy, TransactionSequence};

/// Log text of a new image set.
pub const DEFAULT_LOG: &str = "Add text here";

/// Time zone of a new image set.
pub const DEFAULT_TIME_ZONE: &str = "UTC";

const IMAGE_SET_COLUMNS: [&str; 6] = [
    image_set_column::FILE_SELECTION,
    image_set_column::INITIAL_FOLDER_NAME,
    image_set_column::LOG,
    image_set_column::MOST_RECENT_FILE_ID,
    image_set_column::OPTIONS,
    image_set_column::TIME_ZONE,
];

/// State shared by every file of an image set.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSet {
    id: i64,
    file_selection: FileSelection,
    initial_folder_name: String,
    log: String,
    most_recent_file_id: i64,
    options: i64,
    time_zone: String,
    has_changes: bool,
}

impl ImageSet {
    /// Creates the image set of a folder.
    pub fn new(initial_folder_name: impl Into<String>) -> Self {
        Self {
            id: -1,
            file_selection: FileSelection::All,
            initial_folder_name: initial_folder_name.into(),
            log: DEFAULT_LOG.to_string(),
            most_recent_file_id: -1,
            options: 0,
            time_zone: DEFAULT_TIME_ZONE.to_string(),
            has_changes: true,
        }
    }

    /// Loads the image set row.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::SchemaError`] if the table is empty.
    pub fn load(conn: &Connection) -> Result<Self> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY {} LIMIT 1",
            quote_identifier(table::IMAGE_SET),
            quote_identifier(label::ID)
        );
        let image_set = conn
            .query_row(&sql, [], |row| {
                Ok((
                    row.get::<_, i64>(label::ID)?,
                    row.get::<_, i64>(image_set_column::FILE_SELECTION)?,
                    row.get::<_, String>(image_set_column::INITIAL_FOLDER_NAME)?,
                    row.get::<_, Option<String>>(image_set_column::LOG)?,
                    row.get::<_, i64>(image_set_column::MOST_RECENT_FILE_ID)?,
                    row.get::<_, i64>(image_set_column::OPTIONS)?,
                    row.get::<_, String>(image_set_column::TIME_ZONE)?,
                ))
            })
            .optional()?;
        let Some((id, file_selection, initial_folder_name, log, most_recent_file_id, options, time_zone)) = image_set
        else {
            return Err(SqliteError::SchemaError("ImageSet table has no row".to_string()));
        };
        Ok(Self {
            id,
            file_selection: FileSelection::from_database_value(file_selection)?,
            initial_folder_name,
            log: log.unwrap_or_default(),
            most_recent_file_id,
            options,
            time_zone,
            has_changes: false,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn file_selection(&self) -> FileSelection {
        self.file_selection
    }

    pub fn set_file_selection(&mut self, file_selection: FileSelection) {
        if self.file_selection != file_selection {
            self.file_selection = file_selection;
            self.has_changes = true;
        }
    }

    pub fn initial_folder_name(&self) -> &str {
        &self.initial_folder_name
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    /// Appends a line to the log. The default log text is replaced rather
    /// than kept.
    pub fn append_to_log(&mut self, entry: &str) {
        if self.log == DEFAULT_LOG || self.log.is_empty() {
            self.log = entry.to_string();
        } else {
            self.log.push('\n');
            self.log.push_str(entry);
        }
        self.has_changes = true;
    }

    pub fn set_log(&mut self, log: impl Into<String>) {
        let log = log.into();
        if self.log != log {
            self.log = log;
            self.has_changes = true;
        }
    }

    pub fn most_recent_file_id(&self) -> i64 {
        self.most_recent_file_id
    }

    pub fn set_most_recent_file_id(&mut self, id: i64) {
        if self.most_recent_file_id != id {
            self.most_recent_file_id = id;
            self.has_changes = true;
        }
    }

    /// Option bits. Zero when no options are set.
    pub fn options(&self) -> i64 {
        self.options
    }

    pub fn set_options(&mut self, options: i64) {
        if self.options != options {
            self.options = options;
            self.has_changes = true;
        }
    }

    /// Identifier of the time zone files were taken in.
    pub fn time_zone(&self) -> &str {
        &self.time_zone
    }

    pub fn set_time_zone(&mut self, time_zone: impl Into<String>) {
        let time_zone = time_zone.into();
        if self.time_zone != time_zone {
            self.time_zone = time_zone;
            self.has_changes = true;
        }
    }

    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    fn to_sql_values(&self, include_id: bool) -> Vec<Value> {
        let mut values = vec![
            Value::Integer(self.file_selection.to_database_value()),
            Value::Text(self.initial_folder_name.clone()),
            Value::Text(self.log.clone()),
            Value::Integer(self.most_recent_file_id),
            Value::Integer(self.options),
            Value::Text(self.time_zone.clone()),
        ];
        if include_id {
            values.push(Value::Integer(self.id));
        }
        values
    }
}

impl ChangeTracked for ImageSet {
    fn has_changes(&self) -> bool {
        self.has_changes
    }

    fn accept_changes(&mut self) {
        self.has_changes = false;
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

/// Inserts or updates the image set row.
pub struct ImageSetTransactionSequence<'c> {
    sequence: TransactionSequence<'c>,
    is_insert: bool,
}

impl<'c> ImageSetTransactionSequence<'c> {
    pub fn create_insert(conn: &'c Connection) -> Result<Self> {
        let names: Vec<String> = IMAGE_SET_COLUMNS.iter().map(|name| quote_identifier(name)).collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|index| format!("?{index}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table::IMAGE_SET),
            names.join(", "),
            placeholders.join(", ")
        );
        Ok(Self {
            sequence: TransactionSequence::new(conn, &sql, 1)?,
            is_insert: true,
        })
    }

    pub fn create_update(conn: &'c Connection) -> Result<Self> {
        let assignments: Vec<String> = IMAGE_SET_COLUMNS
            .iter()
            .enumerate()
            .map(|(index, name)| format!("{} = ?{}", quote_identifier(name), index + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_identifier(table::IMAGE_SET),
            assignments.join(", "),
            quote_identifier(label::ID),
            IMAGE_SET_COLUMNS.len() + 1
        );
        Ok(Self {
            sequence: TransactionSequence::new(conn, &sql, 1)?,
            is_insert: false,
        })
    }

    /// Inserts or updates the image set, by how the sequence was created.
    ///
    /// An update of an unchanged image set writes nothing.
    pub fn execute(&mut self, image_set: &mut ImageSet) -> Result<bool> {
        let (policy, include_id) = if self.is_insert {
            (RowPolicy::INSERT, false)
        } else {
            (RowPolicy::UPDATE, true)
        };
        let executed = self
            .sequence
            .execute_rows(std::iter::once(image_set), policy, |image_set| image_set.to_sql_values(include_id))?;
        Ok(executed > 0)
    }
}
