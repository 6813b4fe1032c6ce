//! SQLite storage for Carnassial image sets.
//!
//! A template database holds the controls defining an image set's fields.
//! A file database holds a copy of them plus one `Files` row per image or
//! video, with a column for each control.
//!
//! # Architecture
//!
//! - **`schema`**: `CREATE TABLE` and index SQL derived from controls
//! - **`column`** / **`file_row`** / **`file_table`**: the column map
//!   compiled from the controls and the typed in-memory rows it addresses
//! - **`transaction`**: batched statement execution committing every N rows,
//!   with the file, control and image set sequences built on it
//! - **`selection`** / **`find_replace`**: custom selections rendered to
//!   `WHERE` clauses and in-memory find and replace
//! - **`migration`**: upgrades of older file databases
//! - **`backup`**: time-stamped copies taken before mutations
//! - **`template_database`** / **`file_database`**: the orchestrators owning
//!   a connection
//!
//! # Quick start
//!
//! ```
//! use carnassial_config::StoreConfig;
//! use carnassial_core::{ControlType, FileSelection};
//! use carnassial_sqlite::{FileDatabase, TemplateDatabase};
//!
//! let mut template = TemplateDatabase::open_in_memory(StoreConfig::default()).unwrap();
//! template.add_user_defined_control(ControlType::Counter).unwrap();
//!
//! let mut database = FileDatabase::create_in_memory(&template).unwrap();
//! let mut new_files: Vec<_> = ["IMG_0001.JPG", "IMG_0002.JPG", "MOV_0003.MP4"]
//!     .iter()
//!     .map(|name| database.new_file(*name, "Station1").ok())
//!     .collect();
//! database.add_files(&mut new_files).unwrap();
//!
//! database.select_files(FileSelection::Video).unwrap();
//! assert_eq!(database.files().len(), 1);
//! ```

mod backup;
mod column;
mod control_table;
mod convert;
mod error;
mod file_database;
mod file_row;
mod file_table;
mod file_transactions;
mod find_replace;
mod image_set;
mod migration;
mod schema;
mod selection;
mod template_database;
mod transaction;

pub use backup::{
    BACKUP_TIMESTAMP_FORMAT, BackupSchedule, backup_file_name, backup_folder, create_backup, get_backup_files,
    rename_backups,
};
pub use column::{ColumnSlot, FileTableColumn, FileTableColumnMap};
pub use control_table::{ControlTable, ControlTransactionSequence};
pub use convert::{FieldValue, default_to_sql_literal, quote_identifier, quote_text, to_storage_literal};
pub use error::{Result, SqliteError};
pub use file_database::{FileDatabase, FileImportResult};
pub use file_row::{FileKind, FileRow, INVALID_ID};
pub use file_table::FileTable;
pub use file_transactions::{
    AddFilesTransactionSequence, FileTransactionSequence, UpdateFileColumnTransactionSequence,
    UpdateFileDateTimeOffsetTransactionSequence, insert_files_sql, update_files_sql,
};
pub use find_replace::FileFindReplace;
pub use image_set::{DEFAULT_LOG, DEFAULT_TIME_ZONE, ImageSet, ImageSetTransactionSequence};
pub use migration::{Migration, MigrationReport, MigrationStatus, SchemaVersion, get_user_version, set_user_version};
pub use schema::{
    ColumnDefinition, column_definition, control_column, create_index_sql, drop_index_sql, file_column_definitions,
    generate_controls_table_sql, generate_file_index_sql, generate_files_table_sql, generate_image_set_table_sql,
    image_set_column, index_name, marker_column_name, table,
};
pub use selection::{CustomSelection, where_for_selection};
pub use template_database::{DisplayOrder, TemplateDatabase};
pub use transaction::{ChangeTracked, RowPolicy, TransactionSequence};
