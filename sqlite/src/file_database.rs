//! File databases: a template's tables plus the `Files` table holding one
//! row per image or video.
//!
//! Opening an existing database upgrades its schema, then checks its
//! controls against the template. Any discrepancy is recorded in
//! [`FileDatabase::control_synchronization_issues`] and the database opens
//! with its own controls; otherwise the template's edits are applied.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use carnassial_config::StoreConfig;
use carnassial_core::{ControlType, FileClassification, FileSelection, label, time};
use chrono::{DateTime, FixedOffset, TimeDelta};
use rusqlite::Connection;
use rusqlite::types::Value;
use tracing::{debug, info, warn};

use crate::backup::BackupSchedule;
use crate::column::{ColumnSlot, FileTableColumnMap};
use crate::control_table::{ControlTable, ControlTransactionSequence};
use crate::convert::quote_identifier;
use crate::error::{Result, SqliteError};
use crate::file_row::FileRow;
use crate::file_table::FileTable;
use crate::file_transactions::{
    AddFilesTransactionSequence, FileTransactionSequence, UpdateFileColumnTransactionSequence,
    UpdateFileDateTimeOffsetTransactionSequence,
};
use crate::find_replace::FileFindReplace;
use crate::image_set::ImageSet;
use crate::migration::{Migration, table_exists};
use crate::schema::{
    add_file_column_sql, create_index_sql, drop_index_sql, file_column_definitions, generate_file_index_sql,
    generate_files_table_sql, marker_column_name, table,
};
use crate::selection::{CustomSelection, where_for_selection};
use crate::template_database::TemplateDatabase;

/// Outcome of [`FileDatabase::try_import_data`].
///
/// Errors describe column mismatches, which stop the import before anything
/// is written, and values which could not be copied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileImportResult {
    pub errors: Vec<String>,
    pub files_added: usize,
    pub files_updated: usize,
    /// Files added, updated, and already matching.
    pub files_processed: usize,
}

/// An image set's database.
///
/// # Examples
///
/// ```
/// use carnassial_config::StoreConfig;
/// use carnassial_core::FileSelection;
/// use carnassial_sqlite::{FileDatabase, TemplateDatabase};
///
/// let template = TemplateDatabase::open_in_memory(StoreConfig::default()).unwrap();
/// let mut database = FileDatabase::create_in_memory(&template).unwrap();
///
/// let mut files = vec![Some(database.new_file("IMG_0001.JPG", "Station1").unwrap())];
/// assert_eq!(database.add_files(&mut files).unwrap(), 1);
///
/// database.select_files(FileSelection::All).unwrap();
/// assert_eq!(database.files().len(), 1);
/// assert_eq!(database.get_file_count(FileSelection::Video).unwrap(), Some(0));
/// ```
pub struct FileDatabase {
    base: TemplateDatabase,
    columns: Arc<FileTableColumnMap>,
    files: FileTable,
    custom_selection: CustomSelection,
    control_synchronization_issues: Vec<String>,
}

impl FileDatabase {
    /// Opens the file database at `path`, creating it from `template` if it
    /// does not exist.
    ///
    /// A new database starts with its files selected; an existing one leaves
    /// selection to the caller since loading a large image set is slow.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::MigrationError`] if an older schema cannot be
    /// upgraded and [`SqliteError::SchemaError`] if the file has no
    /// `Controls` or `Files` table.
    pub fn create_or_open(path: impl AsRef<Path>, template: &TemplateDatabase) -> Result<Self> {
        let path = path.as_ref();
        let exists = path.exists();
        let conn = Connection::open(path)?;
        let config = template.config().clone();
        let backup = Some(BackupSchedule::new(path, config.backup.clone())?);

        let database = if exists {
            let base = TemplateDatabase::open_existing(conn, Some(path.to_path_buf()), config, backup)?;
            Self::open_existing(base, template)?
        } else {
            Self::create(conn, Some(path.to_path_buf()), backup, template)?
        };
        info!(
            path = %path.display(),
            created = !exists,
            issues = database.control_synchronization_issues.len(),
            "opened file database"
        );
        Ok(database)
    }

    /// Creates a file database in memory from `template`.
    pub fn create_in_memory(template: &TemplateDatabase) -> Result<Self> {
        Self::create(Connection::open_in_memory()?, None, None, template)
    }

    fn create(
        conn: Connection,
        path: Option<PathBuf>,
        backup: Option<BackupSchedule>,
        template: &TemplateDatabase,
    ) -> Result<Self> {
        // must precede the first table
        conn.pragma_update(None, "auto_vacuum", "INCREMENTAL")?;
        let base = TemplateDatabase::create(conn, path, template.config().clone(), backup, Some(template))?;
        {
            let tx = base.conn.unchecked_transaction()?;
            tx.execute_batch(&generate_files_table_sql(base.controls.controls())?)?;
            for index in generate_file_index_sql(base.controls.controls()) {
                tx.execute_batch(&index)?;
            }
            tx.commit()?;
        }

        let mut database = Self::from_base(base, Vec::new())?;
        let selection = database.base.image_set.file_selection();
        database.select_files(selection)?;
        Ok(database)
    }

    fn open_existing(mut base: TemplateDatabase, template: &TemplateDatabase) -> Result<Self> {
        Migration::new(&base.conn).up(base.controls.controls())?;
        if !table_exists(&base.conn, table::FILES)? {
            return Err(SqliteError::SchemaError(format!("no {} table", table::FILES)));
        }

        let issues = check_synchronization(&base, template)?;
        if issues.is_empty() {
            synchronize_controls(&mut base, template)?;
        } else {
            for issue in &issues {
                warn!(issue = %issue, "file database differs from template");
            }
        }
        Self::from_base(base, issues)
    }

    /// Opens another image set's database for reading its files, without a
    /// template to synchronize with.
    fn open_for_import(path: &Path, config: StoreConfig) -> Result<Self> {
        if !path.is_file() {
            return Err(SqliteError::InvalidArgument(format!("{} does not exist", path.display())));
        }
        let conn = Connection::open(path)?;
        let base = TemplateDatabase::open_existing(conn, Some(path.to_path_buf()), config, None)?;
        Migration::new(&base.conn).up(base.controls.controls())?;
        if !table_exists(&base.conn, table::FILES)? {
            return Err(SqliteError::SchemaError(format!("no {} table", table::FILES)));
        }
        Self::from_base(base, Vec::new())
    }

    fn from_base(base: TemplateDatabase, control_synchronization_issues: Vec<String>) -> Result<Self> {
        let columns = Arc::new(FileTableColumnMap::new(base.controls.controls())?);
        let custom_selection = CustomSelection::new(base.controls.controls(), base.config.custom_selection_combiner);
        Ok(Self {
            files: FileTable::new(Arc::clone(&columns)),
            columns,
            custom_selection,
            control_synchronization_issues,
            base,
        })
    }

    pub fn connection(&self) -> &Connection {
        self.base.connection()
    }

    pub fn path(&self) -> Option<&Path> {
        self.base.path()
    }

    /// Folder holding the database and its image set's files.
    pub fn folder_path(&self) -> Option<&Path> {
        self.path().and_then(Path::parent)
    }

    pub fn controls(&self) -> &ControlTable {
        self.base.controls()
    }

    pub fn columns(&self) -> &Arc<FileTableColumnMap> {
        &self.columns
    }

    pub fn image_set(&self) -> &ImageSet {
        self.base.image_set()
    }

    pub fn image_set_mut(&mut self) -> &mut ImageSet {
        self.base.image_set_mut()
    }

    /// Stores the image set.
    pub fn sync_image_set_to_database(&mut self) -> Result<bool> {
        self.base.sync_image_set_to_database()
    }

    /// Files of the current selection.
    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileTable {
        &mut self.files
    }

    pub fn custom_selection(&self) -> &CustomSelection {
        &self.custom_selection
    }

    pub fn custom_selection_mut(&mut self) -> &mut CustomSelection {
        &mut self.custom_selection
    }

    /// Differences from the template found when the database was opened.
    pub fn control_synchronization_issues(&self) -> &[String] {
        &self.control_synchronization_issues
    }

    pub fn order_files_by_date_time(&self) -> bool {
        self.base.config.order_files_by_date_time
    }

    /// Takes effect at the next [`select_files`](Self::select_files).
    pub fn set_order_files_by_date_time(&mut self, order_files_by_date_time: bool) {
        self.base.config.order_files_by_date_time = order_files_by_date_time;
    }

    pub fn currently_selected_file_count(&self) -> usize {
        self.files.len()
    }

    /// Backs the database up if the backup interval has passed.
    pub fn create_backup_if_needed(&mut self) -> Result<Option<PathBuf>> {
        self.base.create_backup_if_needed()
    }

    /// Renames the database file and its backups, keeping it open.
    pub fn rename_database_file(&mut self, new_file_name: &str) -> Result<PathBuf> {
        self.base.rename_database_file(new_file_name)
    }

    /// Creates a row for a newly found file with this database's defaults.
    pub fn new_file(&self, file_name: impl Into<String>, relative_path: impl Into<String>) -> Result<FileRow> {
        FileRow::new(file_name, relative_path, Arc::clone(&self.columns))
    }

    pub fn create_add_files_transaction(&self) -> Result<AddFilesTransactionSequence<'_>> {
        AddFilesTransactionSequence::new(self.connection(), &self.columns, self.base.config.rows_per_transaction)
    }

    pub fn create_insert_file_transaction(&self) -> Result<FileTransactionSequence<'_>> {
        FileTransactionSequence::create_insert(self.connection(), &self.columns, self.base.config.rows_per_transaction)
    }

    pub fn create_update_file_transaction(&self) -> Result<FileTransactionSequence<'_>> {
        FileTransactionSequence::create_update(self.connection(), &self.columns, self.base.config.rows_per_transaction)
    }

    pub fn create_update_file_column_transaction(
        &self,
        data_label: &str,
    ) -> Result<UpdateFileColumnTransactionSequence<'_>> {
        UpdateFileColumnTransactionSequence::new(
            self.connection(),
            data_label,
            &self.columns,
            self.base.config.rows_per_transaction,
        )
    }

    pub fn create_update_file_date_time_transaction(&self) -> Result<UpdateFileDateTimeOffsetTransactionSequence<'_>> {
        UpdateFileDateTimeOffsetTransactionSequence::new(self.connection(), self.base.config.rows_per_transaction)
    }

    /// Inserts newly found files, skipping empty slots.
    ///
    /// Returns the number of files inserted. The in-memory selection is not
    /// reloaded.
    pub fn add_files(&mut self, files: &mut [Option<FileRow>]) -> Result<usize> {
        self.create_backup_if_needed()?;
        let mut insert = self.create_add_files_transaction()?;
        let len = files.len();
        let added = insert.add_files(files, 0, len)?;
        info!(added, commits = insert.commits(), "added files");
        Ok(added)
    }

    /// Reloads the in-memory table with the files of `selection` and
    /// persists the selection.
    ///
    /// A custom selection without enabled terms selects every file.
    pub fn select_files(&mut self, selection: FileSelection) -> Result<()> {
        let mut sql = format!("SELECT * FROM {}", quote_identifier(table::FILES));
        if let Some(where_clause) = where_for_selection(selection, &self.custom_selection)? {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        if self.order_files_by_date_time() {
            sql.push_str(&format!(
                " ORDER BY {}, {}",
                quote_identifier(label::DATE_TIME),
                quote_identifier(label::ID)
            ));
        } else {
            sql.push_str(&format!(" ORDER BY {}", quote_identifier(label::ID)));
        }

        self.files = FileTable::load(self.connection(), &sql, Arc::clone(&self.columns))?;
        self.base.image_set.set_file_selection(selection);
        self.base.sync_image_set_to_database()?;
        debug!(?selection, files = self.files.len(), "selected files");
        Ok(())
    }

    /// Number of files in `selection`, or `None` for a custom selection
    /// without enabled terms.
    pub fn get_file_count(&self, selection: FileSelection) -> Result<Option<usize>> {
        let where_clause = where_for_selection(selection, &self.custom_selection)?;
        if selection == FileSelection::Custom && where_clause.is_none() {
            return Ok(None);
        }
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table::FILES));
        if let Some(where_clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        let count: i64 = self.connection().query_row(&sql, [], |row| row.get(0))?;
        Ok(Some(count_from_sql(count)?))
    }

    /// Number of files of each classification, zero included.
    pub fn get_file_counts_by_classification(&self) -> Result<BTreeMap<FileClassification, usize>> {
        let mut counts: BTreeMap<FileClassification, usize> =
            FileClassification::ALL.iter().map(|classification| (*classification, 0)).collect();
        let classification = quote_identifier(label::CLASSIFICATION);
        let mut statement = self.connection().prepare(&format!(
            "SELECT {classification}, COUNT(*) FROM {} GROUP BY {classification}",
            quote_identifier(table::FILES)
        ))?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            let classification = FileClassification::from_database_value(row.get(0)?)?;
            counts.insert(classification, count_from_sql(row.get(1)?)?);
        }
        Ok(counts)
    }

    pub fn is_file_row_in_range(&self, index: usize) -> bool {
        index < self.files.len()
    }

    /// Whether the file at `index` is in range and displayable.
    pub fn is_file_displayable(&self, index: usize) -> bool {
        self.files.get(index).is_some_and(FileRow::is_displayable)
    }

    /// First displayable file at or after `start`, else the closest
    /// displayable file before it.
    pub fn get_current_or_next_displayable_file(&self, start: usize) -> Option<usize> {
        (start..self.files.len())
            .find(|index| self.is_file_displayable(*index))
            .or_else(|| (0..start.min(self.files.len())).rev().find(|index| self.is_file_displayable(*index)))
    }

    /// Index of the file with `id` or, failing that, of the file with the
    /// next larger ID.
    pub fn get_file_or_next_file_index(&self, id: i64) -> usize {
        self.files
            .iter()
            .position(|file| file.id() == id)
            .unwrap_or_else(|| self.files.get_file_or_next_file_index(id))
    }

    /// Loads the files whose delete flag is set.
    pub fn get_files_marked_for_deletion(&self) -> Result<FileTable> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = 1 ORDER BY {}",
            quote_identifier(table::FILES),
            quote_identifier(label::DELETE_FLAG),
            quote_identifier(label::ID)
        );
        FileTable::load(self.connection(), &sql, Arc::clone(&self.columns))
    }

    /// Deletes the files with the given IDs and releases their pages.
    ///
    /// Returns the number of rows deleted. The in-memory selection is not
    /// reloaded.
    pub fn delete_files(&mut self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.create_backup_if_needed()?;

        let conn = self.connection();
        let tx = conn.unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut statement = tx.prepare(&format!(
                "DELETE FROM {} WHERE {} = ?1",
                quote_identifier(table::FILES),
                quote_identifier(label::ID)
            ))?;
            for id in ids {
                deleted += statement.execute([id])?;
            }
        }
        tx.execute_batch("PRAGMA incremental_vacuum")?;
        tx.commit()?;
        info!(requested = ids.len(), deleted, "deleted files");
        Ok(deleted)
    }

    fn check_range(&self, range: &Range<usize>) -> Result<()> {
        if range.start > range.end || range.end > self.files.len() {
            return Err(SqliteError::InvalidArgument(format!(
                "file range {range:?} is outside the {} selected files",
                self.files.len()
            )));
        }
        Ok(())
    }

    /// Sets `data_label` of each file in `range` to its value in `source`.
    ///
    /// Returns the number of files written. Edits pending in other columns
    /// stay pending.
    pub fn update_files(&mut self, source: &FileRow, data_label: &str, range: Range<usize>) -> Result<usize> {
        self.check_range(&range)?;
        let value = source.get_database_value(data_label)?;
        if range.is_empty() {
            return Ok(0);
        }
        self.create_backup_if_needed()?;

        let snapshot = self.files.rows()[range.clone()].to_vec();
        let mut accept = Vec::with_capacity(range.len());
        for index in range.clone() {
            let file = &mut self.files.rows_mut()[index];
            let was_clean = !file.has_changes();
            if let Err(error) = file.set_database_value(data_label, value.clone()) {
                self.restore_files(range, snapshot);
                return Err(error);
            }
            if was_clean {
                accept.push(index);
            }
        }

        self.commit_file_edits(range, snapshot, &accept, |conn, columns, rows_per_transaction, files| {
            let len = files.len();
            UpdateFileColumnTransactionSequence::new(conn, data_label, columns, rows_per_transaction)?
                .update_files(files, 0, len)
        })
    }

    /// Shifts the date and time of each file in `range` by `adjustment`.
    ///
    /// Returns the number of files changed.
    pub fn adjust_file_times(&mut self, adjustment: TimeDelta, range: Range<usize>) -> Result<usize> {
        let mut overflow = false;
        let adjusted = self.adjust_file_times_with(
            |date_time| match date_time.checked_add_signed(adjustment) {
                Some(adjusted) => adjusted,
                None => {
                    overflow = true;
                    date_time
                }
            },
            range,
        )?;
        if overflow {
            warn!(%adjustment, "adjustment moved some files outside the supported date range; they were left unchanged");
        }
        Ok(adjusted)
    }

    /// Applies `adjust` to the date and time of each file in `range`.
    ///
    /// Files `adjust` leaves unchanged are skipped. A log entry records the
    /// first and last files changed.
    pub fn adjust_file_times_with<F>(&mut self, mut adjust: F, range: Range<usize>) -> Result<usize>
    where
        F: FnMut(DateTime<FixedOffset>) -> DateTime<FixedOffset>,
    {
        self.check_range(&range)?;
        let snapshot = self.files.rows()[range.clone()].to_vec();
        let mut adjusted: Vec<usize> = Vec::new();
        let mut accept: Vec<usize> = Vec::new();
        let mut most_recent_adjustment = TimeDelta::zero();
        for index in range.clone() {
            let file = &mut self.files.rows_mut()[index];
            let current = file.date_time();
            let new = adjust(current);
            if new == current && new.offset() == current.offset() {
                continue;
            }
            let was_clean = !file.has_changes();
            if let Err(error) = file.set_date_time(new) {
                self.restore_files(range, snapshot);
                return Err(error);
            }
            most_recent_adjustment = new.signed_duration_since(current);
            adjusted.push(index);
            if was_clean {
                accept.push(index);
            }
        }
        if adjusted.is_empty() {
            return Ok(0);
        }

        self.write_date_times(range, snapshot, &accept)?;
        let entry = format!(
            "System entry: Adjusted dates and times of {} selected files.\nThe first file adjusted was '{}', the last '{}', and the last file was adjusted by {}.",
            adjusted.len(),
            self.files.rows()[adjusted[0]].file_name(),
            self.files.rows()[adjusted[adjusted.len() - 1]].file_name(),
            most_recent_adjustment
        );
        self.append_to_image_set_log(&entry)?;
        Ok(adjusted.len())
    }

    /// Swaps day and month of each file in `range` whose day is a valid
    /// month.
    ///
    /// Returns the number of files changed.
    pub fn exchange_day_and_month_in_file_dates(&mut self, range: Range<usize>) -> Result<usize> {
        self.check_range(&range)?;
        let snapshot = self.files.rows()[range.clone()].to_vec();
        let mut swapped: Vec<usize> = Vec::new();
        let mut accept: Vec<usize> = Vec::new();
        let mut last_change = None;
        for index in range.clone() {
            let file = &mut self.files.rows_mut()[index];
            let original = file.date_time();
            let Some(reversed) = time::try_swap_day_month(&original) else {
                continue;
            };
            if reversed == original {
                continue;
            }
            let was_clean = !file.has_changes();
            if let Err(error) = file.set_date_time(reversed) {
                self.restore_files(range, snapshot);
                return Err(error);
            }
            swapped.push(index);
            if was_clean {
                accept.push(index);
            }
            last_change = Some((original, reversed));
        }
        let Some((original, reversed)) = last_change else {
            return Ok(0);
        };

        self.write_date_times(range, snapshot, &accept)?;
        let entry = format!(
            "System entry: Swapped days and months for {} files.\nThe first file adjusted was '{}' and the last '{}'.\nThe last file's date was changed from '{}' to '{}'.",
            swapped.len(),
            self.files.rows()[swapped[0]].file_name(),
            self.files.rows()[swapped[swapped.len() - 1]].file_name(),
            original.format("%d-%b-%Y"),
            reversed.format("%d-%b-%Y")
        );
        self.append_to_image_set_log(&entry)?;
        Ok(swapped.len())
    }

    fn write_date_times(&mut self, range: Range<usize>, snapshot: Vec<FileRow>, accept: &[usize]) -> Result<usize> {
        if let Err(error) = self.create_backup_if_needed() {
            self.restore_files(range, snapshot);
            return Err(error);
        }
        self.commit_file_edits(range, snapshot, accept, |conn, _, rows_per_transaction, files| {
            let len = files.len();
            UpdateFileDateTimeOffsetTransactionSequence::new(conn, rows_per_transaction)?.update_files(files, 0, len)
        })
    }

    /// Replaces the matching values of every selected file.
    ///
    /// Returns the number of files written. Whole rows are written, so edits
    /// pending in the written files are stored too.
    pub fn replace_all_in_files(&mut self, find_replace: &FileFindReplace) -> Result<usize> {
        let range = 0..self.files.len();
        let snapshot = self.files.rows().to_vec();
        let mut replaced = 0;
        for index in range.clone() {
            let file = &mut self.files.rows_mut()[index];
            let result = find_replace
                .matches(file)
                .and_then(|matches| if matches { find_replace.try_replace(file) } else { Ok(false) });
            match result {
                Ok(true) => replaced += 1,
                Ok(false) => {}
                Err(error) => {
                    self.restore_files(range, snapshot);
                    return Err(error);
                }
            }
        }
        if replaced == 0 {
            return Ok(0);
        }
        if let Err(error) = self.create_backup_if_needed() {
            self.restore_files(range, snapshot);
            return Err(error);
        }

        let accept: Vec<usize> = range.clone().filter(|index| self.files.rows()[*index].has_changes()).collect();
        let written = self.commit_file_edits(range, snapshot, &accept, |conn, columns, rows_per_transaction, files| {
            let len = files.len();
            FileTransactionSequence::create_update(conn, columns, rows_per_transaction)?.update_files(files, 0, len)
        })?;
        info!(replaced, written, "replaced values in files");
        Ok(written)
    }

    /// Stores edits already made to the files in `range` in one
    /// transaction.
    ///
    /// `write` receives the open transaction and the files of `range`. Once
    /// it commits, the files at `accept` are marked clean. If anything
    /// fails the files are restored from `snapshot`.
    fn commit_file_edits<W>(&mut self, range: Range<usize>, snapshot: Vec<FileRow>, accept: &[usize], write: W) -> Result<usize>
    where
        W: FnOnce(&Connection, &FileTableColumnMap, usize, &mut [FileRow]) -> Result<usize>,
    {
        let rows_per_transaction = self.base.config.rows_per_transaction;
        let result = write_in_transaction(
            &self.base.conn,
            &self.columns,
            rows_per_transaction,
            &mut self.files.rows_mut()[range.clone()],
            write,
        );
        match result {
            Ok(written) => {
                for index in accept {
                    self.files.rows_mut()[*index].accept_changes();
                }
                Ok(written)
            }
            Err(error) => {
                warn!(error = %error, files = range.len(), "write of file edits failed; edits were reverted");
                self.restore_files(range, snapshot);
                Err(error)
            }
        }
    }

    fn restore_files(&mut self, range: Range<usize>, snapshot: Vec<FileRow>) {
        for (file, original) in self.files.rows_mut()[range].iter_mut().zip(snapshot) {
            *file = original;
        }
    }

    /// Writes the file at `index` if it has changes.
    pub fn try_sync_file_to_database(&mut self, index: usize) -> Result<bool> {
        let Some(file) = self.files.get(index) else {
            return Err(SqliteError::InvalidArgument(format!(
                "file {index} is outside the {} selected files",
                self.files.len()
            )));
        };
        if !file.has_changes() {
            return Ok(false);
        }
        self.create_backup_if_needed()?;
        let written = FileTransactionSequence::create_update(
            self.base.connection(),
            &self.columns,
            self.base.config.rows_per_transaction,
        )?
        .update_files(self.files.rows_mut(), index, 1)?;
        Ok(written > 0)
    }

    /// Moves every selected file into `destination`, a folder under the
    /// database's folder given either absolute or relative to it.
    ///
    /// Returns the relative paths of files which could not be moved: missing
    /// files, files whose name is taken at the destination, and files the
    /// move failed for.
    pub fn move_selected_files_to_folder(&mut self, destination: &Path) -> Result<Vec<String>> {
        let Some(folder) = self.folder_path().map(Path::to_path_buf) else {
            return Err(SqliteError::InvalidArgument("an in-memory database has no folder".to_string()));
        };
        let relative = if destination.is_absolute() {
            destination.strip_prefix(&folder).map_err(|_| {
                SqliteError::InvalidArgument(format!(
                    "{} is not under {}",
                    destination.display(),
                    folder.display()
                ))
            })?
        } else {
            destination
        };
        let destination_relative_path = relative.to_string_lossy().into_owned();
        self.create_backup_if_needed()?;

        let range = 0..self.files.len();
        let snapshot = self.files.rows().to_vec();
        let mut moved = Vec::new();
        let mut accept = Vec::new();
        let mut immovable = Vec::new();
        for (index, file) in self.files.rows_mut().iter_mut().enumerate() {
            let was_clean = !file.has_changes();
            match file.try_move_file_to_folder(&folder, &destination_relative_path) {
                Ok(true) => {
                    moved.push(index);
                    if was_clean {
                        accept.push(index);
                    }
                }
                Ok(false) => immovable.push(file.get_relative_path().to_string_lossy().into_owned()),
                Err(e) => {
                    warn!(file = %file.get_relative_path().display(), error = %e, "failed to move file");
                    immovable.push(file.get_relative_path().to_string_lossy().into_owned());
                }
            }
        }

        if !moved.is_empty() {
            let result = write_in_transaction(
                &self.base.conn,
                &self.columns,
                self.base.config.rows_per_transaction,
                self.files.rows_mut(),
                |conn, columns, rows_per_transaction, files| {
                    let len = files.len();
                    UpdateFileColumnTransactionSequence::new(conn, label::RELATIVE_PATH, columns, rows_per_transaction)?
                        .update_files(files, 0, len)
                },
            );
            if let Err(error) = result {
                for index in &moved {
                    let original = snapshot[*index].relative_path().to_string();
                    let file = &mut self.files.rows_mut()[*index];
                    if let Err(e) = file.try_move_file_to_folder(&folder, &original) {
                        warn!(file = %file.get_relative_path().display(), error = %e, "failed to move file back");
                    }
                }
                warn!(error = %error, moved = moved.len(), "storing moved files failed; files were moved back");
                self.restore_files(range, snapshot);
                return Err(error);
            }
            for index in &accept {
                self.files.rows_mut()[*index].accept_changes();
            }
        }
        info!(moved = moved.len(), immovable = immovable.len(), destination = %destination_relative_path, "moved files");
        Ok(immovable)
    }

    /// Merges the files of the database at `other_path` into this one.
    ///
    /// The other database must sit in this database's folder or below it;
    /// its relative paths are prefixed with the folder between the two.
    /// Files already present take the other database's values and the rest
    /// are added. Nothing is written if the two databases' columns differ,
    /// in which case the differences are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidArgument`] unless all files are
    /// selected, for an in-memory database, and if the other database is
    /// outside this one's folder.
    pub fn try_import_data(&mut self, other_path: &Path) -> Result<FileImportResult> {
        if self.image_set().file_selection() != FileSelection::All {
            return Err(SqliteError::InvalidArgument(
                "files can only be imported while all files are selected".to_string(),
            ));
        }
        let Some(folder) = self.folder_path() else {
            return Err(SqliteError::InvalidArgument("an in-memory database has no folder".to_string()));
        };
        let folder = folder.canonicalize()?;
        let other_folder = other_path.parent().unwrap_or_else(|| Path::new(".")).canonicalize()?;
        let prefix = match other_folder.strip_prefix(&folder) {
            Ok(relative) if relative.as_os_str().is_empty() => None,
            Ok(relative) => Some(relative.to_path_buf()),
            Err(_) => {
                return Err(SqliteError::InvalidArgument(format!(
                    "{} is not under {}",
                    other_path.display(),
                    folder.display()
                )));
            }
        };

        let other = Self::open_for_import(other_path, self.base.config.clone())?;
        let mut result = FileImportResult::default();
        let this_columns = self.get_file_column_names();
        let other_columns = other.get_file_column_names();
        for column in this_columns.iter().filter(|column| !other_columns.contains(column)) {
            result
                .errors
                .push(format!("The column {column} is present in this file database but not in the one imported."));
        }
        for column in other_columns.iter().filter(|column| !this_columns.contains(column)) {
            result
                .errors
                .push(format!("The column {column} is present in the file database imported but not in this one."));
        }
        for column in self.columns.user_columns() {
            let Some(other_column) = other.columns.get(&column.data_label) else {
                continue;
            };
            if other_column.control_type != column.control_type || other_column.data_type != column.data_type {
                result.errors.push(format!(
                    "The column {} is a {} in this file database but a {} in the one imported.",
                    column.data_label, column.control_type, other_column.control_type
                ));
            }
        }
        if !result.errors.is_empty() {
            warn!(other = %other_path.display(), errors = result.errors.len(), "file databases' columns differ; nothing imported");
            return Ok(result);
        }

        if self.get_file_count(FileSelection::All)? != Some(self.files.len()) {
            self.select_files(FileSelection::All)?;
        }
        let other_files = FileTable::load(
            other.connection(),
            &format!("SELECT * FROM {} ORDER BY {}", quote_identifier(table::FILES), quote_identifier(label::ID)),
            Arc::clone(&other.columns),
        )?;

        let existing = self.files.get_files_by_relative_path_and_name();
        let mut to_insert: Vec<FileRow> = Vec::new();
        let mut inserted_by_key: HashMap<(String, String), usize> = HashMap::new();
        let mut to_update: Vec<FileRow> = Vec::new();
        let mut update_indices: Vec<usize> = Vec::new();
        let mut unchanged = 0;
        for other_file in other_files.iter() {
            let relative_path = match &prefix {
                Some(prefix) if other_file.relative_path().is_empty() => prefix.to_string_lossy().into_owned(),
                Some(prefix) => prefix.join(other_file.relative_path()).to_string_lossy().into_owned(),
                None => other_file.relative_path().to_string(),
            };
            let key = (relative_path.to_lowercase(), other_file.file_name().to_lowercase());

            if let Some(index) = existing.get(&key.0).and_then(|names| names.get(&key.1)) {
                let mut file = self.files.rows()[*index].clone();
                copy_file_values(&mut file, other_file, &mut result);
                if file.has_changes() {
                    to_update.push(file);
                    update_indices.push(*index);
                } else {
                    unchanged += 1;
                }
            } else if let Some(pending) = inserted_by_key.get(&key) {
                copy_file_values(&mut to_insert[*pending], other_file, &mut result);
            } else {
                let mut file = self.new_file(other_file.file_name(), relative_path)?;
                copy_file_values(&mut file, other_file, &mut result);
                inserted_by_key.insert(key, to_insert.len());
                to_insert.push(file);
            }
        }

        if !to_insert.is_empty() || !to_update.is_empty() {
            self.create_backup_if_needed()?;
            let rows_per_transaction = self.base.config.rows_per_transaction;
            let tx = self.base.conn.unchecked_transaction()?;
            let insert_len = to_insert.len();
            FileTransactionSequence::create_insert(&tx, &self.columns, rows_per_transaction)?
                .add_files(&mut to_insert, 0, insert_len)?;
            let update_len = to_update.len();
            FileTransactionSequence::create_update(&tx, &self.columns, rows_per_transaction)?
                .update_files(&mut to_update, 0, update_len)?;
            tx.commit()?;
        }

        result.files_added = to_insert.len();
        result.files_updated = to_update.len();
        for (index, mut file) in update_indices.into_iter().zip(to_update) {
            file.accept_changes();
            self.files.rows_mut()[index] = file;
        }
        for mut file in to_insert {
            file.accept_changes();
            self.files.push(file);
        }
        result.files_processed = result.files_added + result.files_updated + unchanged;
        info!(
            other = %other_path.display(),
            added = result.files_added,
            updated = result.files_updated,
            unchanged,
            errors = result.errors.len(),
            "imported files"
        );
        Ok(result)
    }

    /// Distinct values of a `Files` column in storage form.
    ///
    /// Nulls are returned as empty strings.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidArgument`] for an unknown column and
    /// [`SqliteError::ConversionError`] for a marker column.
    pub fn get_distinct_values_in_file_column(&self, data_label: &str) -> Result<Vec<String>> {
        if data_label != label::ID {
            self.columns.require(data_label)?;
        }
        let column = quote_identifier(data_label);
        let mut statement = self.connection().prepare(&format!(
            "SELECT DISTINCT {column} FROM {} ORDER BY {column}",
            quote_identifier(table::FILES)
        ))?;
        let mut rows = statement.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            values.push(match row.get::<_, Value>(0)? {
                Value::Null => String::new(),
                Value::Integer(value) => value.to_string(),
                Value::Real(value) => value.to_string(),
                Value::Text(value) => value,
                Value::Blob(_) => {
                    return Err(SqliteError::ConversionError(format!(
                        "{data_label} holds binary values"
                    )));
                }
            });
        }
        Ok(values)
    }

    /// `Files` columns after `Id` in control order, each counter followed by
    /// its marker column.
    pub fn get_file_column_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.controls().len());
        for control in self.controls().iter() {
            names.push(control.data_label.clone());
            if control.control_type == ControlType::Counter {
                names.push(marker_column_name(&control.data_label));
            }
        }
        names
    }

    /// Appends an entry to the image set's log and stores it.
    pub fn append_to_image_set_log(&mut self, entry: &str) -> Result<bool> {
        self.base.image_set.append_to_log(entry);
        self.base.sync_image_set_to_database()
    }
}

/// Copies every value of `source` but its name and folder into `file`.
fn copy_file_values(file: &mut FileRow, source: &FileRow, result: &mut FileImportResult) {
    let columns = Arc::clone(file.columns());
    for column in columns.columns() {
        if matches!(column.slot, ColumnSlot::File | ColumnSlot::RelativePath) {
            continue;
        }
        if let Err(e) = file.copy_value_from(source, &column.data_label) {
            result.errors.push(format!("{} in {}: {e}", column.data_label, source.file_name()));
        }
    }
}

fn count_from_sql(count: i64) -> Result<usize> {
    usize::try_from(count).map_err(|_| SqliteError::ConversionError(format!("file count {count} is out of range")))
}

/// Runs `write` over `files` inside a transaction it commits.
///
/// Sequences `write` creates join the transaction, so nothing is accepted
/// and nothing is durable until the commit.
fn write_in_transaction<W>(
    conn: &Connection,
    columns: &FileTableColumnMap,
    rows_per_transaction: usize,
    files: &mut [FileRow],
    write: W,
) -> Result<usize>
where
    W: FnOnce(&Connection, &FileTableColumnMap, usize, &mut [FileRow]) -> Result<usize>,
{
    let tx = conn.unchecked_transaction()?;
    let written = write(&tx, columns, rows_per_transaction, files)?;
    tx.commit()?;
    Ok(written)
}

/// Differences between a file database's controls and its template's which
/// prevent the template's edits from being applied.
fn check_synchronization(base: &TemplateDatabase, template: &TemplateDatabase) -> Result<Vec<String>> {
    let mut issues = Vec::new();
    for control in base.controls.iter() {
        let Some(template_control) = template.find_control(&control.data_label) else {
            issues.push(format!(
                "The field {} is present in the file database but has been removed from the template.",
                control.data_label
            ));
            continue;
        };
        if control.control_type != template_control.control_type {
            issues.push(format!(
                "The field {} is of type '{}' in the file database but of type '{}' in the template.",
                control.data_label, control.control_type, template_control.control_type
            ));
            continue;
        }
        if control.control_type != ControlType::FixedChoice {
            continue;
        }

        let template_choices: HashSet<String> = template_control.get_well_known_values().into_iter().collect();
        let removed: Vec<String> = control
            .get_well_known_values()
            .into_iter()
            .filter(|choice| !template_choices.contains(choice))
            .collect();
        if removed.is_empty() {
            continue;
        }
        let in_use = distinct_choices_in_use(&base.conn, &control.data_label)?;
        for choice in removed {
            let used = if control.data_label == label::CLASSIFICATION {
                choice
                    .parse::<FileClassification>()
                    .is_ok_and(|classification| in_use.contains(&classification.to_database_value().to_string()))
            } else {
                in_use.contains(&choice)
            };
            if used {
                issues.push(format!(
                    "Files have {} set to the choice '{}' but this value is removed from the template.",
                    control.data_label, choice
                ));
            }
        }
    }
    Ok(issues)
}

fn distinct_choices_in_use(conn: &Connection, data_label: &str) -> Result<HashSet<String>> {
    let column = quote_identifier(data_label);
    let mut statement = conn.prepare(&format!(
        "SELECT DISTINCT {column} FROM {} WHERE {column} IS NOT NULL",
        quote_identifier(table::FILES)
    ))?;
    let mut rows = statement.query([])?;
    let mut values = HashSet::new();
    while let Some(row) = rows.next()? {
        match row.get::<_, Value>(0)? {
            Value::Integer(value) => values.insert(value.to_string()),
            Value::Text(value) => values.insert(value),
            _ => false,
        };
    }
    Ok(values)
}

/// Applies the template's control edits, adds its new controls and their
/// columns, and brings indices in line with the index flags.
fn synchronize_controls(base: &mut TemplateDatabase, template: &TemplateDatabase) -> Result<()> {
    let rows_per_transaction = base.config.rows_per_transaction;
    let mut indices_to_create: Vec<String> = Vec::new();
    let mut indices_to_drop: Vec<String> = Vec::new();

    let tx = base.conn.unchecked_transaction()?;
    let mut synchronized = 0;
    for control in base.controls.controls_mut() {
        let Some(template_control) = template.find_control(&control.data_label) else {
            continue;
        };
        let was_indexed = control.index_in_file_table;
        if control.synchronize(template_control)? {
            synchronized += 1;
            if was_indexed != control.index_in_file_table {
                if control.index_in_file_table {
                    indices_to_create.push(control.data_label.clone());
                } else {
                    indices_to_drop.push(control.data_label.clone());
                }
            }
        }
    }
    ControlTransactionSequence::create_update(&tx, rows_per_transaction)?
        .update_controls(base.controls.controls_mut())?;

    let mut added: Vec<_> = template
        .controls()
        .iter()
        .filter(|control| base.controls.find(&control.data_label).is_none())
        .cloned()
        .collect();
    for control in &added {
        for column in file_column_definitions(std::slice::from_ref(control))? {
            tx.execute_batch(&add_file_column_sql(&column))?;
        }
        if control.index_in_file_table {
            indices_to_create.push(control.data_label.clone());
        }
    }
    ControlTransactionSequence::create_insert(&tx, rows_per_transaction)?.add_controls(added.iter_mut())?;

    for data_label in &indices_to_create {
        tx.execute_batch(&create_index_sql(data_label))?;
    }
    for data_label in &indices_to_drop {
        tx.execute_batch(&drop_index_sql(data_label))?;
    }
    tx.commit()?;

    base.controls = ControlTable::load(&base.conn)?;
    if synchronized > 0 || !added.is_empty() {
        info!(synchronized, added = added.len(), "synchronized controls with template");
    }
    Ok(())
}
