//! Template databases: the controls and image set defining an image set's
//! fields.
//!
//! A file database carries its own copy of these tables, so
//! [`FileDatabase`](crate::FileDatabase) builds on a `TemplateDatabase`
//! opened over the same file.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use carnassial_config::StoreConfig;
use carnassial_core::{Control, ControlType, is_one_based_permutation, label};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::backup::{BackupSchedule, backup_folder, rename_backups};
use crate::control_table::{ControlTable, ControlTransactionSequence};
use crate::convert::quote_identifier;
use crate::error::{Result, SqliteError};
use crate::image_set::{ImageSet, ImageSetTransactionSequence};
use crate::migration::{SchemaVersion, set_user_version, table_exists};
use crate::schema::{generate_controls_table_sql, generate_image_set_table_sql, table};
use crate::transaction::ChangeTracked;

/// Which of a control's two orders to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayOrder {
    /// Order of controls in the data entry pane.
    Control,
    /// Order of columns in spreadsheets.
    Spreadsheet,
}

/// Controls and image set of one database file.
///
/// # Examples
///
/// ```
/// use carnassial_config::StoreConfig;
/// use carnassial_core::ControlType;
/// use carnassial_sqlite::TemplateDatabase;
///
/// let mut template = TemplateDatabase::open_in_memory(StoreConfig::default()).unwrap();
/// assert_eq!(template.controls().len(), 6);
///
/// let counter = template.add_user_defined_control(ControlType::Counter).unwrap();
/// assert_eq!(counter.data_label, "Counter0");
/// assert_eq!(counter.control_order, 7);
/// ```
pub struct TemplateDatabase {
    pub(crate) conn: Connection,
    pub(crate) path: Option<PathBuf>,
    pub(crate) config: StoreConfig,
    pub(crate) backup: Option<BackupSchedule>,
    pub(crate) controls: ControlTable,
    pub(crate) image_set: ImageSet,
}

impl TemplateDatabase {
    /// Opens a template, creating it with the standard controls if the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::SchemaError`] if an existing file has no
    /// `Controls` table.
    pub fn create_or_open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let exists = path.exists();
        let conn = Connection::open(path)?;
        let backup = Some(BackupSchedule::new(path, config.backup.clone())?);
        let template = if exists {
            Self::open_existing(conn, Some(path.to_path_buf()), config, backup)?
        } else {
            Self::create(conn, Some(path.to_path_buf()), config, backup, None)?
        };
        info!(path = %path.display(), created = !exists, controls = template.controls.len(), "opened template");
        Ok(template)
    }

    /// Creates a template in memory. It is never backed up.
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        Self::create(Connection::open_in_memory()?, None, config, None, None)
    }

    /// Creates the tables of a new database. The controls and image set are
    /// copied from `source` if given; otherwise standard controls and a new
    /// image set are stored.
    pub(crate) fn create(
        conn: Connection,
        path: Option<PathBuf>,
        config: StoreConfig,
        backup: Option<BackupSchedule>,
        source: Option<&TemplateDatabase>,
    ) -> Result<Self> {
        let (mut controls, mut image_set) = match source {
            Some(source) => (
                ControlTable::new(source.controls.controls().to_vec()),
                source.image_set.clone(),
            ),
            None => (
                ControlTable::new(Control::standard_controls()),
                ImageSet::new(folder_name(path.as_deref())),
            ),
        };

        {
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(&generate_controls_table_sql())?;
            tx.execute_batch(&generate_image_set_table_sql())?;
            ControlTransactionSequence::create_insert(&tx, config.rows_per_transaction)?
                .add_controls(controls.controls_mut())?;
            ImageSetTransactionSequence::create_insert(&tx)?.execute(&mut image_set)?;
            set_user_version(&tx, SchemaVersion::CURRENT)?;
            tx.commit()?;
        }
        for control in controls.controls_mut() {
            control.accept_changes();
        }
        image_set.accept_changes();
        debug!(controls = controls.len(), "created template tables");

        Ok(Self {
            conn,
            path,
            config,
            backup,
            controls,
            image_set,
        })
    }

    /// Loads the controls and image set of an existing database, adding the
    /// image set table if the database predates it.
    pub(crate) fn open_existing(
        conn: Connection,
        path: Option<PathBuf>,
        config: StoreConfig,
        backup: Option<BackupSchedule>,
    ) -> Result<Self> {
        if !table_exists(&conn, table::CONTROLS)? {
            return Err(SqliteError::SchemaError(format!("no {} table", table::CONTROLS)));
        }
        if !table_exists(&conn, table::IMAGE_SET)? {
            let mut image_set = ImageSet::new(folder_name(path.as_deref()));
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(&generate_image_set_table_sql())?;
            ImageSetTransactionSequence::create_insert(&tx)?.execute(&mut image_set)?;
            tx.commit()?;
            info!("added image set table");
        }
        let controls = ControlTable::load(&conn)?;
        let image_set = ImageSet::load(&conn)?;
        Ok(Self {
            conn,
            path,
            config,
            backup,
            controls,
            image_set,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path of the database file, or `None` in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn controls(&self) -> &ControlTable {
        &self.controls
    }

    /// Controls for editing. Edits are stored by
    /// [`sync_control_to_database`](Self::sync_control_to_database).
    pub fn controls_mut(&mut self) -> &mut ControlTable {
        &mut self.controls
    }

    pub fn image_set(&self) -> &ImageSet {
        &self.image_set
    }

    pub fn image_set_mut(&mut self) -> &mut ImageSet {
        &mut self.image_set
    }

    /// Control with the given data label.
    pub fn find_control(&self, data_label: &str) -> Option<&Control> {
        self.controls.find(data_label)
    }

    /// Data labels in spreadsheet order; `Id` is never a control so every
    /// label is included.
    pub fn get_data_labels_except_id_in_spreadsheet_order(&self) -> Vec<String> {
        self.controls
            .data_labels_in_spreadsheet_order()
            .into_iter()
            .filter(|data_label| data_label != label::ID)
            .collect()
    }

    /// Backs the database file up if the backup interval has passed.
    pub fn create_backup_if_needed(&mut self) -> Result<Option<PathBuf>> {
        match (&mut self.backup, &self.path) {
            (Some(backup), Some(path)) => backup.create_backup_if_needed(path),
            _ => Ok(None),
        }
    }

    /// Renames the database file within its folder and reconnects to it.
    ///
    /// Backups of the file are renamed to match. Returns the new path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidArgument`] for an in-memory database,
    /// for a name which is not a plain file name, and if a file of that name
    /// already exists.
    pub fn rename_database_file(&mut self, new_file_name: &str) -> Result<PathBuf> {
        let Some(path) = self.path.clone() else {
            return Err(SqliteError::InvalidArgument("an in-memory database has no file".to_string()));
        };
        if Path::new(new_file_name).file_name() != Some(OsStr::new(new_file_name)) {
            return Err(SqliteError::InvalidArgument(format!("'{new_file_name}' is not a file name")));
        }
        let renamed = path.with_file_name(new_file_name);
        if renamed.exists() {
            return Err(SqliteError::InvalidArgument(format!("{} already exists", renamed.display())));
        }

        // the file cannot be renamed while the connection holds it open
        let conn = std::mem::replace(&mut self.conn, Connection::open_in_memory()?);
        if let Err((conn, error)) = conn.close() {
            self.conn = conn;
            return Err(error.into());
        }
        if let Err(error) = fs::rename(&path, &renamed) {
            self.conn = Connection::open(&path)?;
            return Err(error.into());
        }
        self.conn = Connection::open(&renamed)?;
        self.path = Some(renamed.clone());

        let folder = backup_folder(&renamed, &self.config.backup.folder_name);
        if let Err(e) = rename_backups(&folder, &path, &renamed) {
            warn!(folder = %folder.display(), error = %e, "failed to rename backups");
        }
        if self.backup.is_some() {
            self.backup = Some(BackupSchedule::new(&renamed, self.config.backup.clone())?);
        }
        info!(from = %path.display(), to = %renamed.display(), "renamed database file");
        Ok(renamed)
    }

    /// First `<prefix><n>` not already used as a data label, counting from
    /// zero.
    pub fn get_next_unique_data_label(&self, prefix: &str) -> String {
        (0..)
            .map(|index: u32| format!("{prefix}{index}"))
            .find(|candidate| self.controls.find(candidate).is_none())
            .unwrap_or_else(|| prefix.to_string())
    }

    /// Appends a control of the given type with its type's defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidArgument`] for DateTime and UtcOffset,
    /// which only standard controls may have.
    pub fn add_user_defined_control(&mut self, control_type: ControlType) -> Result<&Control> {
        if matches!(control_type, ControlType::DateTime | ControlType::UtcOffset) {
            return Err(SqliteError::InvalidArgument(format!(
                "{control_type} controls cannot be added"
            )));
        }
        self.create_backup_if_needed()?;

        let data_label = self.get_next_unique_data_label(control_type.as_str());
        let order = self.controls.len() as i64 + 1;
        let mut control = Control::new(control_type, data_label.clone(), order);
        ControlTransactionSequence::create_insert(&self.conn, self.config.rows_per_transaction)?
            .add_controls(std::iter::once(&mut control))?;
        self.controls.push(control);
        info!(data_label = %data_label, "added control");

        self.controls
            .find(&data_label)
            .ok_or_else(|| SqliteError::InvalidArgument(format!("control {data_label} was not added")))
    }

    /// Removes a user control and closes the gap it leaves in both orders.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidArgument`] for standard controls and
    /// unknown data labels.
    pub fn remove_user_defined_control(&mut self, data_label: &str) -> Result<Control> {
        if label::is_standard(data_label) {
            return Err(SqliteError::InvalidArgument(format!(
                "standard control {data_label} cannot be removed"
            )));
        }
        let (id, removed_control_order, removed_spreadsheet_order) = match self.controls.find(data_label) {
            Some(control) => (control.id, control.control_order, control.spreadsheet_order),
            None => return Err(SqliteError::InvalidArgument(format!("no control {data_label}"))),
        };
        self.create_backup_if_needed()?;

        let mut controls = self.controls.clone();
        let mut removed = controls
            .remove(data_label)
            .ok_or_else(|| SqliteError::InvalidArgument(format!("no control {data_label}")))?;
        for control in controls.controls_mut() {
            if control.control_order > removed_control_order {
                control.control_order -= 1;
                control.mark_changed();
            }
            if control.spreadsheet_order > removed_spreadsheet_order {
                control.spreadsheet_order -= 1;
                control.mark_changed();
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                quote_identifier(table::CONTROLS),
                quote_identifier(label::ID)
            ),
            [id],
        )?;
        ControlTransactionSequence::create_update(&tx, self.config.rows_per_transaction)?
            .update_controls(controls.controls_mut())?;
        tx.commit()?;

        for control in controls.controls_mut() {
            control.accept_changes();
        }
        removed.accept_changes();
        self.controls = controls;
        info!(data_label = %data_label, "removed control");
        Ok(removed)
    }

    /// Replaces one of the orders of every control.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidArgument`] unless `new_orders` gives
    /// every control an order and the orders are a contiguous one based
    /// permutation.
    pub fn update_display_order(&mut self, order: DisplayOrder, new_orders: &HashMap<String, i64>) -> Result<()> {
        if new_orders.len() != self.controls.len() {
            return Err(SqliteError::InvalidArgument(format!(
                "partial order updates are not supported: {} orders given for {} controls",
                new_orders.len(),
                self.controls.len()
            )));
        }
        if let Some(missing) = self.controls.iter().find(|control| !new_orders.contains_key(&control.data_label)) {
            return Err(SqliteError::InvalidArgument(format!("no order given for {}", missing.data_label)));
        }
        if !is_one_based_permutation(new_orders.values().copied()) {
            return Err(SqliteError::InvalidArgument(
                "orders must be a contiguous one based sequence".to_string(),
            ));
        }

        let mut controls = self.controls.clone();
        for control in controls.controls_mut() {
            let new_order = new_orders[&control.data_label];
            let current = match order {
                DisplayOrder::Control => &mut control.control_order,
                DisplayOrder::Spreadsheet => &mut control.spreadsheet_order,
            };
            if *current != new_order {
                *current = new_order;
                control.mark_changed();
            }
        }
        let tx = self.conn.unchecked_transaction()?;
        ControlTransactionSequence::create_update(&tx, self.config.rows_per_transaction)?
            .update_controls(controls.controls_mut())?;
        tx.commit()?;

        for control in controls.controls_mut() {
            control.accept_changes();
        }
        if order == DisplayOrder::Control {
            controls.sort();
        }
        self.controls = controls;
        Ok(())
    }

    /// Stores the edits made to a control.
    ///
    /// Returns whether anything was written.
    pub fn sync_control_to_database(&mut self, data_label: &str) -> Result<bool> {
        self.create_backup_if_needed()?;
        let control = self
            .controls
            .find_mut(data_label)
            .ok_or_else(|| SqliteError::InvalidArgument(format!("no control {data_label}")))?;
        let updated = ControlTransactionSequence::create_update(&self.conn, self.config.rows_per_transaction)?
            .update_controls(std::iter::once(control))?;
        Ok(updated > 0)
    }

    /// Stores the image set. Never triggers a backup.
    pub fn sync_image_set_to_database(&mut self) -> Result<bool> {
        ImageSetTransactionSequence::create_update(&self.conn)?.execute(&mut self.image_set)
    }
}

fn folder_name(path: Option<&Path>) -> String {
    path.and_then(Path::parent)
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}
