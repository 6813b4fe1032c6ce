//! Schema versioning and upgrade of file databases created by older releases.
//!
//! The schema version is kept in SQLite's `user_version` header field,
//! packed as one byte per version component. Databases older than
//! [`SchemaVersion::CURRENT`] are upgraded in a single transaction:
//!
//! - the `FileData` table is renamed to `Files`
//! - the text `ImageQuality` column becomes the integer `Classification`
//! - flag columns stored as text become integer columns
//! - missing standard columns are added
//!
//! The version is written last, inside the same transaction, so a failed
//! upgrade leaves the database at its previous version.
//!
//! # Example
//!
//! ```
//! use carnassial_core::Control;
//! use carnassial_sqlite::{Migration, SchemaVersion, generate_files_table_sql};
//! use rusqlite::Connection;
//!
//! let conn = Connection::open_in_memory().unwrap();
//! let controls = Control::standard_controls();
//! conn.execute_batch(&generate_files_table_sql(&controls).unwrap()).unwrap();
//!
//! let migration = Migration::new(&conn);
//! assert!(migration.status().unwrap().needs_upgrade);
//! migration.up(&controls).unwrap();
//! assert_eq!(migration.status().unwrap().version, SchemaVersion::CURRENT);
//! ```

use std::fmt;

use carnassial_core::{Control, ControlType, FileClassification, FLAG_TRUE, label};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::convert::{quote_identifier, quote_text};
use crate::error::{Result, SqliteError};
use crate::schema::{add_file_column_sql, column_definition, create_index_sql, table};

/// Legacy name of the `Classification` column.
const LEGACY_IMAGE_QUALITY: &str = "ImageQuality";

/// Release a database schema corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SchemaVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
    pub revision: u8,
}

impl SchemaVersion {
    /// Schema written by this crate.
    pub const CURRENT: SchemaVersion = SchemaVersion::new(2, 2, 0, 3);

    pub const fn new(major: u8, minor: u8, build: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Packs the version into `user_version`.
    ///
    /// ```
    /// use carnassial_sqlite::SchemaVersion;
    ///
    /// assert_eq!(SchemaVersion::CURRENT.to_user_version(), 33_685_507);
    /// ```
    pub const fn to_user_version(self) -> i32 {
        ((self.major as i32) << 24) | ((self.minor as i32) << 16) | ((self.build as i32) << 8) | self.revision as i32
    }

    pub const fn from_user_version(value: i32) -> Self {
        let bytes = value.to_be_bytes();
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.revision)
    }
}

/// Reads the schema version of a database.
pub fn get_user_version(conn: &Connection) -> Result<SchemaVersion> {
    let value: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(SchemaVersion::from_user_version(value))
}

/// Writes the schema version of a database.
pub fn set_user_version(conn: &Connection, version: SchemaVersion) -> Result<()> {
    conn.pragma_update(None, "user_version", version.to_user_version())?;
    Ok(())
}

/// Upgrades a file database to [`SchemaVersion::CURRENT`].
pub struct Migration<'c> {
    conn: &'c Connection,
}

impl<'c> Migration<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Current version and which tables exist.
    pub fn status(&self) -> Result<MigrationStatus> {
        let version = get_user_version(self.conn)?;
        Ok(MigrationStatus {
            version,
            files_table_exists: table_exists(self.conn, table::FILES)?,
            legacy_files_table_exists: table_exists(self.conn, table::LEGACY_FILES)?,
            needs_upgrade: version < SchemaVersion::CURRENT,
        })
    }

    /// Upgrades the schema if it is older than current.
    ///
    /// `controls` are the database's controls; their flag columns are
    /// converted and missing standard columns take their definitions.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::MigrationError`] if any step fails. Nothing is
    /// changed in that case, including the version.
    pub fn up(&self, controls: &[Control]) -> Result<MigrationReport> {
        let from = get_user_version(self.conn)?;
        let mut report = MigrationReport {
            from,
            ..MigrationReport::default()
        };
        if from >= SchemaVersion::CURRENT {
            debug!(version = %from, "schema is current");
            return Ok(report);
        }

        let tx = self.conn.unchecked_transaction()?;
        upgrade(&tx, controls, &mut report)
            .map_err(|e| SqliteError::MigrationError(format!("upgrade from {from} failed: {e}")))?;
        set_user_version(&tx, SchemaVersion::CURRENT)
            .map_err(|e| SqliteError::MigrationError(format!("failed to set schema version: {e}")))?;
        tx.commit()?;
        report.upgraded = true;

        info!(
            from = %from,
            to = %SchemaVersion::CURRENT,
            renamed_legacy_table = report.renamed_legacy_table,
            converted_classification = report.converted_classification,
            converted_flags = report.converted_flag_columns.len(),
            added_columns = report.added_columns.len(),
            "upgraded file database schema"
        );
        Ok(report)
    }
}

/// Snapshot of a database's schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: SchemaVersion,
    pub files_table_exists: bool,
    pub legacy_files_table_exists: bool,
    /// Whether [`Migration::up`] has work to do.
    pub needs_upgrade: bool,
}

/// What an upgrade changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version before the upgrade.
    pub from: SchemaVersion,
    /// Whether any step ran.
    pub upgraded: bool,
    pub renamed_legacy_table: bool,
    pub converted_classification: bool,
    /// Flag columns converted from text to integer.
    pub converted_flag_columns: Vec<String>,
    /// Standard columns which were missing.
    pub added_columns: Vec<String>,
}

fn upgrade(conn: &Connection, controls: &[Control], report: &mut MigrationReport) -> Result<()> {
    if table_exists(conn, table::LEGACY_FILES)? && !table_exists(conn, table::FILES)? {
        conn.execute_batch(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_identifier(table::LEGACY_FILES),
            quote_identifier(table::FILES)
        ))?;
        report.renamed_legacy_table = true;
    }
    if !table_exists(conn, table::FILES)? {
        return Err(SqliteError::SchemaError(format!("no {} table", table::FILES)));
    }

    let mut columns = file_columns(conn)?;
    if columns.iter().any(|(name, _)| name == LEGACY_IMAGE_QUALITY) {
        convert_image_quality(conn, &columns)?;
        report.converted_classification = true;
        columns = file_columns(conn)?;
    }

    for control in controls.iter().filter(|control| control.control_type == ControlType::Flag) {
        let Some((_, affinity)) = columns.iter().find(|(name, _)| *name == control.data_label) else {
            continue;
        };
        if !affinity.eq_ignore_ascii_case("INTEGER") {
            convert_flag_column(conn, control)?;
            report.converted_flag_columns.push(control.data_label.clone());
        }
    }

    columns = file_columns(conn)?;
    let standard = Control::standard_controls();
    for data_label in label::STANDARD_CONTROLS {
        if columns.iter().any(|(name, _)| name == data_label) {
            continue;
        }
        let control = controls
            .iter()
            .chain(standard.iter())
            .find(|control| control.data_label == data_label)
            .ok_or_else(|| SqliteError::SchemaError(format!("no definition for {data_label}")))?;
        if control.is_file_path_component() {
            return Err(SqliteError::SchemaError(format!("{} has no {data_label} column", table::FILES)));
        }
        conn.execute_batch(&add_file_column_sql(&column_definition(control)?))?;
        report.added_columns.push(data_label.to_string());
    }
    Ok(())
}

fn convert_image_quality(conn: &Connection, columns: &[(String, String)]) -> Result<()> {
    let files = quote_identifier(table::FILES);
    let classification = quote_identifier(label::CLASSIFICATION);
    let image_quality = quote_identifier(LEGACY_IMAGE_QUALITY);

    if !columns.iter().any(|(name, _)| name == label::CLASSIFICATION) {
        conn.execute_batch(&format!(
            "ALTER TABLE {files} ADD COLUMN {classification} INTEGER NOT NULL DEFAULT {}",
            FileClassification::default().to_database_value()
        ))?;
    }

    let mut cases: Vec<String> = FileClassification::ALL
        .iter()
        .map(|classification| {
            format!(
                "WHEN {} THEN {}",
                quote_text(classification.as_str()),
                classification.to_database_value()
            )
        })
        .collect();
    cases.push(format!("WHEN 'Ok' THEN {}", FileClassification::Color.to_database_value()));
    conn.execute_batch(&format!(
        "UPDATE {files} SET {classification} = CASE {image_quality} {} ELSE {} END",
        cases.join(" "),
        FileClassification::default().to_database_value()
    ))?;

    drop_indexes_on(conn, LEGACY_IMAGE_QUALITY)?;
    conn.execute_batch(&format!("ALTER TABLE {files} DROP COLUMN {image_quality}"))?;
    Ok(())
}

fn convert_flag_column(conn: &Connection, control: &Control) -> Result<()> {
    let files = quote_identifier(table::FILES);
    let column = quote_identifier(&control.data_label);
    let converted = quote_identifier(&format!("{}Converted", control.data_label));

    let indexed = drop_indexes_on(conn, &control.data_label)?;
    conn.execute_batch(&format!(
        "ALTER TABLE {files} ADD COLUMN {converted} INTEGER NOT NULL DEFAULT {default};
         UPDATE {files} SET {converted} = CASE WHEN lower({column}) IN ({true_text}, '1') THEN 1 ELSE 0 END;
         ALTER TABLE {files} DROP COLUMN {column};
         ALTER TABLE {files} RENAME COLUMN {converted} TO {column};",
        default = i64::from(control.default_flag_value()),
        true_text = quote_text(&FLAG_TRUE.to_ascii_lowercase()),
    ))?;
    if indexed {
        conn.execute_batch(&create_index_sql(&control.data_label))?;
    }
    debug!(column = %control.data_label, "converted flag column to integer");
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Name and declared type of each `Files` column.
pub(crate) fn file_columns(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut statement = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
    let columns = statement
        .query_map([table::FILES], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Drops every index covering a `Files` column. Returns whether any existed.
fn drop_indexes_on(conn: &Connection, column: &str) -> Result<bool> {
    let mut statement = conn.prepare(
        "SELECT DISTINCT m.name FROM sqlite_master AS m, pragma_index_info(m.name) AS i
         WHERE m.type = 'index' AND m.tbl_name = ?1 AND i.name = ?2",
    )?;
    let indexes = statement
        .query_map(params![table::FILES, column], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for index in &indexes {
        conn.execute_batch(&format!("DROP INDEX {}", quote_identifier(index)))?;
    }
    Ok(!indexes.is_empty())
}
