//! DDL generation for the `Controls`, `Files` and `ImageSet` tables.
//!
//! The `Files` table is derived from a template: an autoincrement `Id`
//! followed by one column per control in control order, with a companion
//! `<label>Markers` blob after every counter. Derivation is deterministic;
//! the same controls always produce the same statements.
//!
//! # Table structure
//!
//! - `Controls`: one row per control of the template
//! - `Files`: one row per image or video, columns derived from `Controls`
//! - `ImageSet`: a single row of image set wide state

use carnassial_core::{Control, ControlType, label};

use crate::convert::{default_to_sql_literal, quote_identifier};
use crate::error::{Result, SqliteError};

/// Table names.
pub mod table {
    /// Template controls.
    pub const CONTROLS: &str = "Controls";
    /// File metadata.
    pub const FILES: &str = "Files";
    /// Image set singleton.
    pub const IMAGE_SET: &str = "ImageSet";
    /// Name of the `Files` table before version 2.2.0.3.
    pub const LEGACY_FILES: &str = "FileData";
}

/// Columns of the `Controls` table.
pub mod control_column {
    pub const ANALYSIS_LABEL: &str = "AnalysisLabel";
    pub const CONTROL_ORDER: &str = "ControlOrder";
    pub const COPYABLE: &str = "Copyable";
    pub const DATA_LABEL: &str = "DataLabel";
    pub const DEFAULT_VALUE: &str = "DefaultValue";
    pub const INDEX_IN_FILE_TABLE: &str = "IndexInFileTable";
    pub const LABEL: &str = "Label";
    pub const MAX_WIDTH: &str = "MaxWidth";
    pub const SPREADSHEET_ORDER: &str = "SpreadsheetOrder";
    pub const TOOLTIP: &str = "Tooltip";
    pub const TYPE: &str = "Type";
    pub const VISIBLE: &str = "Visible";
    pub const WELL_KNOWN_VALUES: &str = "WellKnownValues";
}

/// Columns of the `ImageSet` table.
pub mod image_set_column {
    pub const FILE_SELECTION: &str = "FileSelection";
    pub const INITIAL_FOLDER_NAME: &str = "InitialFolderName";
    pub const LOG: &str = "Log";
    pub const MOST_RECENT_FILE_ID: &str = "MostRecentFileID";
    pub const OPTIONS: &str = "Options";
    pub const TIME_ZONE: &str = "TimeZone";
}

/// One column of a `CREATE TABLE` or `ALTER TABLE ADD COLUMN` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Declared type, such as `INTEGER` or `TEXT`.
    pub affinity: &'static str,
    /// Whether the column is `NOT NULL`.
    pub not_null: bool,
    /// SQL literal of the column default.
    pub default: Option<String>,
}

impl ColumnDefinition {
    /// Creates a nullable column without a default.
    pub fn new(name: impl Into<String>, affinity: &'static str) -> Self {
        Self {
            name: name.into(),
            affinity,
            not_null: false,
            default: None,
        }
    }

    /// Marks the column `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Sets the column default.
    pub fn with_default(mut self, default: Option<String>) -> Self {
        self.default = default;
        self
    }
}

impl std::fmt::Display for ColumnDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", quote_identifier(&self.name), self.affinity)?;
        if self.not_null {
            f.write_str(" NOT NULL")?;
        }
        if let Some(default) = &self.default {
            write!(f, " DEFAULT {default}")?;
        }
        Ok(())
    }
}

/// Name of the blob column holding a counter's marker positions.
pub fn marker_column_name(counter_data_label: &str) -> String {
    format!("{counter_data_label}{}", label::MARKER_POSITION_SUFFIX)
}

/// Name of the secondary index on a `Files` column.
pub fn index_name(data_label: &str) -> String {
    format!("File{data_label}Index")
}

/// Column definition of a control in the `Files` table.
///
/// # Errors
///
/// Returns [`SqliteError::ConversionError`] if the control's default cannot
/// be converted to its stored form.
pub fn column_definition(control: &Control) -> Result<ColumnDefinition> {
    let affinity = if control.data_label == label::CLASSIFICATION {
        "INTEGER"
    } else {
        control.control_type.sql_data_type().affinity()
    };
    let mut column = ColumnDefinition::new(control.data_label.clone(), affinity);
    if control.is_file_path_component()
        || control.data_label == label::CLASSIFICATION
        || matches!(control.control_type, ControlType::Counter | ControlType::Flag)
    {
        column = column.not_null();
    }
    Ok(column.with_default(default_to_sql_literal(control)?))
}

/// Column definitions of the `Files` table after `Id`, in control order.
pub fn file_column_definitions(controls: &[Control]) -> Result<Vec<ColumnDefinition>> {
    let mut ordered: Vec<&Control> = controls.iter().collect();
    ordered.sort_by_key(|control| control.control_order);

    let mut columns = Vec::with_capacity(ordered.len() + 1);
    for control in ordered {
        columns.push(column_definition(control)?);
        if control.control_type == ControlType::Counter {
            columns.push(ColumnDefinition::new(marker_column_name(&control.data_label), "BLOB"));
        }
    }
    Ok(columns)
}

/// Generates `CREATE TABLE Files` for a template.
///
/// # Errors
///
/// Returns [`SqliteError::SchemaError`] if a standard control is missing.
///
/// # Examples
///
/// ```
/// use carnassial_core::{Control, ControlType};
/// use carnassial_sqlite::generate_files_table_sql;
///
/// let mut controls = Control::standard_controls();
/// controls.push(Control::new(ControlType::Counter, "Animals", 7));
/// let sql = generate_files_table_sql(&controls).unwrap();
/// assert!(sql.contains("\"Animals\" INTEGER NOT NULL DEFAULT 0"));
/// assert!(sql.contains("\"AnimalsMarkers\" BLOB"));
/// ```
pub fn generate_files_table_sql(controls: &[Control]) -> Result<String> {
    for standard in label::STANDARD_CONTROLS {
        if !controls.iter().any(|control| control.data_label == standard) {
            return Err(SqliteError::SchemaError(format!("standard control {standard} is missing")));
        }
    }

    let mut definitions = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_identifier(label::ID))];
    definitions.extend(file_column_definitions(controls)?.iter().map(ColumnDefinition::to_string));
    Ok(format!(
        "CREATE TABLE {} ({})",
        quote_identifier(table::FILES),
        definitions.join(", ")
    ))
}

/// Generates `CREATE INDEX` for the DateTime column and each control
/// flagged for indexing, in control order.
pub fn generate_file_index_sql(controls: &[Control]) -> Vec<String> {
    let mut ordered: Vec<&Control> = controls.iter().collect();
    ordered.sort_by_key(|control| control.control_order);

    let mut indexed: Vec<&str> = vec![label::DATE_TIME];
    for control in ordered {
        if control.index_in_file_table && !indexed.contains(&control.data_label.as_str()) {
            indexed.push(&control.data_label);
        }
    }
    indexed.into_iter().map(create_index_sql).collect()
}

/// `CREATE INDEX IF NOT EXISTS` on one `Files` column.
pub fn create_index_sql(data_label: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_identifier(&index_name(data_label)),
        quote_identifier(table::FILES),
        quote_identifier(data_label)
    )
}

/// `DROP INDEX IF EXISTS` for one `Files` column.
pub fn drop_index_sql(data_label: &str) -> String {
    format!("DROP INDEX IF EXISTS {}", quote_identifier(&index_name(data_label)))
}

/// `ALTER TABLE Files ADD COLUMN`.
pub fn add_file_column_sql(column: &ColumnDefinition) -> String {
    format!("ALTER TABLE {} ADD COLUMN {column}", quote_identifier(table::FILES))
}

/// Generates `CREATE TABLE Controls`.
pub fn generate_controls_table_sql() -> String {
    use control_column::*;
    let columns = [
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_identifier(label::ID)),
        ColumnDefinition::new(CONTROL_ORDER, "INTEGER").not_null().to_string(),
        ColumnDefinition::new(SPREADSHEET_ORDER, "INTEGER").not_null().to_string(),
        ColumnDefinition::new(TYPE, "INTEGER").not_null().to_string(),
        ColumnDefinition::new(DEFAULT_VALUE, "TEXT").to_string(),
        ColumnDefinition::new(LABEL, "TEXT").not_null().to_string(),
        format!("{} TEXT NOT NULL UNIQUE", quote_identifier(DATA_LABEL)),
        ColumnDefinition::new(TOOLTIP, "TEXT").to_string(),
        ColumnDefinition::new(MAX_WIDTH, "INTEGER")
            .not_null()
            .with_default(Some(carnassial_core::DEFAULT_MAX_WIDTH.to_string()))
            .to_string(),
        ColumnDefinition::new(COPYABLE, "INTEGER").not_null().to_string(),
        ColumnDefinition::new(VISIBLE, "INTEGER").not_null().to_string(),
        ColumnDefinition::new(WELL_KNOWN_VALUES, "TEXT").to_string(),
        ColumnDefinition::new(ANALYSIS_LABEL, "INTEGER")
            .not_null()
            .with_default(Some("0".to_string()))
            .to_string(),
        ColumnDefinition::new(INDEX_IN_FILE_TABLE, "INTEGER")
            .not_null()
            .with_default(Some("0".to_string()))
            .to_string(),
    ];
    format!("CREATE TABLE {} ({})", quote_identifier(table::CONTROLS), columns.join(", "))
}

/// Generates `CREATE TABLE ImageSet`.
pub fn generate_image_set_table_sql() -> String {
    use image_set_column::*;
    let zero = || Some("0".to_string());
    let columns = [
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_identifier(label::ID)),
        ColumnDefinition::new(FILE_SELECTION, "INTEGER")
            .not_null()
            .with_default(zero())
            .to_string(),
        ColumnDefinition::new(INITIAL_FOLDER_NAME, "TEXT").not_null().to_string(),
        ColumnDefinition::new(LOG, "TEXT").to_string(),
        ColumnDefinition::new(MOST_RECENT_FILE_ID, "INTEGER")
            .not_null()
            .with_default(Some("1".to_string()))
            .to_string(),
        ColumnDefinition::new(OPTIONS, "INTEGER").not_null().with_default(zero()).to_string(),
        ColumnDefinition::new(TIME_ZONE, "TEXT").not_null().to_string(),
    ];
    format!("CREATE TABLE {} ({})", quote_identifier(table::IMAGE_SET), columns.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Vec<Control> {
        let mut controls = Control::standard_controls();
        controls.push(Control::new(ControlType::Counter, "Animals", 7));
        controls.push(Control::new(ControlType::Flag, "Juvenile", 8));
        controls.push(Control::new(ControlType::Note, "Comments", 9));
        controls.push(Control::new(ControlType::FixedChoice, "Species", 10).with_default_value("Deer"));
        controls
    }

    #[test]
    fn test_files_table_column_order() {
        let names: Vec<String> = file_column_definitions(&template())
            .unwrap()
            .into_iter()
            .map(|column| column.name)
            .collect();
        assert_eq!(
            names,
            [
                "File",
                "RelativePath",
                "DateTime",
                "UtcOffset",
                "Classification",
                "DeleteFlag",
                "Animals",
                "AnimalsMarkers",
                "Juvenile",
                "Comments",
                "Species"
            ]
        );
    }

    #[test]
    fn test_files_table_sql() {
        let sql = generate_files_table_sql(&template()).unwrap();
        assert!(sql.starts_with("CREATE TABLE \"Files\" (\"Id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"File\" TEXT NOT NULL,"));
        assert!(sql.contains("\"Classification\" INTEGER NOT NULL DEFAULT 0"));
        assert!(sql.contains("\"DateTime\" DATETIME DEFAULT '1905-06-30T12:00:00.000Z'"));
        assert!(sql.contains("\"UtcOffset\" REAL DEFAULT 0"));
        assert!(sql.contains("\"Juvenile\" INTEGER NOT NULL DEFAULT 0"));
        assert!(sql.contains("\"Comments\" TEXT,"));
        assert!(sql.contains("\"Species\" TEXT DEFAULT 'Deer'"));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let mut shuffled = template();
        shuffled.reverse();
        assert_eq!(
            generate_files_table_sql(&template()).unwrap(),
            generate_files_table_sql(&shuffled).unwrap()
        );
        assert_eq!(generate_file_index_sql(&template()), generate_file_index_sql(&shuffled));
    }

    #[test]
    fn test_missing_standard_control() {
        let mut controls = template();
        controls.retain(|control| control.data_label != "RelativePath");
        assert!(matches!(
            generate_files_table_sql(&controls),
            Err(SqliteError::SchemaError(_))
        ));
    }

    #[test]
    fn test_indices_include_date_time_once() {
        let mut controls = template();
        controls[7].index_in_file_table = true;
        let indices = generate_file_index_sql(&controls);
        assert_eq!(
            indices,
            vec![
                "CREATE INDEX IF NOT EXISTS \"FileDateTimeIndex\" ON \"Files\" (\"DateTime\")".to_string(),
                "CREATE INDEX IF NOT EXISTS \"FileJuvenileIndex\" ON \"Files\" (\"Juvenile\")".to_string(),
            ]
        );
    }

    #[test]
    fn test_support_tables_create() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&generate_controls_table_sql()).unwrap();
        conn.execute_batch(&generate_image_set_table_sql()).unwrap();
        conn.execute_batch(&generate_files_table_sql(&template()).unwrap()).unwrap();
        for index in generate_file_index_sql(&template()) {
            conn.execute_batch(&index).unwrap();
        }
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('Controls', 'Files', 'ImageSet')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }
}
