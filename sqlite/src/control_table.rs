//! The `Controls` table: loading controls and writing them back in batches.

use carnassial_core::{Control, ControlType, label};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

use crate::convert::quote_identifier;
use crate::error::{Result, SqliteError};
use crate::schema::{control_column, table};
use crate::transaction::{RowPolicy, TransactionSequence};

/// Stored columns of a control in binding order, without `Id`.
const CONTROL_COLUMNS: [&str; 13] = [
    control_column::CONTROL_ORDER,
    control_column::SPREADSHEET_ORDER,
    control_column::TYPE,
    control_column::DEFAULT_VALUE,
    control_column::LABEL,
    control_column::DATA_LABEL,
    control_column::TOOLTIP,
    control_column::MAX_WIDTH,
    control_column::COPYABLE,
    control_column::VISIBLE,
    control_column::WELL_KNOWN_VALUES,
    control_column::ANALYSIS_LABEL,
    control_column::INDEX_IN_FILE_TABLE,
];

/// Controls of a template or file database in control order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlTable {
    controls: Vec<Control>,
}

impl ControlTable {
    /// Wraps controls, ordering them by control order.
    pub fn new(mut controls: Vec<Control>) -> Self {
        controls.sort_by_key(|control| control.control_order);
        Self { controls }
    }

    /// Loads every control. Loaded controls are clean.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::SchemaError`] for a control type outside the
    /// stored range.
    pub fn load(conn: &Connection) -> Result<Self> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY {}",
            quote_identifier(table::CONTROLS),
            quote_identifier(control_column::CONTROL_ORDER)
        );
        let mut statement = conn.prepare(&sql)?;
        let mut rows = statement.query([])?;
        let mut controls = Vec::new();
        while let Some(row) = rows.next()? {
            controls.push(read_control(row)?);
        }
        Ok(Self { controls })
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Control> {
        self.controls.iter()
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut [Control] {
        &mut self.controls
    }

    pub fn find(&self, data_label: &str) -> Option<&Control> {
        self.controls.iter().find(|control| control.data_label == data_label)
    }

    pub fn find_mut(&mut self, data_label: &str) -> Option<&mut Control> {
        self.controls.iter_mut().find(|control| control.data_label == data_label)
    }

    /// Appends a control and restores control order.
    pub fn push(&mut self, control: Control) {
        self.controls.push(control);
        self.controls.sort_by_key(|control| control.control_order);
    }

    /// Removes a control by data label.
    pub fn remove(&mut self, data_label: &str) -> Option<Control> {
        let index = self.controls.iter().position(|control| control.data_label == data_label)?;
        Some(self.controls.remove(index))
    }

    /// Re-sorts after orders were edited in place.
    pub fn sort(&mut self) {
        self.controls.sort_by_key(|control| control.control_order);
    }

    /// Data labels in spreadsheet order.
    pub fn data_labels_in_spreadsheet_order(&self) -> Vec<String> {
        let mut ordered: Vec<&Control> = self.controls.iter().collect();
        ordered.sort_by_key(|control| control.spreadsheet_order);
        ordered.into_iter().map(|control| control.data_label.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a ControlTable {
    type Item = &'a Control;
    type IntoIter = std::slice::Iter<'a, Control>;

    fn into_iter(self) -> Self::IntoIter {
        self.controls.iter()
    }
}

fn read_control(row: &Row<'_>) -> Result<Control> {
    let type_value: i64 = row.get(control_column::TYPE)?;
    let control_type = ControlType::from_database_value(type_value)
        .map_err(|_| SqliteError::SchemaError(format!("control type {type_value} is not supported")))?;
    let data_label: String = row.get(control_column::DATA_LABEL)?;
    let mut control = Control::new(control_type, data_label, row.get(control_column::CONTROL_ORDER)?);

    control.id = row.get(label::ID)?;
    control.spreadsheet_order = row.get(control_column::SPREADSHEET_ORDER)?;
    control.default_value = row.get::<_, Option<String>>(control_column::DEFAULT_VALUE)?.unwrap_or_default();
    control.label = row.get(control_column::LABEL)?;
    control.tooltip = row.get::<_, Option<String>>(control_column::TOOLTIP)?.unwrap_or_default();
    control.max_width = row.get(control_column::MAX_WIDTH)?;
    control.copyable = row.get(control_column::COPYABLE)?;
    control.visible = row.get(control_column::VISIBLE)?;
    control.well_known_values = row
        .get::<_, Option<String>>(control_column::WELL_KNOWN_VALUES)?
        .unwrap_or_default();
    control.analysis_label = row.get(control_column::ANALYSIS_LABEL)?;
    control.index_in_file_table = row.get(control_column::INDEX_IN_FILE_TABLE)?;
    control.accept_changes();
    Ok(control)
}

fn control_values(control: &Control, include_id: bool) -> Vec<Value> {
    let mut values = vec![
        Value::Integer(control.control_order),
        Value::Integer(control.spreadsheet_order),
        Value::Integer(control.control_type.to_database_value()),
        Value::Text(control.default_value.clone()),
        Value::Text(control.label.clone()),
        Value::Text(control.data_label.clone()),
        Value::Text(control.tooltip.clone()),
        Value::Integer(control.max_width),
        Value::Integer(i64::from(control.copyable)),
        Value::Integer(i64::from(control.visible)),
        Value::Text(control.well_known_values.clone()),
        Value::Integer(i64::from(control.analysis_label)),
        Value::Integer(i64::from(control.index_in_file_table)),
    ];
    if include_id {
        values.push(Value::Integer(control.id));
    }
    values
}

fn insert_controls_sql() -> String {
    let names: Vec<String> = CONTROL_COLUMNS.iter().map(|name| quote_identifier(name)).collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|index| format!("?{index}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table::CONTROLS),
        names.join(", "),
        placeholders.join(", ")
    )
}

fn update_controls_sql() -> String {
    let assignments: Vec<String> = CONTROL_COLUMNS
        .iter()
        .enumerate()
        .map(|(index, name)| format!("{} = ?{}", quote_identifier(name), index + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        quote_identifier(table::CONTROLS),
        assignments.join(", "),
        quote_identifier(label::ID),
        CONTROL_COLUMNS.len() + 1
    )
}

/// Inserts or updates controls.
///
/// # Examples
///
/// ```
/// use carnassial_core::Control;
/// use carnassial_sqlite::{ControlTable, ControlTransactionSequence, generate_controls_table_sql};
/// use rusqlite::Connection;
///
/// let conn = Connection::open_in_memory().unwrap();
/// conn.execute_batch(&generate_controls_table_sql()).unwrap();
///
/// let mut controls = Control::standard_controls();
/// let mut insert = ControlTransactionSequence::create_insert(&conn, 1000).unwrap();
/// insert.add_controls(&mut controls).unwrap();
/// drop(insert);
///
/// let loaded = ControlTable::load(&conn).unwrap();
/// assert_eq!(loaded.len(), 6);
/// assert_eq!(loaded.find("DeleteFlag").unwrap().label, "Delete?");
/// ```
pub struct ControlTransactionSequence<'c> {
    sequence: TransactionSequence<'c>,
    is_insert: bool,
}

impl<'c> ControlTransactionSequence<'c> {
    pub fn create_insert(conn: &'c Connection, rows_per_transaction: usize) -> Result<Self> {
        Ok(Self {
            sequence: TransactionSequence::new(conn, &insert_controls_sql(), rows_per_transaction)?,
            is_insert: true,
        })
    }

    pub fn create_update(conn: &'c Connection, rows_per_transaction: usize) -> Result<Self> {
        Ok(Self {
            sequence: TransactionSequence::new(conn, &update_controls_sql(), rows_per_transaction)?,
            is_insert: false,
        })
    }

    /// Inserts controls, recording their IDs.
    pub fn add_controls<'r>(&mut self, controls: impl IntoIterator<Item = &'r mut Control>) -> Result<usize> {
        if !self.is_insert {
            return Err(SqliteError::InvalidArgument("sequence was prepared for update".to_string()));
        }
        self.sequence
            .execute_rows(controls, RowPolicy::INSERT, |control| control_values(control, false))
    }

    /// Writes back changed controls.
    pub fn update_controls<'r>(&mut self, controls: impl IntoIterator<Item = &'r mut Control>) -> Result<usize> {
        if self.is_insert {
            return Err(SqliteError::InvalidArgument("sequence was prepared for insert".to_string()));
        }
        self.sequence
            .execute_rows(controls, RowPolicy::UPDATE, |control| control_values(control, true))
    }

    pub fn commits(&self) -> usize {
        self.sequence.commits()
    }
}
