//! In-memory find and replace over file rows.
//!
//! Matching mirrors the custom selection operators, but is evaluated against
//! loaded rows with a comparator chosen once per field from its SQL data
//! type. At most two terms are matched, joined by AND; glob is not
//! supported.

use std::cmp::Ordering;
use std::collections::HashMap;

use carnassial_core::{ComparisonOperator, Control, SearchTerm, SqlDataType, parse_flag, time};
use chrono::{DateTime, Utc};

use crate::column::FileTableColumnMap;
use crate::convert::FieldValue;
use crate::error::{Result, SqliteError};
use crate::file_row::FileRow;

/// Find value parsed into the comparator's type.
#[derive(Debug, Clone, PartialEq)]
enum FindValue {
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Integer(i32),
    Real(f64),
    Text(String),
}

/// A search term compiled against its column.
#[derive(Debug, Clone, PartialEq)]
struct Matcher {
    data_label: String,
    operator: ComparisonOperator,
    value: FindValue,
}

impl Matcher {
    fn compile(term: &SearchTerm, data_type: SqlDataType) -> Result<Self> {
        let invalid =
            || SqliteError::ConversionError(format!("'{}' is not a valid value for {}", term.database_value, term.data_label));
        let value = match data_type {
            SqlDataType::Boolean => {
                if !matches!(term.operator, ComparisonOperator::Equal | ComparisonOperator::NotEqual) {
                    return Err(SqliteError::InvalidArgument(format!(
                        "operator {} does not apply to flag {}",
                        term.operator, term.data_label
                    )));
                }
                FindValue::Boolean(parse_flag(&term.database_value).ok_or_else(invalid)?)
            }
            SqlDataType::DateTime => {
                FindValue::DateTime(time::parse_database_date_time(&term.database_value).map_err(|_| invalid())?)
            }
            SqlDataType::Integer => FindValue::Integer(term.database_value.trim().parse().map_err(|_| invalid())?),
            SqlDataType::Real => FindValue::Real(term.database_value.trim().parse().map_err(|_| invalid())?),
            SqlDataType::String => FindValue::Text(term.database_value.clone()),
            SqlDataType::Blob => {
                return Err(SqliteError::SchemaError(format!(
                    "{} holds binary data and cannot be searched",
                    term.data_label
                )));
            }
        };
        if term.operator == ComparisonOperator::Glob {
            return Err(SqliteError::InvalidArgument(format!(
                "glob is not supported when finding {}",
                term.data_label
            )));
        }
        Ok(Self {
            data_label: term.data_label.clone(),
            operator: term.operator,
            value,
        })
    }

    fn matches(&self, file: &FileRow) -> Result<bool> {
        let ordering = match &self.value {
            FindValue::Boolean(find) => file.get_flag(&self.data_label)?.partial_cmp(find),
            FindValue::DateTime(find) => match file.get_database_value(&self.data_label)? {
                FieldValue::DateTime(value) => value.with_timezone(&Utc).partial_cmp(find),
                other => return Err(self.mismatch(&other)),
            },
            FindValue::Integer(find) => match file.get_database_value(&self.data_label)? {
                FieldValue::Integer(value) => value.partial_cmp(find),
                other => return Err(self.mismatch(&other)),
            },
            FindValue::Real(find) => match file.get_database_value(&self.data_label)? {
                FieldValue::Real(value) => value.partial_cmp(find),
                other => return Err(self.mismatch(&other)),
            },
            FindValue::Text(find) => file.get_database_string(&self.data_label)?.as_str().partial_cmp(find.as_str()),
        };
        Ok(ordering.is_some_and(|ordering| satisfies(self.operator, ordering)))
    }

    fn mismatch(&self, value: &FieldValue) -> SqliteError {
        SqliteError::ConversionError(format!("{value:?} in {} does not match its column type", self.data_label))
    }
}

fn satisfies(operator: ComparisonOperator, ordering: Ordering) -> bool {
    match operator {
        ComparisonOperator::Equal => ordering == Ordering::Equal,
        ComparisonOperator::NotEqual => ordering != Ordering::Equal,
        ComparisonOperator::LessThan => ordering == Ordering::Less,
        ComparisonOperator::LessThanOrEqual => ordering != Ordering::Greater,
        ComparisonOperator::GreaterThan => ordering == Ordering::Greater,
        ComparisonOperator::GreaterThanOrEqual => ordering != Ordering::Less,
        ComparisonOperator::Glob => false,
    }
}

/// Two find terms joined by AND and one value to write into matching rows.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use carnassial_core::{Control, ControlType};
/// use carnassial_sqlite::{FileFindReplace, FileRow, FileTableColumnMap};
///
/// let mut controls = Control::standard_controls();
/// controls.push(Control::new(ControlType::Note, "Species", 7));
/// let columns = Arc::new(FileTableColumnMap::new(&controls).unwrap());
///
/// let mut find_replace = FileFindReplace::new(&controls, &columns).unwrap();
/// let mut find = find_replace.create_term("Species").unwrap();
/// find.database_value = "dear".to_string();
/// find_replace.set_find_term1(find).unwrap();
/// let mut replace = find_replace.create_term("Species").unwrap();
/// replace.database_value = "deer".to_string();
/// find_replace.set_replace_term(Some(replace)).unwrap();
///
/// let mut file = FileRow::new("IMG_0001.JPG", "", Arc::clone(&columns)).unwrap();
/// file.set_note_or_choice("Species", "dear").unwrap();
/// assert!(find_replace.matches(&file).unwrap());
/// assert!(find_replace.try_replace(&mut file).unwrap());
/// assert_eq!(file.get_note_or_choice("Species").unwrap(), "deer");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FileFindReplace {
    controls: Vec<Control>,
    data_types: HashMap<String, SqlDataType>,
    find_term1: SearchTerm,
    find_term2: Option<SearchTerm>,
    replace_term: Option<SearchTerm>,
    matcher1: Matcher,
    matcher2: Option<Matcher>,
}

impl FileFindReplace {
    /// Creates a find over the visible controls with the first term
    /// enabled on the first analysis control, or the first visible control
    /// if none is marked for analysis.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidArgument`] if no control is visible and
    /// [`SqliteError::SchemaError`] if a visible control has no column.
    pub fn new(controls: &[Control], columns: &FileTableColumnMap) -> Result<Self> {
        let mut visible: Vec<Control> = controls.iter().filter(|control| control.visible).cloned().collect();
        visible.sort_by_key(|control| control.control_order);

        let mut data_types = HashMap::with_capacity(visible.len());
        for control in &visible {
            let column = columns
                .get(&control.data_label)
                .ok_or_else(|| SqliteError::SchemaError(format!("no column for control {}", control.data_label)))?;
            data_types.insert(control.data_label.clone(), column.data_type);
        }

        let default_control = visible
            .iter()
            .find(|control| control.analysis_label)
            .or_else(|| visible.first())
            .ok_or_else(|| SqliteError::InvalidArgument("no controls are visible".to_string()))?;
        let mut find_term1 = SearchTerm::new(default_control);
        find_term1.use_for_searching = true;
        let matcher1 = Matcher::compile(&find_term1, data_types[&find_term1.data_label])?;

        Ok(Self {
            controls: visible,
            data_types,
            find_term1,
            find_term2: None,
            replace_term: None,
            matcher1,
            matcher2: None,
        })
    }

    /// Visible controls a term may be created on, in control order.
    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// A fresh enabled term on a visible control.
    pub fn create_term(&self, data_label: &str) -> Option<SearchTerm> {
        self.controls
            .iter()
            .find(|control| control.data_label == data_label)
            .map(|control| {
                let mut term = SearchTerm::new(control);
                term.use_for_searching = true;
                term
            })
    }

    pub fn find_term1(&self) -> &SearchTerm {
        &self.find_term1
    }

    /// Replaces the first find term.
    ///
    /// # Errors
    ///
    /// Fails if the field is not searchable, the operator does not apply to
    /// the field or the value does not parse as the field's type.
    pub fn set_find_term1(&mut self, term: SearchTerm) -> Result<()> {
        self.matcher1 = Matcher::compile(&term, self.data_type(&term.data_label)?)?;
        self.find_term1 = term;
        Ok(())
    }

    pub fn find_term2(&self) -> Option<&SearchTerm> {
        self.find_term2.as_ref()
    }

    /// Sets or clears the second find term.
    pub fn set_find_term2(&mut self, term: Option<SearchTerm>) -> Result<()> {
        self.matcher2 = match &term {
            Some(term) => Some(Matcher::compile(term, self.data_type(&term.data_label)?)?),
            None => None,
        };
        self.find_term2 = term;
        Ok(())
    }

    pub fn replace_term(&self) -> Option<&SearchTerm> {
        self.replace_term.as_ref()
    }

    /// Sets or clears the replacement.
    pub fn set_replace_term(&mut self, term: Option<SearchTerm>) -> Result<()> {
        if let Some(term) = &term {
            self.data_type(&term.data_label)?;
        }
        self.replace_term = term;
        Ok(())
    }

    fn data_type(&self, data_label: &str) -> Result<SqlDataType> {
        self.data_types
            .get(data_label)
            .copied()
            .ok_or_else(|| SqliteError::InvalidArgument(format!("{data_label} is not a visible field")))
    }

    /// Whether the file satisfies the first term and, if set, the second.
    pub fn matches(&self, file: &FileRow) -> Result<bool> {
        if !self.find_term1.use_for_searching || !self.matcher1.matches(file)? {
            return Ok(false);
        }
        match (&self.find_term2, &self.matcher2) {
            (Some(term), Some(matcher)) if term.use_for_searching => matcher.matches(file),
            _ => Ok(true),
        }
    }

    /// Writes the replacement value into the file. Returns whether the file
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the replacement is not a valid value
    /// of its field.
    pub fn try_replace(&self, file: &mut FileRow) -> Result<bool> {
        let Some(replace) = &self.replace_term else {
            return Ok(false);
        };
        if file.get_database_string(&replace.data_label)? == replace.database_value {
            return Ok(false);
        }
        file.set_database_string(&replace.data_label, &replace.database_value)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use carnassial_core::{ControlType, FileClassification};
    use chrono::{FixedOffset, TimeZone};

    fn controls() -> Vec<Control> {
        let mut controls = Control::standard_controls();
        controls.push(Control::new(ControlType::Counter, "Animals", 7));
        controls.push(Control::new(ControlType::Flag, "Juvenile", 8));
        let mut species = Control::new(ControlType::FixedChoice, "Species", 9).with_well_known_values(["Deer", "Bear"]);
        species.analysis_label = true;
        controls.push(species);
        controls
    }

    fn setup() -> (FileFindReplace, Arc<FileTableColumnMap>) {
        let controls = controls();
        let columns = Arc::new(FileTableColumnMap::new(&controls).unwrap());
        (FileFindReplace::new(&controls, &columns).unwrap(), columns)
    }

    fn term(find_replace: &FileFindReplace, data_label: &str, operator: ComparisonOperator, value: &str) -> SearchTerm {
        let mut term = find_replace.create_term(data_label).unwrap();
        term.operator = operator;
        term.database_value = value.to_string();
        term
    }

    #[test]
    fn test_default_term_prefers_analysis_label() {
        let (find_replace, _) = setup();
        assert_eq!(find_replace.find_term1().data_label, "Species");
        assert!(find_replace.find_term1().use_for_searching);

        let controls = Control::standard_controls();
        let columns = FileTableColumnMap::new(&controls).unwrap();
        let find_replace = FileFindReplace::new(&controls, &columns).unwrap();
        assert_eq!(find_replace.find_term1().data_label, "File");
    }

    #[test]
    fn test_no_visible_controls() {
        let mut controls = Control::standard_controls();
        for control in &mut controls {
            control.visible = false;
        }
        let columns = FileTableColumnMap::new(&controls).unwrap();
        assert!(matches!(
            FileFindReplace::new(&controls, &columns),
            Err(SqliteError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_integer_comparisons() {
        let (mut find_replace, columns) = setup();
        let mut file = FileRow::new("a.jpg", "", columns).unwrap();
        file.set_counter("Animals", 4).unwrap();

        for (operator, expected) in [
            (ComparisonOperator::Equal, false),
            (ComparisonOperator::NotEqual, true),
            (ComparisonOperator::LessThan, false),
            (ComparisonOperator::LessThanOrEqual, false),
            (ComparisonOperator::GreaterThan, true),
            (ComparisonOperator::GreaterThanOrEqual, true),
        ] {
            find_replace.set_find_term1(term(&find_replace, "Animals", operator, "3")).unwrap();
            assert_eq!(find_replace.matches(&file).unwrap(), expected, "{operator:?}");
        }
    }

    #[test]
    fn test_boolean_operators_are_restricted() {
        let (mut find_replace, columns) = setup();
        let mut file = FileRow::new("a.jpg", "", columns).unwrap();
        file.set_flag("Juvenile", true).unwrap();

        find_replace
            .set_find_term1(term(&find_replace, "Juvenile", ComparisonOperator::Equal, "True"))
            .unwrap();
        assert!(find_replace.matches(&file).unwrap());
        find_replace
            .set_find_term1(term(&find_replace, "Juvenile", ComparisonOperator::NotEqual, "true"))
            .unwrap();
        assert!(!find_replace.matches(&file).unwrap());
        assert!(
            find_replace
                .set_find_term1(term(&find_replace, "Juvenile", ComparisonOperator::GreaterThan, "true"))
                .is_err()
        );
    }

    #[test]
    fn test_string_and_glob() {
        let (mut find_replace, columns) = setup();
        let file = FileRow::new("IMG_0002.JPG", "", columns).unwrap();
        find_replace
            .set_find_term1(term(&find_replace, "File", ComparisonOperator::GreaterThan, "IMG_0001.JPG"))
            .unwrap();
        assert!(find_replace.matches(&file).unwrap());
        assert!(
            find_replace
                .set_find_term1(term(&find_replace, "File", ComparisonOperator::Glob, "*.JPG"))
                .is_err()
        );
    }

    #[test]
    fn test_classification_compares_by_name() {
        let (mut find_replace, columns) = setup();
        let mut file = FileRow::new("a.jpg", "", columns).unwrap();
        file.set_classification(FileClassification::Dark);
        find_replace
            .set_find_term1(term(&find_replace, "Classification", ComparisonOperator::Equal, "Dark"))
            .unwrap();
        assert!(find_replace.matches(&file).unwrap());
    }

    #[test]
    fn test_date_time_compares_instants() {
        let (mut find_replace, columns) = setup();
        let mut file = FileRow::new("a.jpg", "", columns).unwrap();
        let offset = FixedOffset::west_opt(7 * 3600).unwrap();
        file.set_date_time(offset.with_ymd_and_hms(2018, 6, 1, 20, 0, 0).unwrap()).unwrap();
        find_replace
            .set_find_term1(term(
                &find_replace,
                "DateTime",
                ComparisonOperator::Equal,
                "2018-06-02T03:00:00.000Z",
            ))
            .unwrap();
        assert!(find_replace.matches(&file).unwrap());
    }

    #[test]
    fn test_second_term_is_anded() {
        let (mut find_replace, columns) = setup();
        let mut file = FileRow::new("a.jpg", "", columns).unwrap();
        file.set_note_or_choice("Species", "Bear").unwrap();
        file.set_counter("Animals", 2).unwrap();

        find_replace
            .set_find_term1(term(&find_replace, "Species", ComparisonOperator::Equal, "Bear"))
            .unwrap();
        find_replace
            .set_find_term2(Some(term(&find_replace, "Animals", ComparisonOperator::GreaterThan, "2")))
            .unwrap();
        assert!(!find_replace.matches(&file).unwrap());
        find_replace.set_find_term2(None).unwrap();
        assert!(find_replace.matches(&file).unwrap());
    }

    #[test]
    fn test_replace() {
        let (mut find_replace, columns) = setup();
        let mut file = FileRow::new("a.jpg", "", columns).unwrap();
        file.accept_changes();
        assert!(!find_replace.try_replace(&mut file).unwrap());

        find_replace
            .set_replace_term(Some(term(&find_replace, "Species", ComparisonOperator::Equal, "Bear")))
            .unwrap();
        assert!(find_replace.try_replace(&mut file).unwrap());
        assert!(file.has_changes());
        assert!(!find_replace.try_replace(&mut file).unwrap());

        find_replace
            .set_replace_term(Some(term(&find_replace, "Species", ComparisonOperator::Equal, "Wolf")))
            .unwrap();
        assert!(find_replace.try_replace(&mut file).is_err());
    }
}
