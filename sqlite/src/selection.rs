//! Custom selections and the `WHERE` clauses of file selections.

use carnassial_core::{
    ComparisonOperator, Control, ControlType, FileSelection, LogicalOperator, SearchTerm, label, time,
};
use chrono::{DateTime, FixedOffset};

use crate::convert::{quote_identifier, to_storage_literal};
use crate::error::Result;

/// Search terms over the visible controls, joined by one logical operator.
///
/// # Examples
///
/// ```
/// use carnassial_core::{Control, ControlType, LogicalOperator};
/// use carnassial_sqlite::CustomSelection;
///
/// let mut controls = Control::standard_controls();
/// controls.push(Control::new(ControlType::Counter, "Animals", 7));
///
/// let mut selection = CustomSelection::new(&controls, LogicalOperator::And);
/// let animals = selection.find_term_mut("Animals").unwrap();
/// animals.database_value = "3".to_string();
/// animals.use_for_searching = true;
/// assert_eq!(selection.create_where().unwrap().as_deref(), Some("\"Animals\" > 3"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CustomSelection {
    search_terms: Vec<SearchTerm>,
    term_combiner: LogicalOperator,
}

impl CustomSelection {
    /// Creates a disabled term for each visible control in control order.
    ///
    /// DateTime gets two terms, `≥` and `≤`, so a range can be selected.
    pub fn new(controls: &[Control], term_combiner: LogicalOperator) -> Self {
        let mut ordered: Vec<&Control> = controls.iter().filter(|control| control.visible).collect();
        ordered.sort_by_key(|control| control.control_order);

        let mut search_terms = Vec::with_capacity(ordered.len() + 1);
        for control in ordered {
            let term = SearchTerm::new(control);
            if control.control_type == ControlType::DateTime {
                let mut upper = term.clone();
                upper.operator = ComparisonOperator::LessThanOrEqual;
                search_terms.push(term);
                search_terms.push(upper);
            } else {
                search_terms.push(term);
            }
        }
        Self {
            search_terms,
            term_combiner,
        }
    }

    pub fn search_terms(&self) -> &[SearchTerm] {
        &self.search_terms
    }

    pub fn search_terms_mut(&mut self) -> &mut [SearchTerm] {
        &mut self.search_terms
    }

    /// First term on a field.
    pub fn find_term_mut(&mut self, data_label: &str) -> Option<&mut SearchTerm> {
        self.search_terms.iter_mut().find(|term| term.data_label == data_label)
    }

    pub fn term_combiner(&self) -> LogicalOperator {
        self.term_combiner
    }

    pub fn set_term_combiner(&mut self, term_combiner: LogicalOperator) {
        self.term_combiner = term_combiner;
    }

    /// Whether any term is enabled.
    pub fn has_enabled_terms(&self) -> bool {
        self.search_terms.iter().any(|term| term.use_for_searching)
    }

    /// Points both date-time terms at `date_time` and the offset term, if
    /// there is one, at its offset.
    pub fn set_date_times_and_offset(&mut self, date_time: DateTime<FixedOffset>) {
        let instant = time::to_database_date_time_string(&date_time);
        let offset = time::to_database_utc_offset_string(*date_time.offset());
        for term in &mut self.search_terms {
            if term.data_label == label::DATE_TIME {
                term.database_value = instant.clone();
            } else if term.data_label == label::UTC_OFFSET {
                term.database_value = offset.clone();
            }
        }
    }

    /// `WHERE` clause body of the enabled terms, or `None` if no term is
    /// enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`](crate::SqliteError::ConversionError) if
    /// an enabled term's value is not valid for its field.
    pub fn create_where(&self) -> Result<Option<String>> {
        let mut clauses = Vec::new();
        for term in self.search_terms.iter().filter(|term| term.use_for_searching) {
            clauses.push(term_clause(term)?);
        }
        if clauses.is_empty() {
            return Ok(None);
        }
        Ok(Some(clauses.join(&format!(" {} ", self.term_combiner.as_sql()))))
    }
}

fn term_clause(term: &SearchTerm) -> Result<String> {
    let column = quote_identifier(&term.data_label);
    if term.database_value.is_empty() {
        if term.operator == ComparisonOperator::Equal {
            return Ok(format!("({column} IS NULL OR {column} = '')"));
        }
        return Ok(format!("{column} {} ''", term.operator.to_sql()));
    }
    let literal = to_storage_literal(term.control_type, &term.data_label, &term.database_value)?;
    Ok(format!("{column} {} {}", term.operator.to_sql(), literal))
}

/// `WHERE` clause body selecting the files of `selection`.
///
/// Returns `None` for [`FileSelection::All`] and for a custom selection
/// without enabled terms.
pub fn where_for_selection(selection: FileSelection, custom: &CustomSelection) -> Result<Option<String>> {
    if let Some(classification) = selection.classification() {
        return Ok(Some(format!(
            "{} = {}",
            quote_identifier(label::CLASSIFICATION),
            classification.to_database_value()
        )));
    }
    match selection {
        FileSelection::MarkedForDeletion => Ok(Some(format!("{} = 1", quote_identifier(label::DELETE_FLAG)))),
        FileSelection::Custom => custom.create_where(),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carnassial_core::FileClassification;
    use chrono::TimeZone;

    fn controls() -> Vec<Control> {
        let mut controls = Control::standard_controls();
        controls.push(Control::new(ControlType::Counter, "Animals", 7));
        controls.push(Control::new(ControlType::Flag, "Juvenile", 8));
        controls.push(Control::new(ControlType::Note, "Comments", 9));
        let mut hidden = Control::new(ControlType::Note, "Hidden", 10);
        hidden.visible = false;
        controls.push(hidden);
        controls
    }

    fn enable(selection: &mut CustomSelection, data_label: &str, operator: ComparisonOperator, value: &str) {
        let term = selection.find_term_mut(data_label).unwrap();
        term.operator = operator;
        term.database_value = value.to_string();
        term.use_for_searching = true;
    }

    #[test]
    fn test_terms_cover_visible_controls() {
        let selection = CustomSelection::new(&controls(), LogicalOperator::And);
        let labels: Vec<&str> = selection.search_terms().iter().map(|term| term.data_label.as_str()).collect();
        assert_eq!(
            labels,
            ["File", "RelativePath", "DateTime", "DateTime", "Classification", "DeleteFlag", "Animals", "Juvenile", "Comments"]
        );
        assert_eq!(selection.search_terms()[2].operator, ComparisonOperator::GreaterThanOrEqual);
        assert_eq!(selection.search_terms()[3].operator, ComparisonOperator::LessThanOrEqual);
        assert!(!selection.has_enabled_terms());
        assert_eq!(selection.create_where().unwrap(), None);
    }

    #[test]
    fn test_counter_term() {
        let mut selection = CustomSelection::new(&controls(), LogicalOperator::And);
        enable(&mut selection, "Animals", ComparisonOperator::GreaterThan, "3");
        assert_eq!(selection.create_where().unwrap().as_deref(), Some("\"Animals\" > 3"));
    }

    #[test]
    fn test_terms_are_joined_by_combiner() {
        let mut selection = CustomSelection::new(&controls(), LogicalOperator::Or);
        enable(&mut selection, "Juvenile", ComparisonOperator::Equal, "true");
        enable(&mut selection, "Classification", ComparisonOperator::NotEqual, "Dark");
        enable(&mut selection, "Comments", ComparisonOperator::Glob, "*fox's*");
        assert_eq!(
            selection.create_where().unwrap().as_deref(),
            Some("\"Classification\" <> 2 OR \"Juvenile\" = 1 OR \"Comments\" GLOB '*fox''s*'")
        );
    }

    #[test]
    fn test_empty_equality_matches_null() {
        let mut selection = CustomSelection::new(&controls(), LogicalOperator::And);
        enable(&mut selection, "Comments", ComparisonOperator::Equal, "");
        assert_eq!(
            selection.create_where().unwrap().as_deref(),
            Some("(\"Comments\" IS NULL OR \"Comments\" = '')")
        );
        enable(&mut selection, "Comments", ComparisonOperator::NotEqual, "");
        assert_eq!(selection.create_where().unwrap().as_deref(), Some("\"Comments\" <> ''"));
    }

    #[test]
    fn test_date_range() {
        let mut selection = CustomSelection::new(&controls(), LogicalOperator::And);
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        selection.set_date_times_and_offset(offset.with_ymd_and_hms(2017, 5, 1, 8, 0, 0).unwrap());
        selection.search_terms_mut()[2].use_for_searching = true;
        selection.search_terms_mut()[3].use_for_searching = true;
        selection.search_terms_mut()[3].database_value = "2017-05-31T00:00:00.000Z".to_string();
        assert_eq!(
            selection.create_where().unwrap().as_deref(),
            Some("\"DateTime\" >= '2017-05-01T06:00:00.000Z' AND \"DateTime\" <= '2017-05-31T00:00:00.000Z'")
        );
    }

    #[test]
    fn test_keyword_labels_are_quoted() {
        let mut controls = controls();
        controls.push(Control::new(ControlType::Counter, "Order", 11));
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&crate::schema::generate_files_table_sql(&controls).unwrap())
            .unwrap();
        conn.execute("INSERT INTO Files (File, RelativePath, \"Order\") VALUES ('a.jpg', '', 4)", [])
            .unwrap();

        let mut selection = CustomSelection::new(&controls, LogicalOperator::And);
        enable(&mut selection, "Order", ComparisonOperator::GreaterThan, "3");
        let where_clause = selection.create_where().unwrap().unwrap();
        assert_eq!(where_clause, "\"Order\" > 3");
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM Files WHERE {where_clause}"), [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let mut selection = CustomSelection::new(&controls(), LogicalOperator::And);
        enable(&mut selection, "Animals", ComparisonOperator::GreaterThan, "many");
        assert!(selection.create_where().is_err());
    }

    #[test]
    fn test_where_for_selection() {
        let custom = CustomSelection::new(&controls(), LogicalOperator::And);
        assert_eq!(where_for_selection(FileSelection::All, &custom).unwrap(), None);
        assert_eq!(where_for_selection(FileSelection::Custom, &custom).unwrap(), None);
        assert_eq!(
            where_for_selection(FileSelection::Dark, &custom).unwrap().as_deref(),
            Some(format!("\"Classification\" = {}", FileClassification::Dark.to_database_value()).as_str())
        );
        assert_eq!(
            where_for_selection(FileSelection::MarkedForDeletion, &custom).unwrap().as_deref(),
            Some("\"DeleteFlag\" = 1")
        );
    }
}
