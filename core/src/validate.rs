//! Template and value validation.
//!
//! Validates the invariants of a control list: data labels are well formed
//! and unique, control and spreadsheet orders are each a contiguous one-based
//! permutation, and defaults are acceptable values for their controls.
//! Values entered for a field are checked with [`validate_value`] before they
//! are handed to the store.
//!
//! # Examples
//!
//! ```
//! use carnassial_core::*;
//!
//! let mut controls = Control::standard_controls();
//! controls.push(Control::new(ControlType::Counter, "Animals", 7));
//! assert!(validate_controls(&controls).is_empty());
//!
//! controls.push(Control::new(ControlType::Note, "Animals", 8));
//! let errors = validate_controls(&controls);
//! assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateDataLabel(_))));
//! ```

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::control::Control;
use crate::types::{ControlType, label};

static DATA_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{L}[\p{L}\p{N}_]*$").expect("static regex must compile"));

/// Template and value validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Data label is empty, does not start with a letter, or contains
    /// characters other than letters, digits and underscores.
    #[error("invalid data label '{0}'")]
    InvalidDataLabel(String),
    /// Data label is `Id` or a marker column name, which the `Files` table
    /// uses itself.
    #[error("data label '{0}' is reserved")]
    ReservedDataLabel(String),
    /// Two controls share a data label.
    #[error("duplicate data label: {0}")]
    DuplicateDataLabel(String),
    /// A standard control is absent.
    #[error("standard control {0} is missing")]
    MissingStandardControl(String),
    /// Orders are not a one-based permutation of the controls.
    #[error("{column} values are not a contiguous one-based ordering")]
    NonContiguousOrder {
        /// `ControlOrder` or `SpreadsheetOrder`.
        column: &'static str,
    },
    /// A default value the control itself rejects.
    #[error("default value '{value}' is not valid for {data_label}")]
    InvalidDefaultValue {
        /// Control with the bad default.
        data_label: String,
        /// The default.
        value: String,
    },
    /// A value rejected for its control.
    #[error("'{value}' is not a valid value for {data_label}")]
    InvalidValue {
        /// Control the value was entered for.
        data_label: String,
        /// The value.
        value: String,
    },
}

/// Checks a data label's form.
///
/// The first character is a letter; the rest are letters, digits or
/// underscores.
///
/// # Examples
///
/// ```
/// use carnassial_core::is_valid_data_label;
///
/// assert!(is_valid_data_label("Deer_2"));
/// assert!(!is_valid_data_label("2Deer"));
/// assert!(!is_valid_data_label("Deer count"));
/// ```
pub fn is_valid_data_label(data_label: &str) -> bool {
    DATA_LABEL.is_match(data_label)
}

/// Validates a data label for a new user control against existing controls.
pub fn validate_new_data_label(data_label: &str, controls: &[Control]) -> Result<(), ValidationError> {
    if !is_valid_data_label(data_label) {
        return Err(ValidationError::InvalidDataLabel(data_label.to_string()));
    }
    if is_reserved_data_label(data_label, controls) {
        return Err(ValidationError::ReservedDataLabel(data_label.to_string()));
    }
    if controls.iter().any(|control| control.data_label == data_label) {
        return Err(ValidationError::DuplicateDataLabel(data_label.to_string()));
    }
    Ok(())
}

fn is_reserved_data_label(data_label: &str, controls: &[Control]) -> bool {
    if data_label.eq_ignore_ascii_case(label::ID) {
        return true;
    }
    // a counter's marker column shares the table's namespace
    controls.iter().any(|control| {
        control.control_type == ControlType::Counter
            && data_label == format!("{}{}", control.data_label, label::MARKER_POSITION_SUFFIX)
    })
}

/// Checks a value before it is written to a field.
pub fn validate_value(control: &Control, value: &str) -> Result<(), ValidationError> {
    if control.is_valid_data(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            data_label: control.data_label.clone(),
            value: value.to_string(),
        })
    }
}

/// Validates a template's control list.
///
/// Returns every problem found; an empty list means the template is valid.
pub fn validate_controls(controls: &[Control]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen: HashSet<&str> = HashSet::new();
    for control in controls {
        let data_label = control.data_label.as_str();
        if !is_valid_data_label(data_label) {
            errors.push(ValidationError::InvalidDataLabel(data_label.to_string()));
        } else if is_reserved_data_label(data_label, controls) {
            errors.push(ValidationError::ReservedDataLabel(data_label.to_string()));
        }
        if !seen.insert(data_label) {
            errors.push(ValidationError::DuplicateDataLabel(data_label.to_string()));
        }
        if !control.is_file_path_component() && !control.is_valid_data(&control.default_value) {
            // notes and choices may default to empty
            if !control.default_value.is_empty() {
                errors.push(ValidationError::InvalidDefaultValue {
                    data_label: data_label.to_string(),
                    value: control.default_value.clone(),
                });
            }
        }
    }

    for standard in label::STANDARD_CONTROLS {
        if !seen.contains(standard) {
            errors.push(ValidationError::MissingStandardControl(standard.to_string()));
        }
    }

    if !is_one_based_permutation(controls.iter().map(|control| control.control_order)) {
        errors.push(ValidationError::NonContiguousOrder { column: "ControlOrder" });
    }
    if !is_one_based_permutation(controls.iter().map(|control| control.spreadsheet_order)) {
        errors.push(ValidationError::NonContiguousOrder {
            column: "SpreadsheetOrder",
        });
    }

    errors
}

/// Returns `true` if the orders are exactly `1..=n` in some arrangement.
pub fn is_one_based_permutation(orders: impl IntoIterator<Item = i64>) -> bool {
    let mut orders: Vec<i64> = orders.into_iter().collect();
    orders.sort_unstable();
    orders
        .iter()
        .enumerate()
        .all(|(index, order)| *order == index as i64 + 1)
}
