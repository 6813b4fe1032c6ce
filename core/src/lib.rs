//! Core types for Carnassial image set metadata.
//!
//! This crate defines what a template and its files look like independent
//! of storage:
//!
//! - [`Control`]: a field of the template (counter, choice, flag, note,
//!   date-time or UTC offset) with its default, choices and display order.
//! - [`ControlType`] and [`SqlDataType`]: the kind of a field and the
//!   physical type of its column.
//! - [`FileClassification`] and [`FileSelection`]: image quality classes
//!   and the selections built on them.
//! - [`MarkersForCounter`]: markers placed for a counter and their packed
//!   blob encoding.
//! - [`SearchTerm`] and [`ComparisonOperator`]: criteria of a custom
//!   selection.
//! - [`time`]: database encodings of date-times and UTC offsets.
//!
//! Validation ([`validate_controls`], [`validate_value`]) checks template
//! invariants before they reach the database.
//!
//! # Example
//!
//! ```
//! use carnassial_core::*;
//!
//! let mut controls = Control::standard_controls();
//! controls.push(
//!     Control::new(ControlType::FixedChoice, "Species", 7)
//!         .with_well_known_values(["Deer", "Elk", "Cougar"]),
//! );
//! controls.push(Control::new(ControlType::Counter, "Animals", 8));
//!
//! assert!(validate_controls(&controls).is_empty());
//! assert!(validate_value(&controls[6], "Elk").is_ok());
//! assert_eq!(controls[7].control_type.sql_data_type(), SqlDataType::Integer);
//! ```

mod control;
mod error;
pub mod marker;
mod search;
pub mod time;
mod types;
mod validate;

pub use control::{
    Control, DEFAULT_MAX_WIDTH, FLAG_FALSE, FLAG_TRUE, WELL_KNOWN_VALUES_DELIMITER, flag_to_string, parse_flag,
};
pub use error::{CoreError, Result};
pub use marker::{Marker, MarkersForCounter, Point};
pub use search::{ComparisonOperator, SearchTerm, sql_operator};
pub use types::*;
pub use validate::{
    ValidationError, is_one_based_permutation, is_valid_data_label, validate_controls, validate_new_data_label,
    validate_value,
};
