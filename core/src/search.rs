//! Search terms and the comparison operator vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::control::{Control, FLAG_FALSE};
use crate::error::{CoreError, Result};
use crate::time;
use crate::types::ControlType;

/// Comparison offered for a search term.
///
/// Each operator has a display symbol, which is how terms are written and
/// parsed, and a SQL equivalent. The two are in one to one correspondence.
///
/// # Examples
///
/// ```
/// use carnassial_core::ComparisonOperator;
///
/// let op: ComparisonOperator = "\u{2265}".parse().unwrap();
/// assert_eq!(op, ComparisonOperator::GreaterThanOrEqual);
/// assert_eq!(op.to_sql(), ">=");
/// assert!("~".parse::<ComparisonOperator>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ComparisonOperator {
    /// `=`
    #[default]
    Equal,
    /// `≠`
    NotEqual,
    /// `<`
    LessThan,
    /// `≤`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `≥`
    GreaterThanOrEqual,
    /// SQLite `GLOB` pattern match.
    Glob,
}

impl ComparisonOperator {
    /// Every operator.
    pub const ALL: [ComparisonOperator; 7] = [
        ComparisonOperator::Equal,
        ComparisonOperator::NotEqual,
        ComparisonOperator::LessThan,
        ComparisonOperator::LessThanOrEqual,
        ComparisonOperator::GreaterThan,
        ComparisonOperator::GreaterThanOrEqual,
        ComparisonOperator::Glob,
    ];

    /// Symbol shown to users and used in term strings.
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::NotEqual => "\u{2260}",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqual => "\u{2264}",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => "\u{2265}",
            ComparisonOperator::Glob => "GLOB",
        }
    }

    /// SQL operator.
    pub fn to_sql(self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::NotEqual => "<>",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::Glob => "GLOB",
        }
    }

    /// Operators meaningful for fields of the given type.
    ///
    /// Flags compare only for equality. Glob applies to text.
    pub fn for_control_type(control_type: ControlType) -> &'static [ComparisonOperator] {
        const EQUALITY: &[ComparisonOperator] = &[ComparisonOperator::Equal, ComparisonOperator::NotEqual];
        const ORDERED: &[ComparisonOperator] = &[
            ComparisonOperator::Equal,
            ComparisonOperator::NotEqual,
            ComparisonOperator::LessThan,
            ComparisonOperator::LessThanOrEqual,
            ComparisonOperator::GreaterThan,
            ComparisonOperator::GreaterThanOrEqual,
        ];
        match control_type {
            ControlType::Flag => EQUALITY,
            ControlType::Counter | ControlType::DateTime | ControlType::UtcOffset => ORDERED,
            ControlType::FixedChoice | ControlType::Note => &ComparisonOperator::ALL,
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for ComparisonOperator {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.symbol() == s)
            .ok_or_else(|| CoreError::UnsupportedOperator(s.to_string()))
    }
}

/// Translates an operator symbol to SQL.
///
/// # Errors
///
/// Returns [`CoreError::UnsupportedOperator`] for symbols outside the
/// vocabulary.
pub fn sql_operator(symbol: &str) -> Result<&'static str> {
    symbol.parse::<ComparisonOperator>().map(ComparisonOperator::to_sql)
}

/// One filter criterion on a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTerm {
    /// Type of the field searched.
    pub control_type: ControlType,
    /// Data label of the field searched.
    pub data_label: String,
    /// Display label of the field.
    pub label: String,
    /// Comparison.
    pub operator: ComparisonOperator,
    /// Value compared against, in the control's string form.
    pub database_value: String,
    /// Whether the term contributes to the selection.
    pub use_for_searching: bool,
}

impl SearchTerm {
    /// Creates a disabled term seeded with the type's default comparison.
    ///
    /// Counters start at `> 0`, date-times and offsets at `≥` the default
    /// date-time, flags at `= false` and other fields at `=` their default.
    pub fn new(control: &Control) -> Self {
        let default_date_time = time::default_date_time();
        let (operator, database_value) = match control.control_type {
            ControlType::Counter => (ComparisonOperator::GreaterThan, "0".to_string()),
            ControlType::DateTime => (
                ComparisonOperator::GreaterThanOrEqual,
                time::to_database_date_time_string(&default_date_time),
            ),
            ControlType::Flag => (ComparisonOperator::Equal, FLAG_FALSE.to_string()),
            ControlType::FixedChoice | ControlType::Note => {
                (ComparisonOperator::Equal, control.default_value.clone())
            }
            ControlType::UtcOffset => (
                ComparisonOperator::GreaterThanOrEqual,
                time::to_database_utc_offset_string(*default_date_time.offset()),
            ),
        };
        Self {
            control_type: control.control_type,
            data_label: control.data_label.clone(),
            label: control.label.clone(),
            operator,
            database_value,
            use_for_searching: false,
        }
    }

    /// Replaces the operator with one given by symbol.
    pub fn set_operator(&mut self, symbol: &str) -> Result<()> {
        self.operator = symbol.parse()?;
        Ok(())
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.database_value.is_empty() {
            write!(f, "{} {} \"\"", self.label, self.operator)
        } else {
            write!(f, "{} {} {}", self.label, self.operator, self.database_value)
        }
    }
}
