//! Control definitions: the user configured fields of a template.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::time;
use crate::types::{ControlType, FileClassification, label};

/// Separates choices in a control's well known values.
pub const WELL_KNOWN_VALUES_DELIMITER: char = '|';

/// Default maximum display width of a control.
pub const DEFAULT_MAX_WIDTH: i64 = 500;

/// Canonical string of a set flag.
pub const FLAG_TRUE: &str = "true";

/// Canonical string of a cleared flag.
pub const FLAG_FALSE: &str = "false";

const COUNTER_TOOLTIP: &str = "Click the counter button, then click on the image to count the entity. Or just type in a count";
const DATE_TIME_TOOLTIP: &str = "Date and time taken";
const FIXED_CHOICE_TOOLTIP: &str = "Choose an item from the menu";
const FLAG_TOOLTIP: &str = "Toggle between true and false";
const NOTE_TOOLTIP: &str = "Write a textual note";
const UTC_OFFSET_TOOLTIP: &str = "Universal Time offset of the time zone for date and time taken";
const CLASSIFICATION_TOOLTIP: &str = "Color image, greyscale image, dark if mostly black image, video, corrupt if it can't be read, no longer available if the file is missing.";
const DELETE_FLAG_LABEL: &str = "Delete?";
const DELETE_FLAG_TOOLTIP: &str = "Mark a file as one to be deleted. You can then confirm deletion through the Edit Menu";
const FILE_TOOLTIP: &str = "The file name";
const RELATIVE_PATH_TOOLTIP: &str = "Path from the folder containing the template and image data files to the file";

/// Parses a flag string.
///
/// Accepts the canonical literals case-insensitively, plus `0` and `1` as
/// written by older templates.
pub fn parse_flag(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case(FLAG_TRUE) || value == "1" {
        Some(true)
    } else if value.eq_ignore_ascii_case(FLAG_FALSE) || value == "0" {
        Some(false)
    } else {
        None
    }
}

/// Canonical string of a flag value.
pub fn flag_to_string(value: bool) -> &'static str {
    if value { FLAG_TRUE } else { FLAG_FALSE }
}

/// One field definition of a template.
///
/// Fields are public; code that edits a control outside of
/// [`synchronize`](Self::synchronize) calls [`mark_changed`](Self::mark_changed)
/// so the control is included in the next control update batch.
///
/// # Examples
///
/// ```
/// use carnassial_core::{Control, ControlType};
///
/// let species = Control::new(ControlType::FixedChoice, "Species", 7)
///     .with_well_known_values(["Deer", "Bear"]);
/// assert!(species.is_user_control());
/// assert!(species.is_valid_data("Bear"));
/// assert!(!species.is_valid_data("Wolf"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// Primary key in the `Controls` table, or -1 if not yet stored.
    pub id: i64,
    /// Whether the control identifies files during analysis.
    pub analysis_label: bool,
    /// One-based position among the data entry controls.
    pub control_order: i64,
    /// Whether the value may be copied from the previous file.
    pub copyable: bool,
    /// Unique name of the field and of its column in the `Files` table.
    pub data_label: String,
    /// Value new files receive, in string form.
    pub default_value: String,
    /// Whether the `Files` table has a secondary index on the column.
    pub index_in_file_table: bool,
    /// Display label.
    pub label: String,
    /// Maximum display width.
    pub max_width: i64,
    /// One-based position among spreadsheet columns.
    pub spreadsheet_order: i64,
    /// Tooltip.
    pub tooltip: String,
    /// Kind of field.
    pub control_type: ControlType,
    /// Whether the control is shown.
    pub visible: bool,
    /// Bar delimited choices.
    pub well_known_values: String,
    #[serde(skip)]
    has_changes: bool,
}

impl Control {
    /// Creates a user control with the defaults for its type.
    pub fn new(control_type: ControlType, data_label: impl Into<String>, control_order: i64) -> Self {
        let data_label = data_label.into();
        let mut control = Self {
            id: -1,
            analysis_label: false,
            control_order,
            copyable: true,
            label: data_label.clone(),
            data_label,
            default_value: String::new(),
            index_in_file_table: false,
            max_width: DEFAULT_MAX_WIDTH,
            spreadsheet_order: control_order,
            tooltip: String::new(),
            control_type,
            visible: true,
            well_known_values: String::new(),
            has_changes: false,
        };

        match control_type {
            ControlType::Counter => {
                control.copyable = false;
                control.default_value = "0".to_string();
                control.tooltip = COUNTER_TOOLTIP.to_string();
            }
            ControlType::DateTime => {
                control.copyable = false;
                control.default_value = time::to_database_date_time_string(&time::default_date_time());
                control.index_in_file_table = true;
                control.tooltip = DATE_TIME_TOOLTIP.to_string();
            }
            ControlType::FixedChoice => {
                control.tooltip = FIXED_CHOICE_TOOLTIP.to_string();
            }
            ControlType::Flag => {
                control.default_value = FLAG_FALSE.to_string();
                control.tooltip = FLAG_TOOLTIP.to_string();
                control.well_known_values = format!("{FLAG_FALSE}{WELL_KNOWN_VALUES_DELIMITER}{FLAG_TRUE}");
            }
            ControlType::Note => {
                control.tooltip = NOTE_TOOLTIP.to_string();
            }
            ControlType::UtcOffset => {
                control.copyable = false;
                control.default_value = time::to_database_utc_offset_string(*time::default_date_time().offset());
                control.tooltip = UTC_OFFSET_TOOLTIP.to_string();
                control.visible = false;
            }
        }
        control
    }

    /// The six standard controls every template starts with, in control
    /// order.
    pub fn standard_controls() -> Vec<Control> {
        let mut file = Control::new(ControlType::Note, label::FILE, 1);
        file.copyable = false;
        file.tooltip = FILE_TOOLTIP.to_string();

        let mut relative_path = Control::new(ControlType::Note, label::RELATIVE_PATH, 2);
        relative_path.copyable = false;
        relative_path.tooltip = RELATIVE_PATH_TOOLTIP.to_string();

        let date_time = Control::new(ControlType::DateTime, label::DATE_TIME, 3);
        let utc_offset = Control::new(ControlType::UtcOffset, label::UTC_OFFSET, 4);

        let mut classification = Control::new(ControlType::FixedChoice, label::CLASSIFICATION, 5);
        classification.copyable = false;
        classification.default_value = FileClassification::Color.to_string();
        classification.tooltip = CLASSIFICATION_TOOLTIP.to_string();
        classification.well_known_values = FileClassification::WELL_KNOWN_VALUES.to_string();

        let mut delete_flag = Control::new(ControlType::Flag, label::DELETE_FLAG, 6);
        delete_flag.copyable = false;
        delete_flag.label = DELETE_FLAG_LABEL.to_string();
        delete_flag.tooltip = DELETE_FLAG_TOOLTIP.to_string();

        vec![file, relative_path, date_time, utc_offset, classification, delete_flag]
    }

    /// Sets the choice list.
    pub fn with_well_known_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_well_known_values(values);
        self
    }

    /// Sets the default value.
    pub fn with_default_value(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = default_value.into();
        self
    }

    /// Choices, split on the delimiter. Empty entries are dropped.
    pub fn get_well_known_values(&self) -> Vec<String> {
        self.well_known_values
            .split(WELL_KNOWN_VALUES_DELIMITER)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Replaces the choice list.
    pub fn set_well_known_values<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = values.into_iter().map(|value| value.as_ref().to_string()).collect();
        let joined = joined.join(&WELL_KNOWN_VALUES_DELIMITER.to_string());
        if joined != self.well_known_values {
            self.well_known_values = joined;
            self.has_changes = true;
        }
    }

    /// Whether the control was edited since it was loaded or last stored.
    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    /// Flags the control as needing to be written.
    pub fn mark_changed(&mut self) {
        self.has_changes = true;
    }

    /// Clears the change flag once the control has been written.
    pub fn accept_changes(&mut self) {
        self.has_changes = false;
    }

    /// `false` for the `Id` column and the standard controls.
    pub fn is_user_control(&self) -> bool {
        self.data_label != label::ID && !label::is_standard(&self.data_label)
    }

    /// `true` for the File and RelativePath controls.
    pub fn is_file_path_component(&self) -> bool {
        self.data_label.eq_ignore_ascii_case(label::FILE) || self.data_label.eq_ignore_ascii_case(label::RELATIVE_PATH)
    }

    /// Returns `true` if `value` is acceptable for this control.
    ///
    /// Counters take integers, flags the literals `true` and `false` in any
    /// case, fixed choices their default or one of their choices, date-times
    /// and offsets their database encodings. Notes and the file path
    /// components accept anything.
    pub fn is_valid_data(&self, value: &str) -> bool {
        if self.is_file_path_component() {
            return true;
        }
        match self.control_type {
            ControlType::Counter => value.parse::<i32>().is_ok(),
            ControlType::DateTime => time::parse_database_date_time(value).is_ok(),
            ControlType::FixedChoice => {
                value == self.default_value || self.get_well_known_values().iter().any(|choice| choice == value)
            }
            ControlType::Flag => value.eq_ignore_ascii_case(FLAG_TRUE) || value.eq_ignore_ascii_case(FLAG_FALSE),
            ControlType::Note => true,
            ControlType::UtcOffset => time::parse_database_utc_offset(value).is_ok(),
        }
    }

    /// Default value of a counter.
    pub fn default_counter_value(&self) -> i32 {
        self.default_value.parse().unwrap_or(0)
    }

    /// Default value of a flag.
    pub fn default_flag_value(&self) -> bool {
        parse_flag(&self.default_value).unwrap_or(false)
    }

    /// Default classification. Unparseable defaults fall back to Color.
    pub fn default_classification(&self) -> FileClassification {
        self.default_value.parse().unwrap_or_default()
    }

    /// Default date-time, combining a DateTime default with an offset.
    pub fn default_date_time(&self, offset: FixedOffset) -> DateTime<FixedOffset> {
        time::parse_database_date_time(&self.default_value)
            .map(|utc| utc.with_timezone(&offset))
            .unwrap_or_else(|_| time::default_date_time())
    }

    /// Copies every attribute of `other` which differs into this control.
    ///
    /// Returns `true` if anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DataLabelMismatch`] if the controls describe
    /// different fields.
    pub fn synchronize(&mut self, other: &Control) -> Result<bool> {
        if self.data_label != other.data_label {
            return Err(CoreError::DataLabelMismatch {
                this: self.data_label.clone(),
                other: other.data_label.clone(),
            });
        }

        let mut changed = false;
        macro_rules! sync_field {
            ($field:ident) => {
                if self.$field != other.$field {
                    self.$field = other.$field.clone();
                    changed = true;
                }
            };
        }
        sync_field!(analysis_label);
        sync_field!(copyable);
        sync_field!(control_order);
        sync_field!(default_value);
        sync_field!(index_in_file_table);
        sync_field!(label);
        sync_field!(well_known_values);
        sync_field!(max_width);
        sync_field!(spreadsheet_order);
        sync_field!(tooltip);
        sync_field!(visible);

        if changed {
            self.has_changes = true;
        }
        Ok(changed)
    }
}
