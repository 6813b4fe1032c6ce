//! Database encodings of date-times and UTC offsets.
//!
//! A file's time is persisted as two columns: the UTC instant as text in
//! [`DATE_TIME_DATABASE_FORMAT`] and the offset of the local time zone as a
//! real number of hours. SQLite has no type able to hold a negative or large
//! time of day, so offsets are not stored as durations.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

use crate::error::{CoreError, Result};

/// `strftime` pattern of UTC instants in the `Files` table.
pub const DATE_TIME_DATABASE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Largest UTC offset in use, in hours.
pub const MAXIMUM_UTC_OFFSET_HOURS: f64 = 14.0;

/// Smallest UTC offset in use, in hours.
pub const MINIMUM_UTC_OFFSET_HOURS: f64 = -12.0;

/// Time zone offsets are whole multiples of this many minutes.
pub const UTC_OFFSET_GRANULARITY_MINUTES: i32 = 15;

/// Date-time given to files before their actual time is known.
///
/// Also the lower bound of a custom selection's date range.
pub fn default_date_time() -> DateTime<FixedOffset> {
    NaiveDate::from_ymd_opt(1905, 6, 30)
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .map(|naive| Utc.fix().from_utc_datetime(&naive))
        .unwrap_or_default()
}

/// Formats a UTC instant for storage.
///
/// # Examples
///
/// ```
/// use carnassial_core::time::{parse_database_date_time, to_database_date_time_string};
///
/// let instant = parse_database_date_time("2016-02-29T23:59:58.125Z").unwrap();
/// assert_eq!(to_database_date_time_string(&instant), "2016-02-29T23:59:58.125Z");
/// ```
pub fn to_database_date_time_string<Tz: TimeZone>(date_time: &DateTime<Tz>) -> String {
    date_time
        .with_timezone(&Utc)
        .format(DATE_TIME_DATABASE_FORMAT)
        .to_string()
}

/// Parses a UTC instant in the storage format.
///
/// The fractional seconds are optional so values written by older versions
/// still load.
pub fn parse_database_date_time(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M:%S%.fZ")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| CoreError::InvalidTime {
            kind: "date time",
            value: value.to_string(),
        })
}

/// Offset in hours, the form stored in the `UtcOffset` column.
pub fn utc_offset_to_hours(offset: FixedOffset) -> f64 {
    f64::from(offset.local_minus_utc()) / 3600.0
}

/// Converts a stored hour count back to an offset.
///
/// # Errors
///
/// Returns [`CoreError::InvalidTime`] if the offset is outside
/// [-12, +14] hours or is not a whole number of quarter hours.
pub fn utc_offset_from_hours(hours: f64) -> Result<FixedOffset> {
    let invalid = || CoreError::InvalidTime {
        kind: "UTC offset",
        value: hours.to_string(),
    };
    if !hours.is_finite() || !(MINIMUM_UTC_OFFSET_HOURS..=MAXIMUM_UTC_OFFSET_HOURS).contains(&hours) {
        return Err(invalid());
    }
    let minutes = (hours * 60.0).round();
    if (hours * 60.0 - minutes).abs() > 1e-6 {
        return Err(invalid());
    }
    let minutes = minutes as i32;
    if minutes % UTC_OFFSET_GRANULARITY_MINUTES != 0 {
        return Err(invalid());
    }
    FixedOffset::east_opt(minutes * 60).ok_or_else(invalid)
}

/// Formats an offset the way the control schema stores offset defaults.
pub fn to_database_utc_offset_string(offset: FixedOffset) -> String {
    format!("{:.2}", utc_offset_to_hours(offset))
}

/// Parses an offset default or search value in hours.
pub fn parse_database_utc_offset(value: &str) -> Result<FixedOffset> {
    let hours: f64 = value.trim().parse().map_err(|_| CoreError::InvalidTime {
        kind: "UTC offset",
        value: value.to_string(),
    })?;
    utc_offset_from_hours(hours)
}

/// Returns `true` if `offset` is one the store accepts.
pub fn is_valid_utc_offset(offset: FixedOffset) -> bool {
    utc_offset_from_hours(utc_offset_to_hours(offset)).is_ok()
}

/// Swaps the day and month of a date-time, keeping its time of day and
/// offset.
///
/// Returns `None` when the day cannot be a month or the swapped date does
/// not exist.
///
/// # Examples
///
/// ```
/// use carnassial_core::time::try_swap_day_month;
/// use chrono::{FixedOffset, TimeZone};
///
/// let offset = FixedOffset::east_opt(3600).unwrap();
/// let taken = offset.with_ymd_and_hms(2017, 3, 11, 8, 30, 0).unwrap();
/// let swapped = try_swap_day_month(&taken).unwrap();
/// assert_eq!(swapped, offset.with_ymd_and_hms(2017, 11, 3, 8, 30, 0).unwrap());
///
/// let late = offset.with_ymd_and_hms(2017, 3, 13, 8, 30, 0).unwrap();
/// assert!(try_swap_day_month(&late).is_none());
/// ```
pub fn try_swap_day_month(date_time: &DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    if date_time.day() > 12 {
        return None;
    }
    let local = date_time.naive_local();
    let swapped = NaiveDate::from_ymd_opt(local.year(), local.day(), local.month())?.and_time(local.time());
    date_time.offset().from_local_datetime(&swapped).single()
}
