//! Time-stamped backups of database files.
//!
//! Backups are copies written to a folder beside the database, named
//! `<stem>.<local timestamp>.<extension>` with the `:` of the timestamp's
//! offset replaced by `_`. Only the newest copies are kept.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use carnassial_config::BackupConfig;
use chrono::{DateTime, Local};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Result, SqliteError};

/// Format of the timestamp in a backup's file name, before `:` replacement.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f%:z";

/// Folder backups of `source` are written to.
pub fn backup_folder(source: &Path, folder_name: &str) -> PathBuf {
    source
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(folder_name)
}

/// Name of a backup of `source` taken at `now`.
///
/// ```
/// use std::path::Path;
///
/// use carnassial_sqlite::backup_file_name;
/// use chrono::{FixedOffset, TimeZone};
///
/// let now = FixedOffset::west_opt(8 * 3600).unwrap().with_ymd_and_hms(2018, 3, 4, 5, 6, 7).unwrap();
/// assert_eq!(
///     backup_file_name(Path::new("Station1.ddb"), &now),
///     "Station1.2018-03-04T05-06-07.000-08_00.ddb"
/// );
/// ```
pub fn backup_file_name<Tz>(source: &Path, now: &DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let timestamp = now.format(BACKUP_TIMESTAMP_FORMAT).to_string().replace(':', "_");
    name_with_timestamp(source, &timestamp)
}

fn name_with_timestamp(source: &Path, timestamp: &str) -> String {
    let stem = source.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default();
    match source.extension().and_then(|extension| extension.to_str()) {
        Some(extension) => format!("{stem}.{timestamp}.{extension}"),
        None => format!("{stem}.{timestamp}"),
    }
}

/// Matches the names of backups of `source`, capturing the timestamp.
fn backup_name_pattern(source: &Path) -> Result<Regex> {
    let stem = source.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default();
    let extension = source
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| format!(r"\.{}", regex::escape(extension)))
        .unwrap_or_default();
    let pattern = format!(
        r"^{}\.(\d{{4}}-\d{{2}}-\d{{2}}T\d{{2}}-\d{{2}}-\d{{2}}\.\d{{3}}[+-]\d{{2}}_\d{{2}}){extension}$",
        regex::escape(stem)
    );
    Regex::new(&pattern)
        .map_err(|e| SqliteError::InvalidArgument(format!("no backup name pattern for {}: {e}", source.display())))
}

/// Backups of `source` in `folder`, newest first.
///
/// Only names of the form [`backup_file_name`] produces count; files of
/// another database whose stem starts with this one's are not backups.
pub fn get_backup_files(folder: &Path, source: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Ok(Vec::new());
    }
    let pattern = backup_name_pattern(source)?;

    let mut backups = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if pattern.is_match(name) {
            let modified = entry.metadata()?.modified()?;
            backups.push((modified, entry.path()));
        }
    }
    backups.sort_by(|a, b| b.cmp(a));
    Ok(backups.into_iter().map(|(_, path)| path).collect())
}

/// Copies `source` into its backup folder and prunes old backups.
///
/// Returns the backup's path, or `None` if `source` does not exist or
/// backups are disabled.
pub fn create_backup(source: &Path, config: &BackupConfig) -> Result<Option<PathBuf>> {
    if config.backups_to_keep == 0 || !source.is_file() {
        return Ok(None);
    }
    let folder = backup_folder(source, &config.folder_name);
    fs::create_dir_all(&folder)?;
    let destination = folder.join(backup_file_name(source, &Local::now()));
    fs::copy(source, &destination)?;
    info!(source = %source.display(), backup = %destination.display(), "created backup");

    for stale in get_backup_files(&folder, source)?.into_iter().skip(config.backups_to_keep) {
        if let Err(e) = fs::remove_file(&stale) {
            warn!(backup = %stale.display(), error = %e, "failed to remove old backup");
        }
    }
    Ok(Some(destination))
}

/// Renames the backups of `source` in `folder` to backups of `renamed`,
/// keeping their timestamps.
///
/// Returns the number of backups renamed.
pub fn rename_backups(folder: &Path, source: &Path, renamed: &Path) -> Result<usize> {
    let pattern = backup_name_pattern(source)?;
    let mut count = 0;
    for backup in get_backup_files(folder, source)? {
        let timestamp = backup
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| pattern.captures(name))
            .and_then(|captures| captures.get(1))
            .map(|timestamp| timestamp.as_str().to_string());
        let Some(timestamp) = timestamp else {
            continue;
        };
        fs::rename(&backup, folder.join(name_with_timestamp(renamed, &timestamp)))?;
        count += 1;
    }
    if count > 0 {
        debug!(from = %source.display(), to = %renamed.display(), count, "renamed backups");
    }
    Ok(count)
}

/// Gates backups of one database by the configured interval.
#[derive(Debug, Clone)]
pub struct BackupSchedule {
    config: BackupConfig,
    most_recent_backup: Option<SystemTime>,
}

impl BackupSchedule {
    /// Creates a schedule for `source`, taking the newest existing backup as
    /// the most recent one.
    pub fn new(source: &Path, config: BackupConfig) -> Result<Self> {
        let folder = backup_folder(source, &config.folder_name);
        let most_recent_backup = match get_backup_files(&folder, source)?.first() {
            Some(newest) => Some(fs::metadata(newest)?.modified()?),
            None => None,
        };
        Ok(Self {
            config,
            most_recent_backup,
        })
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn most_recent_backup(&self) -> Option<SystemTime> {
        self.most_recent_backup
    }

    /// Whether the interval has passed since the last backup.
    pub fn is_due(&self, now: SystemTime) -> bool {
        match self.most_recent_backup {
            Some(last) => now.duration_since(last).unwrap_or(Duration::ZERO) >= self.config.interval(),
            None => true,
        }
    }

    /// Backs `source` up if the interval has passed.
    pub fn create_backup_if_needed(&mut self, source: &Path) -> Result<Option<PathBuf>> {
        let now = SystemTime::now();
        if !self.is_due(now) {
            debug!(source = %source.display(), "backup not due");
            return Ok(None);
        }
        let backup = create_backup(source, &self.config)?;
        if backup.is_some() {
            self.most_recent_backup = Some(now);
        }
        Ok(backup)
    }
}
