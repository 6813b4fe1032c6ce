//! Integration tests for the carnassial-sqlite crate.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use carnassial_config::StoreConfig;
use carnassial_core::{
    ComparisonOperator, Control, ControlType, FileClassification, FileSelection, LogicalOperator, Marker,
    MarkersForCounter, Point,
};
use carnassial_sqlite::{
    DisplayOrder, FileDatabase, FileFindReplace, FileRow, INVALID_ID, SchemaVersion, SqliteError, TemplateDatabase,
    backup_folder, generate_file_index_sql, generate_files_table_sql, get_backup_files, get_user_version,
};
use chrono::{FixedOffset, TimeDelta, TimeZone};
use rusqlite::Connection;

/// Template with a counter, flag, note and a Deer/Bear/Wolf choice.
fn wildlife_template(config: StoreConfig) -> TemplateDatabase {
    let mut template = TemplateDatabase::open_in_memory(config).unwrap();
    template.add_user_defined_control(ControlType::Counter).unwrap();
    template.add_user_defined_control(ControlType::Flag).unwrap();
    template.add_user_defined_control(ControlType::Note).unwrap();
    template.add_user_defined_control(ControlType::FixedChoice).unwrap();
    set_choices(&mut template, &["Deer", "Bear", "Wolf"]);
    template
}

fn set_choices(template: &mut TemplateDatabase, choices: &[&str]) {
    template
        .controls_mut()
        .find_mut("FixedChoice0")
        .unwrap()
        .set_well_known_values(choices);
    template.sync_control_to_database("FixedChoice0").unwrap();
}

fn add_named_files(database: &mut FileDatabase, names: &[&str]) -> usize {
    let mut files: Vec<Option<FileRow>> = names
        .iter()
        .map(|name| Some(database.new_file(*name, "").unwrap()))
        .collect();
    database.add_files(&mut files).unwrap()
}

// =============================================================================
// Selection Tests
// =============================================================================

#[test]
fn test_custom_selection_counter_greater_than() {
    let mut template = TemplateDatabase::open_in_memory(StoreConfig::default()).unwrap();
    template.add_user_defined_control(ControlType::Counter).unwrap();
    template.controls_mut().find_mut("Counter0").unwrap().data_label = "Animals".to_string();
    template.controls_mut().find_mut("Animals").unwrap().mark_changed();
    assert!(template.sync_control_to_database("Animals").unwrap());

    let mut database = FileDatabase::create_in_memory(&template).unwrap();
    add_named_files(&mut database, &["a.jpg", "b.jpg", "c.jpg"]);
    database.select_files(FileSelection::All).unwrap();
    for (index, count) in [(0, 2), (1, 4), (2, 9)] {
        database.files_mut().get_mut(index).unwrap().set_counter("Animals", count).unwrap();
        database.try_sync_file_to_database(index).unwrap();
    }

    let selection = database.custom_selection_mut();
    selection.set_term_combiner(LogicalOperator::And);
    let animals = selection.find_term_mut("Animals").unwrap();
    animals.operator = ComparisonOperator::GreaterThan;
    animals.database_value = "3".to_string();
    animals.use_for_searching = true;
    assert_eq!(database.custom_selection().create_where().unwrap().as_deref(), Some("\"Animals\" > 3"));

    database.select_files(FileSelection::Custom).unwrap();
    let names: Vec<&str> = database.files().iter().map(FileRow::file_name).collect();
    assert_eq!(names, ["b.jpg", "c.jpg"]);
}

#[test]
fn test_files_ordered_by_date_time() {
    let template = TemplateDatabase::open_in_memory(StoreConfig::default()).unwrap();
    let mut database = FileDatabase::create_in_memory(&template).unwrap();
    add_named_files(&mut database, &["late.jpg", "early.jpg"]);
    database.select_files(FileSelection::All).unwrap();
    let utc = FixedOffset::east_opt(0).unwrap();
    database
        .files_mut()
        .get_mut(0)
        .unwrap()
        .set_date_time(utc.with_ymd_and_hms(2020, 6, 2, 0, 0, 0).unwrap())
        .unwrap();
    database
        .files_mut()
        .get_mut(1)
        .unwrap()
        .set_date_time(utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap())
        .unwrap();
    database.try_sync_file_to_database(0).unwrap();
    database.try_sync_file_to_database(1).unwrap();

    database.set_order_files_by_date_time(true);
    database.select_files(FileSelection::All).unwrap();
    let names: Vec<&str> = database.files().iter().map(FileRow::file_name).collect();
    assert_eq!(names, ["early.jpg", "late.jpg"]);
}

// =============================================================================
// Transaction Window Tests
// =============================================================================

#[test]
fn test_bulk_add_commits_per_window() {
    let template = TemplateDatabase::open_in_memory(StoreConfig::default().with_rows_per_transaction(1000)).unwrap();
    let mut database = FileDatabase::create_in_memory(&template).unwrap();

    let mut files: Vec<Option<FileRow>> = (0..2500)
        .map(|index| Some(database.new_file(format!("IMG_{index:04}.JPG"), "Station1").unwrap()))
        .collect();
    {
        let mut insert = database.create_add_files_transaction().unwrap();
        assert_eq!(insert.add_files(&mut files, 0, 2500).unwrap(), 2500);
        assert_eq!(insert.commits(), 3);
        assert_eq!(insert.rows_committed(), 2500);
    }
    assert!(files.iter().flatten().all(|file| file.id() > 0 && !file.has_changes()));

    database.select_files(FileSelection::All).unwrap();
    assert_eq!(database.files().len(), 2500);
    assert!(database.files().iter().all(|file| !file.has_changes()));
    assert_eq!(database.files().get(2499).unwrap().file_name(), "IMG_2499.JPG");
}

#[test]
fn test_failed_window_rolls_back_only_itself() {
    let template = TemplateDatabase::open_in_memory(StoreConfig::default().with_rows_per_transaction(10)).unwrap();
    let mut database = FileDatabase::create_in_memory(&template).unwrap();
    database
        .connection()
        .execute_batch(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON Files WHEN NEW.File = 'bad.jpg'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

    let mut files: Vec<Option<FileRow>> = (0..25)
        .map(|index| {
            let name = if index == 14 { "bad.jpg".to_string() } else { format!("{index}.jpg") };
            Some(database.new_file(name, "").unwrap())
        })
        .collect();
    let result = database.create_add_files_transaction().unwrap().add_files(&mut files, 0, 25);
    assert!(matches!(result, Err(SqliteError::DatabaseError(_))));

    let stored: i64 = database
        .connection()
        .query_row("SELECT COUNT(*) FROM Files", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, 10);
    for file in files[..10].iter().flatten() {
        assert!(file.id() > 0);
        assert!(!file.has_changes());
    }
    for file in files[10..14].iter().flatten() {
        assert_eq!(file.id(), INVALID_ID);
        assert!(file.has_changes());
    }
}

fn stored_counter(database: &FileDatabase, file_name: &str) -> i64 {
    database
        .connection()
        .query_row("SELECT Counter0 FROM Files WHERE File = ?1", [file_name], |row| row.get(0))
        .unwrap()
}

#[test]
fn test_column_update_skips_clean_rows_and_accepts_written_ones() {
    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_in_memory(&template).unwrap();
    add_named_files(&mut database, &["a.jpg", "b.jpg"]);
    database.select_files(FileSelection::All).unwrap();

    let mut files: Vec<FileRow> = database.files().iter().cloned().collect();
    files[1].set_note_or_choice("Note0", "lynx").unwrap();
    {
        let mut update = database.create_update_file_column_transaction("Note0").unwrap();
        assert_eq!(update.update_files(&mut files, 0, 2).unwrap(), 1);
    }
    assert!(files.iter().all(|file| !file.has_changes()));
    assert_eq!(database.get_distinct_values_in_file_column("Note0").unwrap(), ["", "lynx"]);
}

#[test]
fn test_rolled_back_owner_transaction_leaves_rows_dirty() {
    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_in_memory(&template).unwrap();
    add_named_files(&mut database, &["a.jpg", "b.jpg"]);
    database.select_files(FileSelection::All).unwrap();

    let mut files: Vec<FileRow> = database.files().iter().cloned().collect();
    files[0].set_counter("Counter0", 6).unwrap();
    {
        let tx = database.connection().unchecked_transaction().unwrap();
        let mut update = database.create_update_file_transaction().unwrap();
        assert_eq!(update.update_files(&mut files, 0, 2).unwrap(), 1);
        assert_eq!(update.commits(), 0);
        drop(update);
        tx.rollback().unwrap();
    }
    assert!(files[0].has_changes());
    assert_eq!(stored_counter(&database, "a.jpg"), 0);

    let mut update = database.create_update_file_transaction().unwrap();
    assert_eq!(update.update_files(&mut files, 0, 2).unwrap(), 1);
    drop(update);
    assert!(!files[0].has_changes());
    assert_eq!(stored_counter(&database, "a.jpg"), 6);
}

#[test]
fn test_pending_edits_survive_date_edits() {
    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_in_memory(&template).unwrap();
    add_named_files(&mut database, &["a.jpg", "b.jpg"]);
    database.select_files(FileSelection::All).unwrap();
    let offset = FixedOffset::east_opt(0).unwrap();
    for index in 0..2 {
        let file = database.files_mut().get_mut(index).unwrap();
        file.set_date_time(offset.with_ymd_and_hms(2019, 4, 6, 12, 0, 0).unwrap()).unwrap();
        database.try_sync_file_to_database(index).unwrap();
    }
    database.files_mut().get_mut(0).unwrap().set_counter("Counter0", 5).unwrap();

    assert_eq!(database.adjust_file_times(TimeDelta::minutes(30), 0..2).unwrap(), 2);
    assert!(database.files().get(0).unwrap().has_changes());
    assert!(!database.files().get(1).unwrap().has_changes());
    assert_eq!(database.exchange_day_and_month_in_file_dates(0..2).unwrap(), 2);
    assert!(database.files().get(0).unwrap().has_changes());
    assert_eq!(stored_counter(&database, "a.jpg"), 0);

    assert!(database.try_sync_file_to_database(0).unwrap());
    assert_eq!(stored_counter(&database, "a.jpg"), 5);
    database.select_files(FileSelection::All).unwrap();
    assert_eq!(
        database.files().get(0).unwrap().date_time(),
        offset.with_ymd_and_hms(2019, 6, 4, 12, 30, 0).unwrap()
    );
}

// =============================================================================
// Round-trip Tests
// =============================================================================

#[test]
fn test_typed_values_round_trip() {
    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_in_memory(&template).unwrap();

    let nepal = FixedOffset::east_opt(5 * 3600 + 45 * 60).unwrap();
    let taken = nepal.with_ymd_and_hms(2019, 6, 1, 9, 0, 0).unwrap();
    let mut file = database.new_file("IMG_0001.JPG", "Station1/2019").unwrap();
    file.set_counter("Counter0", 7).unwrap();
    file.set_flag("Flag0", true).unwrap();
    file.set_note_or_choice("Note0", "it's a fox").unwrap();
    file.set_note_or_choice("FixedChoice0", "Bear").unwrap();
    file.set_classification(FileClassification::Greyscale);
    file.set_delete_flag(true);
    file.set_date_time(taken).unwrap();
    database.add_files(&mut [Some(file)]).unwrap();

    database.select_files(FileSelection::All).unwrap();
    let loaded = database.files().get(0).unwrap();
    assert_eq!(loaded.relative_path(), "Station1/2019");
    assert_eq!(loaded.get_counter("Counter0").unwrap(), 7);
    assert!(loaded.get_flag("Flag0").unwrap());
    assert_eq!(loaded.get_note_or_choice("Note0").unwrap(), "it's a fox");
    assert_eq!(loaded.get_note_or_choice("FixedChoice0").unwrap(), "Bear");
    assert_eq!(loaded.classification(), FileClassification::Greyscale);
    assert!(loaded.delete_flag());
    assert_eq!(loaded.date_time(), taken);
    assert_eq!(loaded.utc_offset(), nepal);
    assert!(!loaded.has_changes());

    let (date_time, offset): (String, f64) = database
        .connection()
        .query_row("SELECT DateTime, UtcOffset FROM Files", [], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    assert_eq!(date_time, "2019-06-01T03:15:00.000Z");
    assert_eq!(offset, 5.75);
    assert_eq!(loaded.get_spreadsheet_string("Flag0").unwrap(), "1");
}

#[test]
fn test_marker_blob_round_trip() {
    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_in_memory(&template).unwrap();
    add_named_files(&mut database, &["IMG_0001.JPG"]);
    database.select_files(FileSelection::All).unwrap();

    let mut markers = MarkersForCounter::new("Counter0", 0);
    markers.add_marker(Marker::new("Counter0", Point::new(0.25, 0.50)));
    markers.add_marker(Marker::new("Counter0", Point::new(0.75, 0.10)));
    let packed = markers.to_packed_floats();
    assert_eq!(packed.len(), 16);

    database.files_mut().get_mut(0).unwrap().set_markers_for_counter(&markers).unwrap();
    assert!(database.try_sync_file_to_database(0).unwrap());

    let stored: Vec<u8> = database
        .connection()
        .query_row("SELECT Counter0Markers FROM Files", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, packed);

    database.select_files(FileSelection::All).unwrap();
    let loaded = database.files().get(0).unwrap().get_markers_for_counter("Counter0").unwrap();
    assert_eq!(loaded.count(), 2);
    assert_eq!(loaded.to_packed_floats(), packed);
    assert_eq!(
        database.files().get(0).unwrap().get_spreadsheet_string("Counter0Markers").unwrap(),
        "0.250000,0.500000|0.750000,0.100000"
    );
}

// =============================================================================
// Schema Tests
// =============================================================================

#[test]
fn test_schema_derivation_is_deterministic() {
    let mut controls = Control::standard_controls();
    controls.push(Control::new(ControlType::Counter, "Animals", 7));
    let mut species = Control::new(ControlType::FixedChoice, "Species", 8);
    species.index_in_file_table = true;
    controls.push(species);

    let mut shuffled = controls.clone();
    shuffled.reverse();
    assert_eq!(
        generate_files_table_sql(&controls).unwrap(),
        generate_files_table_sql(&shuffled).unwrap()
    );
    assert_eq!(generate_file_index_sql(&controls), generate_file_index_sql(&shuffled));
    assert_eq!(generate_file_index_sql(&controls).len(), 2);

    let sql = generate_files_table_sql(&controls).unwrap();
    assert!(sql.starts_with("CREATE TABLE \"Files\" (\"Id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"File\""));
    assert!(sql.find("\"Animals\"").unwrap() < sql.find("\"AnimalsMarkers\"").unwrap());
    assert!(sql.find("\"AnimalsMarkers\"").unwrap() < sql.find("\"Species\"").unwrap());
}

// =============================================================================
// Template Synchronization Tests
// =============================================================================

#[test]
fn test_added_choice_synchronizes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Station1.ddb");
    let mut template = wildlife_template(StoreConfig::default());
    set_choices(&mut template, &["Deer", "Bear"]);
    {
        let mut database = FileDatabase::create_or_open(&path, &template).unwrap();
        add_named_files(&mut database, &["a.jpg"]);
    }

    set_choices(&mut template, &["Deer", "Bear", "Wolf"]);
    template.add_user_defined_control(ControlType::Counter).unwrap();
    let database = FileDatabase::create_or_open(&path, &template).unwrap();
    assert!(database.control_synchronization_issues().is_empty());
    assert_eq!(
        database.controls().find("FixedChoice0").unwrap().get_well_known_values(),
        ["Deer", "Bear", "Wolf"]
    );
    assert!(database.controls().find("Counter1").is_some());
    assert!(database.get_file_column_names().contains(&"Counter1Markers".to_string()));

    let count: i64 = database
        .connection()
        .query_row("SELECT Counter1 FROM Files", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_removed_choice_in_use_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Station1.ddb");
    let mut template = wildlife_template(StoreConfig::default());
    {
        let mut database = FileDatabase::create_or_open(&path, &template).unwrap();
        add_named_files(&mut database, &["a.jpg", "b.jpg"]);
        database.select_files(FileSelection::All).unwrap();
        database.files_mut().get_mut(0).unwrap().set_note_or_choice("FixedChoice0", "Wolf").unwrap();
        database.try_sync_file_to_database(0).unwrap();
    }

    set_choices(&mut template, &["Deer", "Bear"]);
    let database = FileDatabase::create_or_open(&path, &template).unwrap();
    assert_eq!(database.control_synchronization_issues().len(), 1);
    assert!(database.control_synchronization_issues()[0].contains("'Wolf'"));
    assert_eq!(
        database.controls().find("FixedChoice0").unwrap().get_well_known_values(),
        ["Deer", "Bear", "Wolf"]
    );
}

#[test]
fn test_removed_field_and_type_change_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Station1.ddb");
    let mut template = wildlife_template(StoreConfig::default());
    drop(FileDatabase::create_or_open(&path, &template).unwrap());

    template.remove_user_defined_control("Note0").unwrap();
    template.controls_mut().find_mut("Flag0").unwrap().control_type = ControlType::Note;
    template.controls_mut().find_mut("Flag0").unwrap().mark_changed();
    template.sync_control_to_database("Flag0").unwrap();

    let database = FileDatabase::create_or_open(&path, &template).unwrap();
    let issues = database.control_synchronization_issues();
    assert_eq!(issues.len(), 2);
    assert!(issues.iter().any(|issue| issue.contains("Note0") && issue.contains("removed from the template")));
    assert!(issues.iter().any(|issue| issue.contains("Flag0") && issue.contains("'Flag'")));
    assert!(database.controls().find("Note0").is_some());
}

// =============================================================================
// Migration Tests
// =============================================================================

#[test]
fn test_legacy_file_database_is_upgraded_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Station1.ddb");
    let template = wildlife_template(StoreConfig::default());
    {
        let mut database = FileDatabase::create_or_open(&path, &template).unwrap();
        add_named_files(&mut database, &["a.jpg", "b.avi"]);
    }
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("ALTER TABLE Files RENAME TO FileData; PRAGMA user_version = 0;")
            .unwrap();
    }

    let mut database = FileDatabase::create_or_open(&path, &template).unwrap();
    assert_eq!(get_user_version(database.connection()).unwrap(), SchemaVersion::CURRENT);
    database.select_files(FileSelection::All).unwrap();
    assert_eq!(database.files().len(), 2);
    assert!(database.files().get(1).unwrap().is_video());
}

#[test]
fn test_open_without_files_table_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Station1.ddb");
    let template = wildlife_template(StoreConfig::default());
    drop(FileDatabase::create_or_open(&path, &template).unwrap());
    Connection::open(&path).unwrap().execute_batch("DROP TABLE Files").unwrap();

    assert!(matches!(
        FileDatabase::create_or_open(&path, &template),
        Err(SqliteError::SchemaError(_))
    ));
}

// =============================================================================
// Template Editing Tests
// =============================================================================

#[test]
fn test_template_edits_persist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Template.tdb");
    {
        let mut template = TemplateDatabase::create_or_open(&path, StoreConfig::default()).unwrap();
        template.add_user_defined_control(ControlType::Note).unwrap();
        template.add_user_defined_control(ControlType::Flag).unwrap();
        template.add_user_defined_control(ControlType::Counter).unwrap();
        template.remove_user_defined_control("Flag0").unwrap();

        let orders: HashMap<String, i64> = template
            .controls()
            .iter()
            .map(|control| {
                let order = match control.data_label.as_str() {
                    "Note0" => 8,
                    "Counter0" => 7,
                    _ => control.spreadsheet_order,
                };
                (control.data_label.clone(), order)
            })
            .collect();
        template.update_display_order(DisplayOrder::Spreadsheet, &orders).unwrap();
    }

    let template = TemplateDatabase::create_or_open(&path, StoreConfig::default()).unwrap();
    assert_eq!(template.controls().len(), 8);
    assert!(template.find_control("Flag0").is_none());
    assert_eq!(template.find_control("Counter0").unwrap().control_order, 8);
    let labels = template.get_data_labels_except_id_in_spreadsheet_order();
    assert_eq!(&labels[6..], ["Counter0", "Note0"]);
}

// =============================================================================
// File Operation Tests
// =============================================================================

#[test]
fn test_find_and_replace_all() {
    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_in_memory(&template).unwrap();
    add_named_files(&mut database, &["a.jpg", "b.jpg", "c.jpg"]);
    database.select_files(FileSelection::All).unwrap();
    for index in [0, 2] {
        database.files_mut().get_mut(index).unwrap().set_note_or_choice("Note0", "fox").unwrap();
        database.try_sync_file_to_database(index).unwrap();
    }

    let mut find_replace = FileFindReplace::new(database.controls().controls(), database.columns()).unwrap();
    let mut find = find_replace.create_term("Note0").unwrap();
    find.database_value = "fox".to_string();
    find_replace.set_find_term1(find).unwrap();
    let mut replace = find_replace.create_term("Note0").unwrap();
    replace.database_value = "coyote".to_string();
    find_replace.set_replace_term(Some(replace)).unwrap();

    assert_eq!(database.replace_all_in_files(&find_replace).unwrap(), 2);
    assert_eq!(database.get_distinct_values_in_file_column("Note0").unwrap(), ["", "coyote"]);
    assert_eq!(database.replace_all_in_files(&find_replace).unwrap(), 0);
}

#[test]
fn test_move_selected_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Station1.ddb");
    fs::write(dir.path().join("a.jpg"), b"a").unwrap();
    fs::write(dir.path().join("b.jpg"), b"b").unwrap();
    fs::create_dir_all(dir.path().join("Moved")).unwrap();
    fs::write(dir.path().join("Moved").join("b.jpg"), b"taken").unwrap();

    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_or_open(&path, &template).unwrap();
    add_named_files(&mut database, &["a.jpg", "b.jpg", "missing.jpg"]);
    database.select_files(FileSelection::All).unwrap();

    let immovable = database.move_selected_files_to_folder(&dir.path().join("Moved")).unwrap();
    assert_eq!(immovable, ["b.jpg", "missing.jpg"]);
    assert!(dir.path().join("Moved").join("a.jpg").is_file());
    assert!(!dir.path().join("a.jpg").exists());

    database.select_files(FileSelection::All).unwrap();
    let paths: Vec<&str> = database.files().iter().map(FileRow::relative_path).collect();
    assert_eq!(paths, ["Moved", "", ""]);

    assert!(database.move_selected_files_to_folder(&std::env::temp_dir().join("elsewhere")).is_err());
}

#[test]
fn test_pending_edits_survive_move() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Station1.ddb");
    fs::write(dir.path().join("a.jpg"), b"a").unwrap();
    fs::create_dir_all(dir.path().join("Moved")).unwrap();

    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_or_open(&path, &template).unwrap();
    add_named_files(&mut database, &["a.jpg"]);
    database.select_files(FileSelection::All).unwrap();
    database.files_mut().get_mut(0).unwrap().set_counter("Counter0", 3).unwrap();

    assert!(database.move_selected_files_to_folder(Path::new("Moved")).unwrap().is_empty());
    assert!(database.files().get(0).unwrap().has_changes());
    assert_eq!(stored_counter(&database, "a.jpg"), 0);
    assert!(database.try_sync_file_to_database(0).unwrap());
    assert_eq!(stored_counter(&database, "a.jpg"), 3);
}

#[test]
fn test_failed_move_puts_files_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Station1.ddb");
    fs::write(dir.path().join("a.jpg"), b"a").unwrap();
    fs::create_dir_all(dir.path().join("Moved")).unwrap();

    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_or_open(&path, &template).unwrap();
    add_named_files(&mut database, &["a.jpg"]);
    database.select_files(FileSelection::All).unwrap();
    database
        .connection()
        .execute_batch(
            "CREATE TRIGGER reject_move BEFORE UPDATE OF RelativePath ON Files
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

    assert!(database.move_selected_files_to_folder(Path::new("Moved")).is_err());
    assert!(dir.path().join("a.jpg").is_file());
    assert!(!dir.path().join("Moved").join("a.jpg").exists());
    let file = database.files().get(0).unwrap();
    assert_eq!(file.relative_path(), "");
    assert!(!file.has_changes());
}

#[test]
fn test_import_merges_files_from_a_subfolder() {
    let dir = tempfile::tempdir().unwrap();
    let template = wildlife_template(StoreConfig::default());
    let other_path = dir.path().join("Ridge").join("Ridge.ddb");
    fs::create_dir_all(other_path.parent().unwrap()).unwrap();
    {
        let mut other = FileDatabase::create_or_open(&other_path, &template).unwrap();
        let mut files: Vec<Option<FileRow>> = [("a.jpg", ""), ("x.jpg", "Night")]
            .iter()
            .map(|(name, folder)| Some(other.new_file(*name, *folder).unwrap()))
            .collect();
        other.add_files(&mut files).unwrap();
        other.select_files(FileSelection::All).unwrap();
        other.files_mut().get_mut(0).unwrap().set_counter("Counter0", 4).unwrap();
        other.files_mut().get_mut(1).unwrap().set_note_or_choice("FixedChoice0", "Wolf").unwrap();
        other.try_sync_file_to_database(0).unwrap();
        other.try_sync_file_to_database(1).unwrap();
    }

    let path = dir.path().join("Station1.ddb");
    let mut database = FileDatabase::create_or_open(&path, &template).unwrap();
    let mut files = vec![
        Some(database.new_file("A.JPG", "Ridge").unwrap()),
        Some(database.new_file("b.jpg", "").unwrap()),
    ];
    database.add_files(&mut files).unwrap();
    database.select_files(FileSelection::All).unwrap();

    let result = database.try_import_data(&other_path).unwrap();
    assert_eq!(result.files_added, 1);
    assert_eq!(result.files_updated, 1);
    assert_eq!(result.files_processed, 2);
    assert!(result.errors.is_empty());
    assert_eq!(database.files().len(), 3);
    assert!(database.files().iter().all(|file| !file.has_changes()));

    database.select_files(FileSelection::All).unwrap();
    let stored: Vec<(String, String, i32)> = database
        .files()
        .iter()
        .map(|file| {
            (
                file.relative_path().to_string(),
                file.file_name().to_string(),
                file.get_counter("Counter0").unwrap(),
            )
        })
        .collect();
    assert_eq!(
        stored,
        [
            ("Ridge".to_string(), "A.JPG".to_string(), 4),
            ("".to_string(), "b.jpg".to_string(), 0),
            ("Ridge/Night".to_string(), "x.jpg".to_string(), 0),
        ]
    );
    assert_eq!(database.files().get(2).unwrap().get_note_or_choice("FixedChoice0").unwrap(), "Wolf");

    let again = database.try_import_data(&other_path).unwrap();
    assert_eq!((again.files_added, again.files_updated, again.files_processed), (0, 0, 2));
}

#[test]
fn test_import_with_different_columns_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut other_template = wildlife_template(StoreConfig::default());
    other_template.add_user_defined_control(ControlType::Note).unwrap();
    let other_path = dir.path().join("Ridge").join("Ridge.ddb");
    fs::create_dir_all(other_path.parent().unwrap()).unwrap();
    {
        let mut other = FileDatabase::create_or_open(&other_path, &other_template).unwrap();
        add_named_files(&mut other, &["a.jpg"]);
    }

    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_or_open(dir.path().join("Station1.ddb"), &template).unwrap();
    database.select_files(FileSelection::All).unwrap();
    let result = database.try_import_data(&other_path).unwrap();
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("Note1"));
    assert_eq!(result.files_processed, 0);
    assert_eq!(database.get_file_count(FileSelection::All).unwrap(), Some(0));

    let outside = tempfile::tempdir().unwrap();
    let outside_path = outside.path().join("Elsewhere.ddb");
    FileDatabase::create_or_open(&outside_path, &template).unwrap();
    assert!(matches!(
        database.try_import_data(&outside_path),
        Err(SqliteError::InvalidArgument(_))
    ));

    database.select_files(FileSelection::Dark).unwrap();
    assert!(matches!(
        database.try_import_data(&other_path),
        Err(SqliteError::InvalidArgument(_))
    ));
}

#[test]
fn test_rename_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Station1.ddb");
    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_or_open(&path, &template).unwrap();
    add_named_files(&mut database, &["a.jpg"]);

    let renamed = database.rename_database_file("Ridge.ddb").unwrap();
    assert_eq!(database.path(), Some(renamed.as_path()));
    add_named_files(&mut database, &["b.jpg"]);
    assert_eq!(database.get_file_count(FileSelection::All).unwrap(), Some(2));
    drop(database);

    assert!(!path.exists());
    let folder = backup_folder(&renamed, "Backups");
    assert_eq!(get_backup_files(&folder, &renamed).unwrap().len(), 1);
    assert!(get_backup_files(&folder, &path).unwrap().is_empty());
    let reopened = FileDatabase::create_or_open(&renamed, &template).unwrap();
    assert_eq!(reopened.get_file_count(FileSelection::All).unwrap(), Some(2));
}

#[test]
fn test_delete_marked_files() {
    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_in_memory(&template).unwrap();
    add_named_files(&mut database, &["a.jpg", "b.jpg", "c.jpg"]);
    database.select_files(FileSelection::All).unwrap();
    database.files_mut().get_mut(1).unwrap().set_delete_flag(true);
    database.try_sync_file_to_database(1).unwrap();

    let marked = database.get_files_marked_for_deletion().unwrap();
    let ids: Vec<i64> = marked.iter().map(FileRow::id).collect();
    assert_eq!(database.delete_files(&ids).unwrap(), 1);

    database.select_files(FileSelection::All).unwrap();
    let names: Vec<&str> = database.files().iter().map(FileRow::file_name).collect();
    assert_eq!(names, ["a.jpg", "c.jpg"]);
}

// =============================================================================
// Backup Tests
// =============================================================================

#[test]
fn test_mutations_back_up_once_per_interval() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Station1.ddb");
    let template = wildlife_template(StoreConfig::default());
    let mut database = FileDatabase::create_or_open(&path, &template).unwrap();
    add_named_files(&mut database, &["a.jpg"]);
    add_named_files(&mut database, &["b.jpg"]);

    let folder = backup_folder(&path, "Backups");
    let backups = get_backup_files(&folder, &path).unwrap();
    assert_eq!(backups.len(), 1);
    let name = backups[0].file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("Station1.") && name.ends_with(".ddb"));
}
