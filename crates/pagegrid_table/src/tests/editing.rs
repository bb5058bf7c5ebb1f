use super::*;
use crate::TableError;
use pagegrid_core::validation::Severity;

#[test]
fn setting_the_original_value_back_clears_the_edit() {
    let mut harness = loaded_table(10, config(10));

    assert_eq!(harness.table.set_value(0, "name", "Bob"), Ok(true));
    assert!(harness.table.tracker().has_modifications());
    let cell = harness.table.cell(0, "name").expect("cell");
    assert!(cell.modified);
    assert_eq!(cell.text(), "Bob");

    assert_eq!(harness.table.set_value(0, "name", "Bob"), Ok(false));
    assert_eq!(harness.table.set_value(0, "name", "row 0"), Ok(true));
    assert!(!harness.table.tracker().has_modifications());
    assert!(harness
        .drain_events()
        .contains(&TableEvent::RowsChanged(vec![0])));
}

#[test]
fn edits_are_rejected_on_loading_and_missing_rows() {
    let mut harness = loaded_table(100, config(10));

    let loading = harness.table.get_bean(40).map(|proxy| proxy.is_dummy());
    assert_eq!(loading, Some(true));
    assert!(harness.table.cell(40, "name").expect("cell").is_loading());
    assert_eq!(
        harness.table.set_value(40, "name", "x"),
        Err(TableError::NotEditable(40))
    );
    assert_eq!(
        harness.table.set_value(100, "name", "x"),
        Err(TableError::RowOutOfRange {
            row: 100,
            row_count: 100
        })
    );
}

#[test]
fn undo_parks_every_edit_until_redo_or_a_new_edit() {
    let mut harness = loaded_table(10, config(10));
    harness.table.set_value(2, "name", "A").expect("edit name");
    harness.table.set_value(2, "n", 42i64).expect("edit n");

    assert_eq!(harness.table.undo(2), Ok(true));
    assert_eq!(harness.name(2).as_deref(), Some("row 2"));
    assert!(!harness.table.tracker().has_modifications());

    assert_eq!(harness.table.redo(2), Ok(true));
    assert_eq!(harness.name(2).as_deref(), Some("A"));
    let n = harness
        .table
        .get_bean(2)
        .and_then(|proxy| proxy.value("n"))
        .and_then(Value::as_int);
    assert_eq!(n, Some(42));

    assert_eq!(harness.table.undo(2), Ok(true));
    harness.table.set_value(2, "name", "B").expect("edit name");
    assert_eq!(harness.table.redo(2), Ok(false));
    assert_eq!(harness.name(2).as_deref(), Some("B"));
}

#[test]
fn editing_the_new_row_editor_appends_a_bean() {
    let mut harness = loaded_table(5, config(10).with_last_row_dummy(true));
    assert_eq!(harness.table.row_count(), 6);
    let editor = harness.table.get_bean(5).map(|proxy| proxy.is_last_row_dummy());
    assert_eq!(editor, Some(true));
    assert!(harness.table.tracker().to_create().is_empty());

    assert_eq!(harness.table.set_value(5, "name", "new"), Ok(true));

    assert_eq!(harness.table.row_count(), 7);
    assert_eq!(harness.table.tracker().to_create().len(), 1);
    let promoted = harness
        .table
        .get_bean(5)
        .map(|proxy| (proxy.is_transient(), proxy.is_last_row_dummy()));
    assert_eq!(promoted, Some((true, false)));
    let next = harness.table.get_bean(6).map(|proxy| proxy.is_last_row_dummy());
    assert_eq!(next, Some(true));
    assert!(harness
        .drain_events()
        .contains(&TableEvent::BeansAdded(vec![6])));
}

#[test]
fn failing_validation_marks_the_cell() {
    let mut harness = loaded_table(10, config(10));

    harness.table.set_value(0, "name", "").expect("edit");
    let cell = harness.table.cell(0, "name").expect("cell");
    assert_eq!(cell.severity, Severity::Error);
    assert_eq!(cell.tooltip.as_deref(), Some("name required"));
    assert_eq!(
        harness.table.tracker().worst_validation().severity(),
        Severity::Error
    );

    harness.table.set_value(0, "name", "fixed").expect("edit");
    let cell = harness.table.cell(0, "name").expect("cell");
    assert_eq!(cell.severity, Severity::Ok);
    assert_eq!(cell.tooltip, None);
}

#[test]
fn added_beans_follow_the_paged_rows() {
    let mut harness = loaded_table(100, config(25));

    let row = harness.table.add_bean();
    assert_eq!(row, 100);
    assert_eq!(harness.table.row_count(), 101);
    let transient = harness.table.get_bean(100).map(|proxy| proxy.is_transient());
    assert_eq!(transient, Some(true));
    let cell = harness.table.cell(100, "name").expect("cell");
    assert_eq!(cell.severity, Severity::Error);

    assert_eq!(harness.table.set_value(100, "name", "fresh"), Ok(true));
    assert_eq!(harness.table.tracker().to_create().len(), 1);
}

#[test]
fn pending_edits_survive_a_reload() {
    let mut harness = loaded_table(10, config(10));
    harness.table.set_value(3, "name", "kept").expect("edit");
    let edited = harness.table.get_bean(3).map(|proxy| proxy.id());
    let untouched = harness.table.get_bean(4).map(|proxy| proxy.id());

    harness.table.load();
    harness.settle();

    assert_eq!(harness.table.get_bean(3).map(|proxy| proxy.id()), edited);
    assert_eq!(harness.name(3).as_deref(), Some("kept"));
    assert_ne!(harness.table.get_bean(4).map(|proxy| proxy.id()), untouched);
    assert!(harness.table.tracker().has_modifications());
}
