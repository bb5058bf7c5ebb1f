use super::*;
use crate::TableError;
use pagegrid_core::config::SavePolicy;
use pagegrid_core::error::ServiceError;
use pagegrid_core::memory::{ServiceCall, ServiceOp};
use pagegrid_core::proxy::{MessageKind, RowProxy};
use pagegrid_core::validation::Severity;

fn read_only_table(rows: usize) -> TestHarness {
    let mut harness = make_table_with(
        MemoryService::new(records(rows)),
        |service| ServiceSet::read_only(service),
        config(10),
    );
    harness.table.load();
    harness.settle();
    harness
}

fn service_name(harness: &TestHarness, index: usize) -> Option<String> {
    let id = record_id(index);
    harness
        .service
        .records()
        .into_iter()
        .find(|record| record.id.as_ref() == Some(&id))
        .and_then(|record| record.value("name").and_then(Value::as_text).map(ToString::to_string))
}

#[test]
fn save_without_an_updater_starts_nothing() {
    let mut harness = read_only_table(10);
    harness.table.set_value(0, "name", "A").expect("edit");

    assert_eq!(
        harness.table.save(),
        Err(TableError::MissingService("updater"))
    );
    let busy = harness.table.get_bean(0).map(|proxy| proxy.has_execution());
    assert_eq!(busy, Some(false));
    assert_eq!(harness.runner.pending(), 0);
}

#[test]
fn batch_save_sends_creates_and_updates() {
    let mut harness = loaded_table(10, config(10).with_save_policy(SavePolicy::Batch));
    harness.table.set_value(0, "name", "A").expect("edit");
    let row = harness.table.add_bean();
    harness.table.set_value(row, "name", "fresh").expect("edit");

    assert_eq!(harness.table.save(), Ok(2));
    assert_eq!(
        harness.table.set_value(0, "name", "B"),
        Err(TableError::RowBusy(0))
    );
    assert!(!harness.table.cell(0, "name").expect("cell").editable);

    harness.settle();
    assert!(!harness.table.tracker().has_modifications());
    assert!(!harness.table.tracker().has_executions());
    assert_eq!(harness.service.len(), 11);
    assert_eq!(service_name(&harness, 0).as_deref(), Some("A"));
    let saved = harness
        .table
        .get_bean(row)
        .map(|proxy| (proxy.is_persisted(), proxy.version()));
    assert_eq!(saved, Some((true, 1)));
    assert_eq!(harness.table.get_bean(0).map(|proxy| proxy.version()), Some(2));
}

#[test]
fn per_bean_policy_sends_one_request_per_bean() {
    let mut harness = loaded_table(10, config(10).with_save_policy(SavePolicy::PerBean));
    for row in 0..3 {
        harness.table.set_value(row, "name", "edited").expect("edit");
    }

    assert_eq!(harness.table.save(), Ok(3));
    harness.settle();

    let single_updates = harness
        .service
        .calls()
        .iter()
        .filter(|call| matches!(call, ServiceCall::Update { beans: 1 }))
        .count();
    assert_eq!(single_updates, 3);
    assert!(!harness.table.tracker().has_modifications());
}

#[test]
fn failed_save_keeps_edits_and_reports_on_the_row() {
    let mut harness = loaded_table(10, config(10));
    harness.service.fail_next(
        ServiceOp::Update,
        ServiceError::StaleBean {
            id: "r000".to_string(),
        },
    );
    harness.table.set_value(0, "name", "A").expect("edit");

    harness.table.save().expect("save");
    harness.settle();

    let cell = harness.table.cell(0, "name").expect("cell");
    assert!(cell.modified);
    assert!(cell.editable);
    assert_eq!(cell.severity, Severity::Error);
    let expected = ServiceError::StaleBean {
        id: "r000".to_string(),
    }
    .user_message();
    assert_eq!(cell.tooltip.as_deref(), Some(expected.as_str()));
    assert_eq!(service_name(&harness, 0).as_deref(), Some("row 0"));

    harness.table.save().expect("retry");
    harness.settle();
    let cell = harness.table.cell(0, "name").expect("cell");
    assert!(!cell.modified);
    assert_eq!(cell.severity, Severity::Ok);
    assert_eq!(service_name(&harness, 0).as_deref(), Some("A"));
}

#[test]
fn cancelling_a_save_leaves_the_edit_pending() {
    let mut harness = loaded_table(10, config(10));
    harness.table.set_value(0, "name", "A").expect("edit");
    harness.table.save().expect("save");

    assert!(harness.table.cancel_row(0));
    harness.settle();

    let proxy = harness.table.get_bean(0).expect("row 0");
    assert!(!proxy.has_execution());
    assert!(proxy.has_modifications());
    assert_eq!(service_name(&harness, 0).as_deref(), Some("row 0"));
}

#[test]
fn cancelling_the_save_handle_leaves_the_edit_pending() {
    let mut harness = loaded_table(10, config(10));
    harness.table.set_value(0, "name", "A").expect("edit");
    harness.table.save().expect("save");
    let handle = harness
        .table
        .get_bean(0)
        .and_then(RowProxy::execution)
        .cloned()
        .expect("save handle");

    handle.cancel();
    harness.settle();

    assert!(harness.table.is_idle());
    let proxy = harness.table.get_bean(0).expect("row 0");
    assert!(!proxy.has_execution());
    assert!(proxy.has_modifications());
    assert_eq!(service_name(&harness, 0).as_deref(), Some("row 0"));
}

#[test]
fn refreshing_a_bean_reapplies_pending_edits() {
    let mut harness = loaded_table(10, config(10));
    harness.table.set_value(0, "name", "local").expect("edit");
    harness
        .service
        .set_value(&record_id(0), "n", Value::from(500i64));

    assert_eq!(harness.table.refresh_beans(&[0]), Ok(1));
    harness.settle();

    let proxy = harness.table.get_bean(0).expect("row 0");
    assert_eq!(proxy.version(), 2);
    assert_eq!(proxy.value("n"), Some(&Value::from(500i64)));
    assert_eq!(proxy.value("name"), Some(&Value::from("local")));
    assert!(!proxy.has_execution());
}

#[test]
fn refreshing_a_deleted_record_warns() {
    let mut harness = loaded_table(10, config(10));
    harness.service.remove(&record_id(1));

    assert_eq!(harness.table.refresh_beans(&[1]), Ok(1));
    harness.settle();

    let proxy = harness.table.get_bean(1).expect("row 1");
    let kinds: Vec<MessageKind> = proxy.messages().iter().map(|message| message.kind).collect();
    assert_eq!(kinds, vec![MessageKind::Warning]);
    let cell = harness.table.cell(1, "name").expect("cell");
    assert_eq!(cell.severity, Severity::Warning);
}

#[test]
fn refresh_and_delete_need_their_services() {
    let mut harness = read_only_table(10);
    assert_eq!(
        harness.table.refresh_beans(&[0]),
        Err(TableError::MissingService("refresh"))
    );
    assert_eq!(
        harness.table.delete_rows(&[0]),
        Err(TableError::MissingService("deleter"))
    );
    assert_eq!(harness.table.row_count(), 10);
}

#[test]
fn deleting_an_unsaved_bean_stays_local() {
    let mut harness = loaded_table(10, config(10));
    let row = harness.table.add_bean();
    harness.drain_events();

    assert_eq!(harness.table.delete_rows(&[row]), Ok(1));

    assert_eq!(harness.table.row_count(), 10);
    assert_eq!(harness.runner.pending(), 0);
    assert!(harness
        .drain_events()
        .contains(&TableEvent::BeansRemoved(vec![10])));
}

#[test]
fn deleting_persisted_beans_reloads_the_table() {
    let mut harness = loaded_table(10, config(10));

    assert_eq!(harness.table.delete_rows(&[0]), Ok(1));
    let busy = harness.table.get_bean(0).map(|proxy| proxy.has_execution());
    assert_eq!(busy, Some(true));
    harness.settle();

    assert_eq!(harness.service.len(), 9);
    assert_eq!(harness.table.row_count(), 9);
    assert_eq!(harness.name(0).as_deref(), Some("row 1"));
    assert!(harness
        .drain_events()
        .contains(&TableEvent::BeansRemoved(vec![0])));
}

#[test]
fn failed_delete_keeps_the_row_with_an_error() {
    let mut harness = loaded_table(10, config(10));
    harness.service.fail_next(
        ServiceOp::Delete,
        ServiceError::ConstraintViolation("in use".to_string()),
    );

    harness.table.delete_rows(&[0]).expect("delete");
    harness.settle();

    assert_eq!(harness.table.row_count(), 10);
    let proxy = harness.table.get_bean(0).expect("row 0");
    assert!(!proxy.has_execution());
    let texts: Vec<&str> = proxy
        .messages()
        .iter()
        .map(|message| message.text.as_str())
        .collect();
    assert_eq!(texts, vec!["Constraint violated: in use"]);
}
