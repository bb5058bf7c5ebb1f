use super::*;
use crate::CellDisplay;
use crate::TableError;
use pagegrid_core::error::ServiceError;
use pagegrid_core::memory::ServiceOp;
use pagegrid_core::model::{Filter, SortKey};
use pagegrid_core::proxy::RowProxy;
use std::time::Duration;

#[test]
fn initial_load_fetches_first_page_and_count() {
    let mut harness = make_table(100, config(25));
    harness.table.load();
    assert_eq!(harness.runner.pending(), 2);
    harness.settle();

    assert_eq!(harness.service.read_calls(), vec![(0, 27)]);
    assert_eq!(harness.table.counted_rows(), Some(100));
    assert_eq!(harness.table.row_count(), 100);
    assert_eq!(harness.table.loaded_pages(), vec![0]);
    assert_eq!(harness.name(0).as_deref(), Some("row 0"));
    assert_eq!(harness.name(24).as_deref(), Some("row 24"));
    assert!(harness.table.is_idle());
}

#[test]
fn interior_page_loads_once_while_pending() {
    let mut harness = loaded_table(100, config(25));
    harness.service.clear_calls();

    let placeholder = harness.table.get_bean(40).map(|proxy| (proxy.id(), proxy.is_dummy()));
    let (dummy, is_dummy) = placeholder.expect("placeholder");
    assert!(is_dummy);
    assert_eq!(harness.runner.delays(), vec![Duration::from_millis(80)]);

    let again = harness.table.get_bean(41).map(|proxy| proxy.id());
    assert_eq!(again, Some(dummy));
    assert_eq!(harness.runner.delayed_count(), 1);

    harness.settle();
    assert_eq!(harness.service.read_calls(), vec![(25, 27)]);
    assert_eq!(harness.name(40).as_deref(), Some("row 40"));
    assert_eq!(harness.name(41).as_deref(), Some("row 41"));
    assert!(harness.table.bean(dummy).is_none());
}

#[test]
fn requesting_a_page_twice_leaves_a_single_owner() {
    let mut harness = loaded_table(100, config(25));
    harness.service.clear_calls();

    let first = harness.table.load_page(2, None);
    let second = harness.table.load_page(2, None);
    assert_ne!(first, second);
    assert!(harness.table.bean(first).is_none());
    assert!(harness.table.bean(second).is_some());

    harness.settle();
    assert_eq!(harness.service.read_calls(), vec![(50, 27)]);
    assert_eq!(harness.name(50).as_deref(), Some("row 50"));
}

#[test]
fn edge_pages_skip_the_inner_page_delay() {
    let mut harness = loaded_table(100, config(25));

    harness.table.get_bean(99);
    assert_eq!(harness.runner.pending(), 1);
    assert_eq!(harness.runner.delayed_count(), 0);

    harness.settle();
    harness.table.load_page(3, Some(Duration::from_millis(30)));
    assert_eq!(harness.runner.delays(), vec![Duration::from_millis(30)]);
}

#[test]
fn short_interior_page_triggers_reload() {
    let mut harness = loaded_table(100, config(25));
    harness.service.truncate(30);

    harness.table.get_bean(60);
    harness.settle();

    assert_eq!(harness.table.row_count(), 30);
    assert_eq!(harness.table.counted_rows(), Some(30));
    assert_eq!(harness.table.loaded_pages(), vec![0]);
    assert_eq!(harness.name(24).as_deref(), Some("row 24"));
}

#[test]
fn short_last_page_corrects_a_stale_count() {
    let mut harness = loaded_table(100, config(25));
    harness.service.truncate(90);

    harness.table.get_bean(99);
    harness.settle();

    assert_eq!(harness.table.row_count(), 90);
    assert_eq!(harness.table.counted_rows(), Some(90));
    assert_eq!(harness.name(89).as_deref(), Some("row 89"));
    assert!(harness.table.get_bean(90).is_none());
}

#[test]
fn failed_page_shows_failed_cells_until_retried() {
    let mut harness = make_table(100, config(25));
    harness
        .service
        .fail_next(ServiceOp::Read, ServiceError::Timeout);
    harness.table.load();
    harness.settle();

    let cell = harness.table.cell(0, "name").expect("cell");
    assert_eq!(cell.display, CellDisplay::Failed);
    assert_eq!(cell.text(), "---");
    assert_eq!(
        cell.tooltip.as_deref(),
        Some(ServiceError::Timeout.user_message().as_str())
    );
    assert!(matches!(
        harness.table.set_value(0, "name", "x"),
        Err(TableError::NotEditable(0))
    ));

    harness.table.load_page(0, None);
    harness.settle();
    let cell = harness.table.cell(0, "name").expect("cell");
    assert_eq!(cell.text(), "row 0");
}

#[test]
fn cancelling_a_page_load_restores_not_loaded() {
    let mut harness = loaded_table(100, config(25));
    harness.service.clear_calls();

    harness.table.get_bean(40);
    assert!(harness.table.cancel_row(40));
    assert_eq!(harness.table.loaded_pages(), vec![0]);
    assert!(harness.table.is_idle());

    harness.settle();
    assert!(harness.service.read_calls().is_empty());

    let again = harness.table.get_bean(40).map(|proxy| proxy.is_dummy());
    assert_eq!(again, Some(true));
    harness.settle();
    assert_eq!(harness.name(40).as_deref(), Some("row 40"));
}

#[test]
fn cancelling_the_load_handle_restores_not_loaded() {
    let mut harness = loaded_table(40, config(5));
    let dummy = harness
        .table
        .load_page(3, Some(Duration::from_millis(10)));
    let handle = harness
        .table
        .bean(dummy)
        .and_then(RowProxy::execution)
        .cloned()
        .expect("load handle");

    handle.cancel();
    harness.settle();

    assert!(harness.table.is_idle());
    assert_eq!(harness.table.loaded_pages(), vec![0]);
    assert!(harness.table.bean(dummy).is_none());
    assert!(harness.drain_events().contains(&TableEvent::DataChanged));

    let again = harness.table.get_bean(15).map(|proxy| proxy.is_dummy());
    assert_eq!(again, Some(true));
    harness.settle();
    assert_eq!(harness.name(15).as_deref(), Some("row 15"));
}

#[test]
fn auto_dispose_during_a_background_refresh_keeps_its_placeholder() {
    let mut harness = loaded_table(40, config(5).with_auto_dispose(true));
    harness.table.refresh_visible(1, 4);

    let loading = harness.table.get_bean(20).map(|proxy| proxy.is_dummy());
    assert_eq!(loading, Some(true));
    assert_eq!(harness.table.loaded_pages(), vec![3, 4]);
    let waiting = harness.table.get_bean(17).map(|proxy| proxy.has_execution());
    assert_eq!(waiting, Some(true));

    harness.settle();
    assert!(harness.table.is_idle());
    assert_eq!(harness.name(20).as_deref(), Some("row 20"));
    assert_eq!(harness.name(19).as_deref(), Some("row 19"));
}

#[test]
fn auto_dispose_keeps_pages_with_selected_rows() {
    let mut harness = loaded_table(100, config(10).with_auto_dispose(true));
    harness.table.set_selection(&[3]).expect("select");

    harness.table.get_bean(25);
    harness.settle();
    assert_eq!(harness.table.loaded_pages(), vec![0, 2]);

    harness.table.get_bean(45);
    harness.settle();
    assert_eq!(harness.table.loaded_pages(), vec![0, 4]);
    assert_eq!(harness.table.selected_rows(), vec![3]);
}

#[test]
fn growing_count_completes_a_partial_last_page() {
    let mut harness = loaded_table(15, config(10));
    harness.table.get_bean(12);
    harness.settle();
    assert_eq!(harness.table.row_count(), 15);

    for index in 15..18 {
        harness.service.push(record(index));
    }
    harness.table.recount();
    harness.settle();
    assert_eq!(harness.table.row_count(), 18);

    let pending = harness.table.get_bean(16).map(|proxy| proxy.is_dummy());
    assert_eq!(pending, Some(true));
    harness.settle();
    assert_eq!(harness.service.read_calls().last(), Some(&(15, 7)));
    assert_eq!(harness.name(14).as_deref(), Some("row 14"));
    assert_eq!(harness.name(17).as_deref(), Some("row 17"));
    assert_eq!(harness.table.row_count(), 18);
}

#[test]
fn filter_change_reloads_from_the_first_page() {
    let mut harness = loaded_table(100, config(25));
    harness.table.set_filter(Some(Filter::Range {
        property: "n".to_string(),
        min: Some(Value::from(50i64)),
        max: None,
    }));
    harness.settle();

    assert_eq!(harness.table.row_count(), 50);
    assert_eq!(harness.name(0).as_deref(), Some("row 50"));
}

#[test]
fn selection_follows_rows_across_a_reordering_reload() {
    let mut harness = loaded_table(20, config(10));
    harness.table.set_selection(&[2, 5]).expect("select");
    harness.drain_events();

    harness.table.set_sort(vec![SortKey::descending("n")]);
    harness.settle();
    assert!(harness.table.selected_rows().is_empty());
    assert!(harness.drain_events().contains(&TableEvent::SelectionChanged));

    harness.table.get_bean(14);
    harness.settle();
    assert_eq!(harness.table.selected_rows(), vec![14, 17]);
    assert_eq!(harness.name(17).as_deref(), Some("row 2"));
}
