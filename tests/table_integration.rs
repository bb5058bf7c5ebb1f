//! End-to-end table scenarios on real worker threads.

use pagegrid::{
    BeanProxyFactory, BeanTable, MemoryService, Record, RecordData, ServiceSet, TableConfig,
    TableEvent, ThreadPoolRunner, Value,
};
use std::sync::Arc;
use std::time::Duration;

const SETTLE: Duration = Duration::from_secs(5);

fn record(index: usize) -> Record {
    Record::persisted(format!("r{:04}", index), 1, RecordData::new())
        .with("name", format!("row {}", index))
        .with("n", index as i64)
}

fn setup(rows: usize, latency: Duration, config: TableConfig) -> (BeanTable, Arc<MemoryService>) {
    let service =
        Arc::new(MemoryService::new((0..rows).map(record).collect()).with_latency(latency));
    let runner = Arc::new(ThreadPoolRunner::new(2).expect("runner"));
    let table = BeanTable::new(
        ServiceSet::full(service.clone()),
        BeanProxyFactory::new(["name", "n"]),
        config,
        runner,
    );
    (table, service)
}

fn name(table: &mut BeanTable, row: usize) -> Option<String> {
    table
        .get_bean(row)
        .and_then(|proxy| proxy.value("name"))
        .and_then(Value::as_text)
        .map(ToString::to_string)
}

#[test]
fn scrolling_loads_pages_on_worker_threads() {
    let config = TableConfig::default()
        .with_page_size(50)
        .with_inner_page_delay(Duration::from_millis(5));
    let (mut table, service) = setup(500, Duration::from_millis(2), config);

    table.load();
    assert!(table.wait_until_idle(SETTLE));
    assert_eq!(table.row_count(), 500);
    assert_eq!(name(&mut table, 10).as_deref(), Some("row 10"));

    let loading = table.get_bean(260).map(|proxy| proxy.is_dummy());
    assert_eq!(loading, Some(true));
    assert!(table.wait_until_idle(SETTLE));
    assert_eq!(name(&mut table, 260).as_deref(), Some("row 260"));
    assert_eq!(service.read_calls().last(), Some(&(250, 52)));
}

#[test]
fn cancelled_save_returns_promptly_and_keeps_edits() {
    let reads = Arc::new(MemoryService::new((0..30).map(record).collect()));
    let writes = Arc::new(
        MemoryService::new((0..30).map(record).collect()).with_latency(Duration::from_secs(30)),
    );
    let runner = Arc::new(ThreadPoolRunner::new(2).expect("runner"));
    let mut table = BeanTable::new(
        ServiceSet::read_only(reads).with_updater(writes.clone()),
        BeanProxyFactory::new(["name", "n"]),
        TableConfig::default().with_page_size(25),
        runner,
    );
    table.load();
    assert!(table.wait_until_idle(SETTLE));

    table.set_value(0, "name", "pending").expect("edit");
    assert_eq!(table.save(), Ok(1));
    assert!(!table.wait_until_idle(Duration::from_millis(50)));
    assert!(table.cancel_row(0));
    assert!(table.is_idle());

    let proxy = table.get_bean(0).expect("row 0");
    assert!(proxy.has_modifications());
    assert!(!proxy.has_execution());
    assert_eq!(
        writes.records()[0].value("name"),
        Some(&Value::from("row 0"))
    );
}

#[test]
fn background_refresh_picks_up_inserted_rows() {
    let config = TableConfig::default().with_page_size(25);
    let (mut table, service) = setup(100, Duration::from_millis(1), config);
    let events = table.subscribe();
    table.load();
    assert!(table.wait_until_idle(SETTLE));

    service.insert(
        0,
        Record::persisted("fresh", 1, RecordData::new()).with("name", "inserted"),
    );
    table.refresh_visible(0, 0);
    assert!(table.wait_until_idle(SETTLE));

    assert_eq!(name(&mut table, 0).as_deref(), Some("inserted"));
    assert_eq!(name(&mut table, 1).as_deref(), Some("row 0"));
    assert!(events
        .try_iter()
        .any(|event| matches!(event, TableEvent::RowsChanged(_) | TableEvent::DataChanged)));
}

#[test]
fn saved_edits_reach_the_service() {
    let config = TableConfig::default().with_page_size(25);
    let (mut table, service) = setup(30, Duration::from_millis(1), config);
    table.load();
    assert!(table.wait_until_idle(SETTLE));

    table.set_value(4, "name", "renamed").expect("edit");
    let row = table.add_bean();
    table.set_value(row, "name", "brand new").expect("edit");
    assert_eq!(table.save(), Ok(2));
    assert!(table.wait_until_idle(SETTLE));

    assert!(!table.tracker().has_modifications());
    assert_eq!(service.len(), 31);
    let stored = service
        .records()
        .into_iter()
        .find(|record| record.value("name") == Some(&Value::from("renamed")))
        .map(|record| record.version);
    assert_eq!(stored, Some(2));
}
