//! Scenario tests driving a table against the in-memory service on a manual runner.

use crate::runner::ManualRunner;
use crate::table::BeanTable;
use crate::TableEvent;
use crossbeam_channel::Receiver;
use pagegrid_core::config::TableConfig;
use pagegrid_core::memory::MemoryService;
use pagegrid_core::model::{Record, RecordData, RecordId, Value};
use pagegrid_core::proxy::{BeanProxyFactory, BeanView};
use pagegrid_core::service::ServiceSet;
use pagegrid_core::validation::{PropertyRule, ValidationResult};
use std::sync::Arc;

struct TestHarness {
    table: BeanTable,
    runner: Arc<ManualRunner>,
    service: Arc<MemoryService>,
    events: Receiver<TableEvent>,
}

fn record(index: usize) -> Record {
    Record::persisted(format!("r{:03}", index), 1, RecordData::new())
        .with("name", format!("row {}", index))
        .with("n", index as i64)
}

fn records(count: usize) -> Vec<Record> {
    (0..count).map(record).collect()
}

fn record_id(index: usize) -> RecordId {
    RecordId::from(format!("r{:03}", index))
}

fn factory() -> BeanProxyFactory {
    let name_required = PropertyRule::new("name", |bean: &dyn BeanView| {
        let named = bean
            .value("name")
            .and_then(Value::as_text)
            .is_some_and(|name| !name.is_empty());
        if named {
            ValidationResult::ok()
        } else {
            ValidationResult::error("name required")
        }
    });
    BeanProxyFactory::new(["name", "n"]).with_validator(name_required)
}

/// Paging defaults for tests: no auto-dispose so cached pages stay put.
fn config(page_size: usize) -> TableConfig {
    TableConfig::default()
        .with_page_size(page_size)
        .with_auto_dispose(false)
}

fn make_table_with(
    service: MemoryService,
    services: impl FnOnce(Arc<MemoryService>) -> ServiceSet,
    config: TableConfig,
) -> TestHarness {
    let service = Arc::new(service);
    let runner = Arc::new(ManualRunner::new());
    let mut table = BeanTable::new(services(service.clone()), factory(), config, runner.clone());
    let events = table.subscribe();
    TestHarness {
        table,
        runner,
        service,
        events,
    }
}

fn make_table(rows: usize, config: TableConfig) -> TestHarness {
    make_table_with(MemoryService::new(records(rows)), ServiceSet::full, config)
}

/// Table of `rows` records with the first page and the count already applied.
fn loaded_table(rows: usize, config: TableConfig) -> TestHarness {
    let mut harness = make_table(rows, config);
    harness.table.load();
    harness.settle();
    harness.drain_events();
    harness
}

impl TestHarness {
    /// Run jobs (delayed ones included) and apply completions until nothing moves.
    fn settle(&mut self) {
        for _ in 0..64 {
            let ran = self.runner.run_delayed();
            let applied = self.table.process_completions();
            if ran == 0 && applied == 0 {
                return;
            }
        }
        panic!("table did not settle");
    }

    fn drain_events(&self) -> Vec<TableEvent> {
        self.events.try_iter().collect()
    }

    fn name(&mut self, row: usize) -> Option<String> {
        self.table
            .get_bean(row)
            .and_then(|proxy| proxy.value("name"))
            .and_then(Value::as_text)
            .map(ToString::to_string)
    }
}

mod editing;
mod paging;
mod save_and_delete;
