//! The virtualized, editable bean table.
//!
//! `BeanTable` lives on one thread and owns every proxy (through its
//! [`BeanStateTracker`]) plus the page store. Service calls run on a
//! [`JobRunner`]; their results come back as completions that are applied by
//! [`BeanTable::process_completions`], so store mutation never happens
//! anywhere else.
//!
//! The operations are split across submodules:
//! - `paging`: row access, page loaders, eviction;
//! - `count`: total-row-count reconciliation;
//! - `background`: viewport refresh with row diffing;
//! - `edit`: edits, added rows, cell state;
//! - `save`: the save delegate;
//! - `delegates`: refresh and delete delegates.

mod background;
mod count;
mod delegates;
mod edit;
mod paging;
mod save;

use crate::events::TableEvent;
use crate::protocol::Completion;
use crate::runner::JobRunner;
use crate::selection::Selection;
use crate::store::PageStore;
use crate::TableError;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use pagegrid_core::config::TableConfig;
use pagegrid_core::events::EventBus;
use pagegrid_core::execution::{ExecutionHandle, ExecutionId};
use pagegrid_core::model::{CountRequest, Filter, ReadRequest, RecordId, SortKey, Value};
use pagegrid_core::proxy::{BeanMessage, BeanProxyFactory, ProxyId, RowProxy};
use pagegrid_core::service::ServiceSet;
use pagegrid_core::tracker::{BeanStateTracker, TrackerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub(crate) use background::BackgroundLoad;
pub(crate) use paging::PageLoad;
pub(crate) use save::SaveBatch;

/// Parameters every read and count request carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub parent_keys: Vec<RecordId>,
    pub filter: Option<Filter>,
    pub sort: Vec<SortKey>,
    pub parameter: Option<Value>,
}

impl Query {
    fn read(&self, offset: usize, limit: usize) -> ReadRequest {
        ReadRequest {
            parent_keys: self.parent_keys.clone(),
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            offset,
            limit,
            parameter: self.parameter.clone(),
        }
    }

    fn count(&self) -> CountRequest {
        CountRequest {
            parent_keys: self.parent_keys.clone(),
            filter: self.filter.clone(),
            parameter: self.parameter.clone(),
        }
    }
}

/// Beans an execution is working on.
#[derive(Debug)]
pub(crate) struct BeanBatch {
    handle: ExecutionHandle,
    beans: Vec<ProxyId>,
}

/// Context of one in-flight execution, looked up when its completion arrives.
#[derive(Debug)]
pub(crate) enum Inflight {
    Page(PageLoad),
    Count(ExecutionHandle),
    Background(BackgroundLoad),
    Save(SaveBatch),
    Refresh(BeanBatch),
    Delete(BeanBatch),
}

impl Inflight {
    fn handle(&self) -> &ExecutionHandle {
        match self {
            Self::Page(load) => &load.handle,
            Self::Count(handle) => handle,
            Self::Background(load) => &load.handle,
            Self::Save(batch) => &batch.handle,
            Self::Refresh(batch) | Self::Delete(batch) => &batch.handle,
        }
    }
}

pub struct BeanTable {
    services: ServiceSet,
    factory: BeanProxyFactory,
    config: TableConfig,
    runner: Arc<dyn JobRunner>,
    tracker: BeanStateTracker,
    store: PageStore,
    selection: Selection,
    selection_dirty: bool,
    query: Query,
    inflight: HashMap<ExecutionId, Inflight>,
    /// Dedicated page loaders: one for even pages, one for odd pages.
    parity: [Option<ExecutionId>; 2],
    background: Option<ExecutionId>,
    count: Option<ExecutionId>,
    /// Modified persisted proxies that are not placed in a page right now.
    retained: HashMap<RecordId, ProxyId>,
    last_requested_page: Option<usize>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    events: EventBus<TableEvent>,
}

impl BeanTable {
    /// Build an empty table; call [`Self::load`] to fetch the first page.
    pub fn new(
        services: ServiceSet,
        factory: BeanProxyFactory,
        config: TableConfig,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        let mut table = Self {
            services,
            factory,
            store: PageStore::new(config.page_size),
            config,
            runner,
            tracker: BeanStateTracker::new(),
            selection: Selection::default(),
            selection_dirty: false,
            query: Query::default(),
            inflight: HashMap::new(),
            parity: [None, None],
            background: None,
            count: None,
            retained: HashMap::new(),
            last_requested_page: None,
            completion_tx,
            completion_rx,
            events: EventBus::new(),
        };
        if table.config.last_row_dummy {
            let id = table.tracker.register(table.factory.create_last_row_dummy());
            table.store.set_last_row_dummy(Some(id));
        }
        table
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn tracker(&self) -> &BeanStateTracker {
        &self.tracker
    }

    pub fn bean(&self, id: ProxyId) -> Option<&RowProxy> {
        self.tracker.get(id)
    }

    /// Rows currently known: paged rows, added rows and the new-row editor.
    pub fn row_count(&self) -> usize {
        self.store.row_count()
    }

    /// Total from the last successful count, if it is still trusted.
    pub fn counted_rows(&self) -> Option<usize> {
        self.store.counted()
    }

    /// Indices of the pages currently cached.
    pub fn loaded_pages(&self) -> Vec<usize> {
        self.store.page_indices()
    }

    /// `true` when no execution is in flight.
    pub fn is_idle(&self) -> bool {
        self.inflight.is_empty()
    }

    /// Subscribe to row-level table events.
    pub fn subscribe(&mut self) -> Receiver<TableEvent> {
        self.events.subscribe()
    }

    /// Subscribe to aggregate modification/process/validation state.
    pub fn subscribe_state(&mut self) -> Receiver<TrackerEvent> {
        self.tracker.subscribe()
    }

    pub fn set_filter(&mut self, filter: Option<Filter>) {
        self.query.filter = filter;
        self.load();
    }

    pub fn set_sort(&mut self, sort: Vec<SortKey>) {
        self.query.sort = sort;
        self.load();
    }

    pub fn set_parent_keys(&mut self, parent_keys: Vec<RecordId>) {
        self.query.parent_keys = parent_keys;
        self.load();
    }

    pub fn set_parameter(&mut self, parameter: Option<Value>) {
        self.query.parameter = parameter;
        self.load();
    }

    /// Destructive reload.
    ///
    /// Cancels every loader, drops all pages and both row counts, then starts
    /// the count and the first page. Selected rows are remembered by
    /// identity and re-selected as they come back; modified persisted beans
    /// are kept and rebased onto their reloaded record.
    pub fn load(&mut self) {
        debug!(target: "pagegrid_table::paging", "reload");
        self.cancel_loaders();
        for id in self.store.clear_pages() {
            self.release(id);
        }
        for id in self.store.added().to_vec() {
            let persisted = self.tracker.get(id).is_some_and(RowProxy::is_persisted);
            if persisted {
                self.store.remove_added(id);
                self.release(id);
            }
        }
        self.last_requested_page = None;
        self.start_count();
        self.start_page_load(0, None, None);
        self.emit(TableEvent::DataChanged);
    }

    /// Apply every completion that has arrived so far.
    ///
    /// # Returns
    /// Number of completions applied (stale ones are not counted).
    pub fn process_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            if self.apply_completion(completion) {
                applied += 1;
            }
        }
        applied
    }

    /// Block until idle or until `timeout` elapses, applying completions.
    ///
    /// # Returns
    /// `true` if the table became idle.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completion_rx.recv_timeout(remaining) {
                Ok(completion) => {
                    self.apply_completion(completion);
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    return self.is_idle();
                }
            }
        }
        true
    }

    fn apply_completion(&mut self, completion: Completion) -> bool {
        let execution = completion.execution;
        let Some(inflight) = self.inflight.remove(&execution) else {
            trace!(
                target: "pagegrid_table::paging",
                execution = %execution,
                "dropping stale completion"
            );
            return false;
        };
        let outcome = match completion.outcome {
            Some(outcome) if !inflight.handle().is_cancelled() => outcome,
            _ => {
                // Cancelled through the handle itself rather than the table.
                debug!(
                    target: "pagegrid_table::paging",
                    execution = %execution,
                    label = inflight.handle().label(),
                    "execution cancelled by its handle"
                );
                let placeholder = matches!(inflight, Inflight::Page(_) | Inflight::Background(_));
                self.inflight.insert(execution, inflight);
                self.cancel_execution(execution);
                if placeholder {
                    self.emit(TableEvent::DataChanged);
                }
                self.flush_selection();
                return true;
            }
        };
        match inflight {
            Inflight::Page(load) => self.finish_page_load(load, outcome, completion.elapsed),
            Inflight::Count(handle) => self.finish_count(handle, outcome),
            Inflight::Background(load) => {
                self.finish_background(load, outcome, completion.elapsed)
            }
            Inflight::Save(batch) => self.finish_save(batch, outcome),
            Inflight::Refresh(batch) => self.finish_refresh(batch, outcome),
            Inflight::Delete(batch) => self.finish_delete(batch, outcome),
        }
        self.flush_selection();
        true
    }

    /// Cancel whatever operation is running on the bean at `row`.
    ///
    /// Page loads restore the rows to "not loaded"; saves, refreshes and
    /// deletes leave the beans as they were before the call.
    ///
    /// # Returns
    /// `true` if an execution was cancelled.
    pub fn cancel_row(&mut self, row: usize) -> bool {
        let execution = self
            .store
            .slot(row)
            .and_then(|id| self.tracker.get(id))
            .and_then(RowProxy::execution)
            .map(ExecutionHandle::id);
        match execution {
            Some(execution) => self.cancel_execution(execution),
            None => false,
        }
    }

    fn cancel_execution(&mut self, execution: ExecutionId) -> bool {
        match self.inflight.get(&execution) {
            Some(Inflight::Page(_)) => self.cancel_load(execution),
            Some(Inflight::Background(_)) => self.cancel_background(),
            Some(Inflight::Count(_)) => self.cancel_count(),
            Some(Inflight::Save(_) | Inflight::Refresh(_) | Inflight::Delete(_)) => {
                let Some(inflight) = self.inflight.remove(&execution) else {
                    return false;
                };
                inflight.handle().cancel();
                let beans: Vec<ProxyId> = match inflight {
                    Inflight::Save(batch) => batch.beans.into_iter().map(|(id, _)| id).collect(),
                    Inflight::Refresh(batch) | Inflight::Delete(batch) => batch.beans,
                    _ => Vec::new(),
                };
                self.detach_all(&beans, execution);
                self.drop_orphans();
                true
            }
            None => false,
        }
    }

    /// Cancel every page, background and count loader.
    fn cancel_loaders(&mut self) {
        let loads: Vec<ExecutionId> = self
            .inflight
            .iter()
            .filter(|(_, inflight)| matches!(inflight, Inflight::Page(_)))
            .map(|(id, _)| *id)
            .collect();
        for execution in loads {
            self.cancel_load(execution);
        }
        self.cancel_background();
        self.cancel_count();
    }

    fn detach_all(&mut self, beans: &[ProxyId], execution: ExecutionId) {
        for id in beans {
            self.tracker.update(*id, |proxy| proxy.detach_execution(execution));
        }
        self.emit_rows(beans);
    }

    fn attach_message(&mut self, beans: &[ProxyId], message: &BeanMessage) {
        for id in beans {
            self.tracker
                .update(*id, |proxy| proxy.add_message(message.clone()));
        }
    }

    /// Let go of a proxy that leaves the page store.
    ///
    /// Selected proxies are remembered by identity. Modified (or saving)
    /// persisted proxies stay registered and wait for their record to be
    /// loaded again; placeholders of in-flight loads stay with their load.
    /// Everything else is unregistered.
    fn release(&mut self, id: ProxyId) {
        if self.is_inflight_placeholder(id) {
            return;
        }
        let Some(proxy) = self.tracker.get(id) else {
            return;
        };
        let identity = proxy.identity();
        let keep = proxy.is_persisted() && (proxy.has_modifications() || proxy.has_execution());
        let record_id = proxy.record_id().cloned();
        if self.selection.stash(id, identity) {
            self.selection_dirty = true;
        }
        match record_id {
            Some(record_id) if keep => {
                self.retained.insert(record_id, id);
            }
            _ => {
                self.tracker.unregister(id);
            }
        }
    }

    fn is_inflight_placeholder(&self, id: ProxyId) -> bool {
        self.inflight.values().any(|inflight| match inflight {
            Inflight::Page(load) => load.dummy == id,
            Inflight::Background(load) => load.dummy == id,
            _ => false,
        })
    }

    /// Unregister retained proxies that no longer carry anything worth keeping.
    fn drop_orphans(&mut self) {
        let orphans: Vec<RecordId> = self
            .retained
            .iter()
            .filter(|(_, id)| {
                self.tracker
                    .get(**id)
                    .map_or(true, |proxy| !proxy.has_modifications() && !proxy.has_execution())
            })
            .map(|(record_id, _)| record_id.clone())
            .collect();
        for record_id in orphans {
            if let Some(id) = self.retained.remove(&record_id) {
                self.tracker.unregister(id);
            }
        }
    }

    fn flush_selection(&mut self) {
        if std::mem::take(&mut self.selection_dirty) {
            self.emit(TableEvent::SelectionChanged);
        }
    }

    fn emit(&mut self, event: TableEvent) {
        self.events.emit(event);
    }

    fn emit_rows(&mut self, beans: &[ProxyId]) {
        let mut rows: Vec<usize> = beans
            .iter()
            .filter_map(|id| self.store.row_of(*id))
            .collect();
        if rows.is_empty() {
            return;
        }
        rows.sort_unstable();
        rows.dedup();
        self.emit(TableEvent::RowsChanged(rows));
    }

    /// Select exactly the given rows.
    ///
    /// Rows whose bean is not loaded yet are skipped.
    ///
    /// # Errors
    /// Returns [`TableError::RowOutOfRange`] for rows past the end.
    pub fn set_selection(&mut self, rows: &[usize]) -> Result<(), TableError> {
        let row_count = self.store.row_count();
        if let Some(row) = rows.iter().copied().find(|row| *row >= row_count) {
            return Err(TableError::RowOutOfRange { row, row_count });
        }
        let ids: Vec<ProxyId> = rows
            .iter()
            .filter_map(|row| self.store.slot(*row))
            .filter(|id| self.tracker.get(*id).is_some_and(|proxy| !proxy.is_dummy()))
            .collect();
        if self.selection.set(ids) {
            self.emit(TableEvent::SelectionChanged);
        }
        Ok(())
    }

    /// Rows of the selected beans that are currently placed, ascending.
    pub fn selected_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self
            .selection
            .ids()
            .filter_map(|id| self.store.row_of(id))
            .collect();
        rows.sort_unstable();
        rows
    }
}
