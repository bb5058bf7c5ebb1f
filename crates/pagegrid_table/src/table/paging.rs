//! Row access, page loaders and page eviction.

use super::{BeanTable, Inflight};
use crate::events::TableEvent;
use crate::protocol::{dispatch, Outcome};
use crate::store::RowLocation;
use pagegrid_core::error::ServiceError;
use pagegrid_core::execution::{ExecutionHandle, ExecutionId};
use pagegrid_core::model::Record;
use pagegrid_core::proxy::{BeanMessage, ProxyId, RowProxy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One in-flight page read.
#[derive(Debug)]
pub(crate) struct PageLoad {
    pub(super) handle: ExecutionHandle,
    pub(super) page: usize,
    /// Shared placeholder occupying every slot being fetched.
    pub(super) dummy: ProxyId,
    /// `None` for a whole page; `Some(slot)` when completing a partly
    /// filled page from `slot` on.
    pub(super) fill_from: Option<usize>,
    pub(super) offset: usize,
    pub(super) limit: usize,
}

impl BeanTable {
    /// Bean at `row`.
    ///
    /// Requesting a row whose page is not cached starts loading it and
    /// returns the loading placeholder. Rows past the end give `None`.
    pub fn get_bean(&mut self, row: usize) -> Option<&RowProxy> {
        let id = self.resolve_row(row)?;
        self.tracker.get(id)
    }

    pub(super) fn resolve_row(&mut self, row: usize) -> Option<ProxyId> {
        match self.store.locate(row) {
            RowLocation::Paged { page, slot } => {
                self.note_requested_page(page);
                if !self.store.contains_page(page) {
                    return Some(self.start_page_load(page, None, None));
                }
                let cached = self
                    .store
                    .page(page)
                    .and_then(|slots| slots.get(slot).copied().flatten());
                match cached {
                    Some(id) => Some(id),
                    None => self.complete_page(page),
                }
            }
            RowLocation::Added(index) => self.store.added().get(index).copied(),
            RowLocation::LastRowDummy => self.store.last_row_dummy(),
            RowLocation::OutOfRange => None,
        }
    }

    /// Load (or reload) page `page`.
    ///
    /// `delay` overrides the default scheduling: edge pages load right away,
    /// interior pages after the configured inner-page delay.
    ///
    /// # Returns
    /// The placeholder proxy installed in the page.
    pub fn load_page(&mut self, page: usize, delay: Option<Duration>) -> ProxyId {
        self.note_requested_page(page);
        self.start_page_load(page, delay, None)
    }

    fn note_requested_page(&mut self, page: usize) {
        if self.last_requested_page == Some(page) {
            return;
        }
        self.last_requested_page = Some(page);
        if self.config.auto_dispose_pages {
            self.dispose_invisible_pages(page);
        }
    }

    /// Fetch the unfilled tail of a cached page that grew after it was sized.
    fn complete_page(&mut self, page: usize) -> Option<ProxyId> {
        if let Some(dummy) = self.loads_for_page(page).into_iter().find_map(|execution| {
            match self.inflight.get(&execution) {
                Some(Inflight::Page(load)) => Some(load.dummy),
                _ => None,
            }
        }) {
            return Some(dummy);
        }
        let bound = self.store.page_bound(page);
        let slots = self.store.page_mut(page)?;
        if slots.len() < bound {
            slots.resize(bound, None);
        }
        let from = slots.iter().position(Option::is_none)?;
        Some(self.start_page_load(page, None, Some(from)))
    }

    pub(super) fn start_page_load(
        &mut self,
        page: usize,
        delay: Option<Duration>,
        fill_from: Option<usize>,
    ) -> ProxyId {
        for execution in self.loads_for_page(page) {
            self.cancel_load(execution);
        }
        let parity = fill_from.is_none().then_some(page % 2);
        if let Some(execution) = parity.and_then(|slot| self.parity[slot]) {
            self.cancel_load(execution);
        }
        if self.background_covers(page) {
            self.cancel_background();
        }

        let handle = ExecutionHandle::new("read-page");
        let dummy = self
            .tracker
            .register(RowProxy::dummy(Some(handle.clone())));
        let page_size = self.store.page_size();
        let start = self.store.page_start(page);
        let (offset, rows) = match fill_from {
            None => {
                if let Some(old) = self.store.remove_page(page) {
                    let mut old: Vec<ProxyId> = old.into_iter().flatten().collect();
                    old.dedup();
                    for id in old {
                        self.release(id);
                    }
                }
                let bound = self.store.page_bound(page);
                let placeholder = if self.store.counted().is_some() && bound > 0 {
                    bound
                } else {
                    page_size
                };
                self.store.insert_page(page, vec![Some(dummy); placeholder]);
                (start, page_size)
            }
            Some(from) => {
                if let Some(slots) = self.store.page_mut(page) {
                    for slot in slots.iter_mut().skip(from).filter(|slot| slot.is_none()) {
                        *slot = Some(dummy);
                    }
                }
                (start + from, page_size - from)
            }
        };
        let limit = rows + self.config.page_overlap;

        let delay = match delay {
            Some(delay) => Some(delay),
            None if fill_from.is_some() || self.store.is_edge_page(page) => None,
            None => Some(self.config.inner_page_delay),
        };
        let reader = self.services.reader.clone();
        let request = self.query.read(offset, limit);
        dispatch(
            self.runner.as_ref(),
            delay,
            &handle,
            &self.completion_tx,
            move |token| Outcome::Records(reader.read(&request, token)),
        );
        debug!(
            target: "pagegrid_table::paging",
            page,
            offset,
            limit,
            delay_ms = delay.map_or(0, |d| d.as_millis() as u64),
            execution = %handle.id(),
            "page load started"
        );

        let execution = handle.id();
        if let Some(slot) = parity {
            self.parity[slot] = Some(execution);
        }
        self.inflight.insert(
            execution,
            Inflight::Page(PageLoad {
                handle,
                page,
                dummy,
                fill_from,
                offset,
                limit,
            }),
        );
        dummy
    }

    pub(super) fn loads_for_page(&self, page: usize) -> Vec<ExecutionId> {
        self.inflight
            .iter()
            .filter_map(|(execution, inflight)| match inflight {
                Inflight::Page(load) if load.page == page => Some(*execution),
                _ => None,
            })
            .collect()
    }

    fn clear_parity(&mut self, execution: ExecutionId) {
        for slot in &mut self.parity {
            if *slot == Some(execution) {
                *slot = None;
            }
        }
    }

    /// Cancel the page load `execution` and put its rows back to "not loaded".
    pub(super) fn cancel_load(&mut self, execution: ExecutionId) -> bool {
        if !matches!(self.inflight.get(&execution), Some(Inflight::Page(_))) {
            return false;
        }
        let Some(Inflight::Page(load)) = self.inflight.remove(&execution) else {
            return false;
        };
        load.handle.cancel();
        self.clear_parity(execution);
        self.discard_placeholder(&load);
        self.tracker.unregister(load.dummy);
        debug!(
            target: "pagegrid_table::paging",
            page = load.page,
            execution = %execution,
            "page load cancelled"
        );
        true
    }

    fn discard_placeholder(&mut self, load: &PageLoad) {
        match load.fill_from {
            None => {
                let owned = self
                    .store
                    .page(load.page)
                    .is_some_and(|slots| slots.iter().all(|slot| *slot == Some(load.dummy)));
                if owned {
                    self.store.remove_page(load.page);
                }
            }
            Some(_) => {
                if let Some(slots) = self.store.page_mut(load.page) {
                    for slot in slots.iter_mut().filter(|slot| **slot == Some(load.dummy)) {
                        *slot = None;
                    }
                }
            }
        }
    }

    pub(super) fn finish_page_load(&mut self, load: PageLoad, outcome: Outcome, elapsed: Duration) {
        self.clear_parity(load.handle.id());
        let result = match outcome {
            Outcome::Records(result) => result,
            other => Err(ServiceError::Backend(format!(
                "unexpected page outcome: {:?}",
                other
            ))),
        };
        match result {
            Err(err) if err.is_cancellation() => {
                self.discard_placeholder(&load);
                self.tracker.unregister(load.dummy);
                self.emit(TableEvent::DataChanged);
            }
            Err(err) => {
                warn!(
                    target: "pagegrid_table::paging",
                    page = load.page,
                    error = %err,
                    "page load failed"
                );
                let execution = load.handle.id();
                self.tracker.update(load.dummy, |dummy| {
                    dummy.add_message(BeanMessage::error(err.user_message()));
                    dummy.detach_execution(execution);
                });
                let start = self.store.page_start(load.page);
                let len = self.store.page(load.page).map_or(0, Vec::len);
                self.emit(TableEvent::RowsChanged((start..start + len).collect()));
            }
            Ok(records) => {
                if self.config.trace_loaders {
                    info!(
                        target: "pagegrid_table::paging",
                        page = load.page,
                        offset = load.offset,
                        limit = load.limit,
                        records = records.len(),
                        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                        "page load perf"
                    );
                }
                self.apply_page(load, records);
            }
        }
    }

    fn apply_page(&mut self, load: PageLoad, records: Vec<Record>) {
        let page = load.page;
        let start = self.store.page_start(page);
        let from = load.fill_from.unwrap_or(0);
        let expected = self.store.page_size() - from;
        let received = records.len();
        let was_last = self.store.is_last_page(page);
        self.tracker.unregister(load.dummy);

        if received < expected && !was_last {
            warn!(
                target: "pagegrid_table::paging",
                page,
                received,
                expected,
                "page came back short; reloading"
            );
            self.load();
            return;
        }

        let mut slots = match load.fill_from {
            None => Vec::with_capacity(expected),
            Some(_) => match self.store.remove_page(page) {
                Some(mut slots) => {
                    let displaced: Vec<ProxyId> = slots
                        .iter()
                        .skip(from)
                        .flatten()
                        .copied()
                        .filter(|id| *id != load.dummy)
                        .collect();
                    slots.resize(from, None);
                    for id in displaced {
                        self.release(id);
                    }
                    slots
                }
                None => return,
            },
        };
        for record in records.into_iter().take(expected) {
            let id = self.adopt(record);
            slots.push(Some(id));
        }
        let placed = slots.len() - from;
        self.store.insert_page(page, slots);

        let rows_before = self.store.row_count();
        let reached = start + from + received;
        if received < expected {
            self.store.set_optimistic(reached);
            if self.store.counted().is_some_and(|counted| counted != reached) {
                debug!(
                    target: "pagegrid_table::count",
                    reached,
                    "last page disagrees with count; recounting"
                );
                self.store.set_counted(None);
                self.start_count();
            }
        } else {
            self.store.raise_optimistic(reached);
            if self.store.counted().is_some_and(|counted| counted < reached) {
                self.store.set_counted(None);
                self.start_count();
            }
        }
        debug!(
            target: "pagegrid_table::paging",
            page,
            received,
            row_count = self.store.row_count(),
            "page load completed"
        );

        if self.store.row_count() != rows_before {
            self.emit(TableEvent::DataChanged);
        } else if placed > 0 {
            self.emit(TableEvent::RowsChanged(
                (start + from..start + from + placed).collect(),
            ));
        }
    }

    /// Turn a fetched record into a registered proxy.
    ///
    /// A retained modified proxy with the same id is reused and rebased, so
    /// its pending edits survive the reload.
    pub(super) fn adopt(&mut self, record: Record) -> ProxyId {
        let retained = record
            .id
            .as_ref()
            .and_then(|record_id| self.retained.remove(record_id))
            .filter(|id| self.tracker.contains(*id));
        let id = match retained {
            Some(id) => {
                let unchanged = self
                    .tracker
                    .get(id)
                    .is_some_and(|proxy| proxy.record().same_content(&record));
                if !unchanged {
                    self.tracker
                        .update(id, |proxy| proxy.rebase(Arc::new(record)));
                }
                id
            }
            None => self.tracker.register(self.factory.create(record)),
        };
        if let Some(identity) = self.tracker.get(id).map(RowProxy::identity) {
            if self.selection.restore(id, &identity) {
                self.selection_dirty = true;
            }
        }
        id
    }

    /// Evict pages more than one page away from `current`.
    ///
    /// Pages holding a selected, modified or busy bean are kept.
    fn dispose_invisible_pages(&mut self, current: usize) {
        for page in self.store.page_indices() {
            if page.abs_diff(current) <= 1 || self.page_is_pinned(page) {
                continue;
            }
            self.evict_page(page);
        }
    }

    fn page_is_pinned(&self, page: usize) -> bool {
        self.store.page_ids(page).into_iter().any(|id| {
            self.selection.contains(id)
                || self.tracker.get(id).is_some_and(|proxy| {
                    !proxy.is_dummy() && (proxy.has_modifications() || proxy.has_execution())
                })
        })
    }

    pub(super) fn evict_page(&mut self, page: usize) {
        for execution in self.loads_for_page(page) {
            self.cancel_load(execution);
        }
        let ids = self.store.page_ids(page);
        self.store.remove_page(page);
        for id in ids {
            self.release(id);
        }
        debug!(target: "pagegrid_table::paging", page, "page evicted");
    }
}
