//! Background refresh of the visible page range.
//!
//! The range is re-read in one request and diffed against the cached rows:
//! unchanged rows keep their proxy (and with it selection and subscribers),
//! changed rows with local edits are rebased in place, everything else is
//! replaced.

use super::{BeanTable, Inflight};
use crate::events::TableEvent;
use crate::protocol::{dispatch, Outcome};
use pagegrid_core::error::ServiceError;
use pagegrid_core::execution::ExecutionHandle;
use pagegrid_core::model::Record;
use pagegrid_core::proxy::{BeanMessage, ProxyId, RowProxy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub(crate) struct BackgroundLoad {
    pub(super) handle: ExecutionHandle,
    /// Placeholder for pages in the range that were not cached.
    pub(super) dummy: ProxyId,
    pub(super) first_page: usize,
    pub(super) last_page: usize,
    pub(super) offset: usize,
    pub(super) limit: usize,
}

enum SlotAction {
    Keep,
    Rebase(ProxyId),
    Replace(Option<ProxyId>),
}

impl BeanTable {
    /// Re-read pages `first_page..=last_page` without disturbing the view.
    ///
    /// Page loads over the same range are cancelled; pages that are not
    /// cached show a loading placeholder until the read completes.
    pub fn refresh_visible(&mut self, first_page: usize, last_page: usize) {
        let (first_page, last_page) = (first_page.min(last_page), first_page.max(last_page));
        self.cancel_background();
        for page in first_page..=last_page {
            for execution in self.loads_for_page(page) {
                self.cancel_load(execution);
            }
        }

        let handle = ExecutionHandle::new("read-background");
        let dummy = self
            .tracker
            .register(RowProxy::dummy(Some(handle.clone())));
        for page in first_page..=last_page {
            let bound = self.store.page_bound(page);
            if bound > 0 && !self.store.contains_page(page) {
                self.store.insert_page(page, vec![Some(dummy); bound]);
            }
        }

        let page_size = self.store.page_size();
        let offset = self.store.page_start(first_page);
        let limit = (last_page - first_page + 1) * page_size + self.config.page_overlap;
        let reader = self.services.reader.clone();
        let request = self.query.read(offset, limit);
        dispatch(
            self.runner.as_ref(),
            None,
            &handle,
            &self.completion_tx,
            move |token| Outcome::Records(reader.read(&request, token)),
        );
        debug!(
            target: "pagegrid_table::paging",
            first_page,
            last_page,
            offset,
            limit,
            "background load started"
        );
        self.background = Some(handle.id());
        self.inflight.insert(
            handle.id(),
            Inflight::Background(BackgroundLoad {
                handle,
                dummy,
                first_page,
                last_page,
                offset,
                limit,
            }),
        );
    }

    pub(super) fn background_covers(&self, page: usize) -> bool {
        self.background
            .and_then(|execution| self.inflight.get(&execution))
            .is_some_and(|inflight| match inflight {
                Inflight::Background(load) => (load.first_page..=load.last_page).contains(&page),
                _ => false,
            })
    }

    pub(super) fn cancel_background(&mut self) -> bool {
        let Some(execution) = self.background.take() else {
            return false;
        };
        match self.inflight.remove(&execution) {
            Some(Inflight::Background(load)) => {
                load.handle.cancel();
                self.clear_background_placeholder(&load);
                self.tracker.unregister(load.dummy);
                debug!(target: "pagegrid_table::paging", "background load cancelled");
                true
            }
            Some(other) => {
                self.inflight.insert(execution, other);
                false
            }
            None => false,
        }
    }

    fn clear_background_placeholder(&mut self, load: &BackgroundLoad) {
        for page in load.first_page..=load.last_page {
            let Some(slots) = self.store.page_mut(page) else {
                continue;
            };
            if slots.iter().all(|slot| *slot == Some(load.dummy)) {
                self.store.remove_page(page);
                continue;
            }
            for slot in slots.iter_mut().filter(|slot| **slot == Some(load.dummy)) {
                *slot = None;
            }
        }
    }

    pub(super) fn finish_background(
        &mut self,
        load: BackgroundLoad,
        outcome: Outcome,
        elapsed: Duration,
    ) {
        if self.background == Some(load.handle.id()) {
            self.background = None;
        }
        let result = match outcome {
            Outcome::Records(result) => result,
            other => Err(ServiceError::Backend(format!(
                "unexpected background outcome: {:?}",
                other
            ))),
        };
        let records = match result {
            Ok(records) => records,
            Err(err) if err.is_cancellation() => {
                self.clear_background_placeholder(&load);
                self.tracker.unregister(load.dummy);
                self.emit(TableEvent::DataChanged);
                return;
            }
            Err(err) => {
                warn!(
                    target: "pagegrid_table::paging",
                    first_page = load.first_page,
                    last_page = load.last_page,
                    error = %err,
                    "background load failed"
                );
                let execution = load.handle.id();
                let placed = (load.first_page..=load.last_page)
                    .any(|page| self.store.page_ids(page).contains(&load.dummy));
                if placed {
                    self.tracker.update(load.dummy, |dummy| {
                        dummy.add_message(BeanMessage::error(err.user_message()));
                        dummy.detach_execution(execution);
                    });
                } else {
                    self.tracker.unregister(load.dummy);
                }
                self.emit(TableEvent::DataChanged);
                return;
            }
        };
        if self.config.trace_loaders {
            info!(
                target: "pagegrid_table::paging",
                offset = load.offset,
                limit = load.limit,
                records = records.len(),
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "background load perf"
            );
        }
        if records.is_empty() && load.offset > 0 {
            warn!(
                target: "pagegrid_table::paging",
                offset = load.offset,
                "background load found no rows; reloading"
            );
            self.tracker.unregister(load.dummy);
            self.load();
            return;
        }
        self.apply_background(load, records);
    }

    fn apply_background(&mut self, load: BackgroundLoad, records: Vec<Record>) {
        let page_size = self.store.page_size();
        let span = (load.last_page - load.first_page + 1) * page_size;
        let known = self.store.paged_rows().saturating_sub(load.offset).min(span);
        let received = records.len();
        let rows_before = self.store.row_count();

        let actions: Vec<SlotAction> = records
            .iter()
            .take(span)
            .enumerate()
            .map(|(index, record)| self.diff_slot(load.offset + index, record, load.dummy))
            .collect();

        let mut replaced: Vec<ProxyId> = actions
            .iter()
            .filter_map(|action| match action {
                SlotAction::Replace(Some(old)) => Some(*old),
                _ => None,
            })
            .collect();
        replaced.sort();
        replaced.dedup();
        // Failed placeholders can span rows past the result; drop them last.
        let (stale_dummies, replaced): (Vec<ProxyId>, Vec<ProxyId>) = replaced
            .into_iter()
            .partition(|id| self.tracker.get(*id).is_some_and(RowProxy::is_dummy));
        for old in replaced {
            self.release(old);
        }

        let mut changed = Vec::new();
        for (index, (record, action)) in records.into_iter().zip(actions).enumerate() {
            let row = load.offset + index;
            match action {
                SlotAction::Keep => {}
                SlotAction::Rebase(id) => {
                    self.tracker
                        .update(id, |proxy| proxy.rebase(Arc::new(record)));
                    changed.push(row);
                }
                SlotAction::Replace(_) => {
                    let id = self.adopt(record);
                    self.place(row, id);
                    changed.push(row);
                }
            }
        }
        self.tracker.unregister(load.dummy);

        let reached = load.offset + received;
        if received < known {
            for id in self.store.truncate(reached) {
                self.release(id);
            }
            self.store.set_counted(None);
            self.start_count();
        } else if reached > self.store.paged_rows() {
            self.store.raise_optimistic(reached);
            if self.store.counted().is_some_and(|counted| counted < reached) {
                self.store.set_counted(None);
                self.start_count();
            }
        }
        self.clear_background_placeholder(&load);
        for dummy in stale_dummies {
            let referenced = (load.first_page..=load.last_page)
                .any(|page| self.store.page_ids(page).contains(&dummy));
            if !referenced {
                self.tracker.unregister(dummy);
            }
        }
        debug!(
            target: "pagegrid_table::paging",
            received,
            changed = changed.len(),
            "background load completed"
        );

        if self.store.row_count() != rows_before {
            self.emit(TableEvent::DataChanged);
        } else if !changed.is_empty() {
            self.emit(TableEvent::RowsChanged(changed));
        }
    }

    fn diff_slot(&self, row: usize, record: &Record, dummy: ProxyId) -> SlotAction {
        let page_size = self.store.page_size();
        let current = self
            .store
            .page(row / page_size)
            .and_then(|slots| slots.get(row % page_size).copied().flatten())
            .filter(|id| *id != dummy);
        let Some(id) = current else {
            return SlotAction::Replace(None);
        };
        let Some(proxy) = self.tracker.get(id) else {
            return SlotAction::Replace(None);
        };
        if proxy.is_dummy() {
            return SlotAction::Replace(Some(id));
        }
        if proxy.record().same_content(record) {
            return SlotAction::Keep;
        }
        let same_record = proxy.record_id().is_some() && proxy.record_id() == record.id.as_ref();
        if same_record && proxy.has_modifications() {
            return SlotAction::Rebase(id);
        }
        SlotAction::Replace(Some(id))
    }

    /// Put `id` at `row`, growing the page as needed.
    fn place(&mut self, row: usize, id: ProxyId) {
        let page_size = self.store.page_size();
        let (page, slot) = (row / page_size, row % page_size);
        if !self.store.contains_page(page) {
            self.store.insert_page(page, Vec::new());
        }
        if let Some(slots) = self.store.page_mut(page) {
            if slots.len() <= slot {
                slots.resize(slot + 1, None);
            }
            slots[slot] = Some(id);
        }
    }
}
