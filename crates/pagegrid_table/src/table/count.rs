//! Total-row-count loader.

use super::{BeanTable, Inflight};
use crate::events::TableEvent;
use crate::protocol::{dispatch, Outcome};
use pagegrid_core::execution::{ExecutionHandle, ExecutionId};
use tracing::{debug, info, warn};

impl BeanTable {
    /// Fetch the total row count again.
    pub fn recount(&mut self) {
        self.start_count();
    }

    pub(super) fn start_count(&mut self) {
        self.cancel_count();
        let handle = ExecutionHandle::new("count");
        let reader = self.services.reader.clone();
        let request = self.query.count();
        dispatch(
            self.runner.as_ref(),
            None,
            &handle,
            &self.completion_tx,
            move |token| Outcome::Count(reader.count(&request, token)),
        );
        debug!(target: "pagegrid_table::count", execution = %handle.id(), "count started");
        self.count = Some(handle.id());
        self.inflight.insert(handle.id(), Inflight::Count(handle));
    }

    pub(super) fn cancel_count(&mut self) -> bool {
        let Some(execution) = self.count.take() else {
            return false;
        };
        match self.inflight.remove(&execution) {
            Some(Inflight::Count(handle)) => {
                handle.cancel();
                true
            }
            Some(other) => {
                self.inflight.insert(execution, other);
                false
            }
            None => false,
        }
    }

    pub(super) fn finish_count(&mut self, handle: ExecutionHandle, outcome: Outcome) {
        if self.count == Some(handle.id()) {
            self.count = None;
        }
        let result = match outcome {
            Outcome::Count(result) => result,
            other => {
                warn!(
                    target: "pagegrid_table::count",
                    outcome = ?other,
                    "unexpected count outcome"
                );
                return;
            }
        };
        let counted = match result {
            Ok(counted) => counted,
            Err(err) if err.is_cancellation() => return,
            Err(err) => {
                warn!(target: "pagegrid_table::count", error = %err, "count failed");
                return;
            }
        };
        if self.config.trace_loaders {
            info!(target: "pagegrid_table::count", counted, "count perf");
        }

        let rows_before = self.store.row_count();
        let paged_before = self.store.paged_rows();
        self.store.set_counted(Some(counted));
        if counted < self.store.optimistic() {
            self.shrink_to(counted);
        } else if counted > paged_before {
            self.extend_placeholders();
        }
        debug!(
            target: "pagegrid_table::count",
            counted,
            row_count = self.store.row_count(),
            "count applied"
        );
        if self.store.row_count() != rows_before {
            self.emit(TableEvent::DataChanged);
        }
    }

    /// Evict everything at or beyond `rows`.
    fn shrink_to(&mut self, rows: usize) {
        let doomed: Vec<ExecutionId> = self
            .inflight
            .iter()
            .filter_map(|(execution, inflight)| match inflight {
                Inflight::Page(load) if self.store.page_start(load.page) >= rows => {
                    Some(*execution)
                }
                _ => None,
            })
            .collect();
        for execution in doomed {
            self.cancel_load(execution);
        }
        for id in self.store.truncate(rows) {
            self.release(id);
        }
        debug!(target: "pagegrid_table::count", rows, "row count shrank; trailing rows evicted");
    }

    /// Grow in-flight placeholders up to the new page bounds.
    fn extend_placeholders(&mut self) {
        let loads: Vec<(usize, _)> = self
            .inflight
            .values()
            .filter_map(|inflight| match inflight {
                Inflight::Page(load) => Some((load.page, load.dummy)),
                _ => None,
            })
            .collect();
        for (page, dummy) in loads {
            let bound = self.store.page_bound(page);
            if let Some(slots) = self.store.page_mut(page) {
                if slots.len() < bound {
                    slots.resize(bound, Some(dummy));
                }
            }
        }
    }
}
