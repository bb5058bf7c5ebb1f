//! Refresh and delete delegates.

use super::{BeanBatch, BeanTable, Inflight};
use crate::events::TableEvent;
use crate::protocol::{dispatch, Outcome};
use crate::TableError;
use pagegrid_core::error::ServiceError;
use pagegrid_core::execution::ExecutionHandle;
use pagegrid_core::model::{Record, RecordId, RecordKey};
use pagegrid_core::proxy::{BeanMessage, ProxyId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl BeanTable {
    /// Distinct, idle, persisted beans at `rows` with their keys.
    fn persisted_beans(&self, rows: &[usize]) -> Vec<(ProxyId, RecordKey)> {
        let mut beans: Vec<(ProxyId, RecordKey)> = Vec::new();
        for row in rows {
            let Some(id) = self.store.slot(*row) else {
                continue;
            };
            if beans.iter().any(|(seen, _)| *seen == id) {
                continue;
            }
            let Some(proxy) = self.tracker.get(id) else {
                continue;
            };
            if !proxy.is_persisted() || proxy.has_execution() {
                continue;
            }
            if let Some(key) = proxy.record().key() {
                beans.push((id, key));
            }
        }
        beans
    }

    fn attach_batch(&mut self, label: &'static str, beans: &[ProxyId]) -> ExecutionHandle {
        let handle = ExecutionHandle::new(label);
        for id in beans {
            self.tracker
                .update(*id, |proxy| proxy.attach_execution(handle.clone()));
        }
        self.emit_rows(beans);
        handle
    }

    /// Re-read the persisted beans at `rows` from the refresh service.
    ///
    /// Pending edits are re-applied over the fresh records. Beans whose
    /// record is gone get a warning message.
    ///
    /// # Returns
    /// Number of beans being refreshed.
    ///
    /// # Errors
    /// Returns [`TableError::MissingService`] if no refresh service is configured.
    pub fn refresh_beans(&mut self, rows: &[usize]) -> Result<usize, TableError> {
        let refresher = self
            .services
            .refresh
            .clone()
            .ok_or(TableError::MissingService("refresh"))?;
        let beans = self.persisted_beans(rows);
        if beans.is_empty() {
            return Ok(0);
        }
        let (ids, keys): (Vec<ProxyId>, Vec<RecordKey>) = beans.into_iter().unzip();
        let handle = self.attach_batch("refresh", &ids);
        dispatch(
            self.runner.as_ref(),
            None,
            &handle,
            &self.completion_tx,
            move |token| Outcome::Records(refresher.refresh(keys, token)),
        );
        debug!(target: "pagegrid_table::save", beans = ids.len(), "refresh started");
        let count = ids.len();
        self.inflight.insert(
            handle.id(),
            Inflight::Refresh(BeanBatch { handle, beans: ids }),
        );
        Ok(count)
    }

    pub(super) fn finish_refresh(&mut self, batch: BeanBatch, outcome: Outcome) {
        let execution = batch.handle.id();
        let result = match outcome {
            Outcome::Records(result) => result,
            other => Err(ServiceError::Backend(format!(
                "unexpected refresh outcome: {:?}",
                other
            ))),
        };
        match result {
            Ok(records) => {
                let mut fresh: HashMap<RecordId, Record> = records
                    .into_iter()
                    .filter_map(|record| record.id.clone().map(|id| (id, record)))
                    .collect();
                for id in &batch.beans {
                    let record = self
                        .tracker
                        .get(*id)
                        .and_then(|proxy| proxy.record_id())
                        .and_then(|record_id| fresh.remove(record_id));
                    self.tracker.update(*id, |proxy| {
                        proxy.detach_execution(execution);
                        match record {
                            Some(record) => {
                                proxy.clear_messages();
                                proxy.rebase(Arc::new(record));
                            }
                            None => {
                                let id = proxy
                                    .record_id()
                                    .map(ToString::to_string)
                                    .unwrap_or_default();
                                let gone = ServiceError::DeletedBean { id };
                                proxy.add_message(BeanMessage::warning(gone.user_message()));
                            }
                        }
                    });
                }
            }
            Err(err) if err.is_cancellation() => {
                for id in &batch.beans {
                    self.tracker
                        .update(*id, |proxy| proxy.detach_execution(execution));
                }
            }
            Err(err) => {
                warn!(target: "pagegrid_table::save", error = %err, "refresh failed");
                for id in &batch.beans {
                    self.tracker
                        .update(*id, |proxy| proxy.detach_execution(execution));
                }
                self.attach_message(&batch.beans, &BeanMessage::error(err.user_message()));
            }
        }
        self.drop_orphans();
        self.emit_rows(&batch.beans);
    }

    /// Delete the beans at `rows`.
    ///
    /// Added beans that were never saved are dropped right away. Persisted
    /// beans go to the deleter; the table reloads once it succeeds.
    ///
    /// # Returns
    /// Number of beans removed or scheduled for deletion.
    ///
    /// # Errors
    /// Returns [`TableError::MissingService`] without touching anything if
    /// persisted beans are involved and no deleter is configured.
    pub fn delete_rows(&mut self, rows: &[usize]) -> Result<usize, TableError> {
        let persisted = self.persisted_beans(rows);
        let deleter = match (persisted.is_empty(), self.services.deleter.clone()) {
            (true, _) => None,
            (false, Some(deleter)) => Some(deleter),
            (false, None) => return Err(TableError::MissingService("deleter")),
        };

        let mut transient: Vec<(usize, ProxyId)> = rows
            .iter()
            .filter_map(|row| self.store.slot(*row).map(|id| (*row, id)))
            .filter(|(_, id)| {
                self.store.added().contains(id)
                    && self
                        .tracker
                        .get(*id)
                        .is_some_and(|proxy| proxy.is_transient() && !proxy.has_execution())
            })
            .collect();
        transient.sort_unstable();
        transient.dedup();
        let mut removed_rows = Vec::with_capacity(transient.len());
        for (row, id) in &transient {
            self.store.remove_added(*id);
            if self.selection.remove(*id) {
                self.selection_dirty = true;
            }
            self.tracker.unregister(*id);
            removed_rows.push(*row);
        }
        if !removed_rows.is_empty() {
            self.emit(TableEvent::BeansRemoved(removed_rows));
            self.flush_selection();
        }

        let mut scheduled = 0;
        if let Some(deleter) = deleter {
            let (ids, keys): (Vec<ProxyId>, Vec<RecordKey>) = persisted.into_iter().unzip();
            let handle = self.attach_batch("delete", &ids);
            dispatch(
                self.runner.as_ref(),
                None,
                &handle,
                &self.completion_tx,
                move |token| Outcome::Deleted(deleter.delete(keys, token)),
            );
            debug!(target: "pagegrid_table::save", beans = ids.len(), "delete started");
            scheduled = ids.len();
            self.inflight
                .insert(handle.id(), Inflight::Delete(BeanBatch { handle, beans: ids }));
        }
        Ok(transient.len() + scheduled)
    }

    pub(super) fn finish_delete(&mut self, batch: BeanBatch, outcome: Outcome) {
        let execution = batch.handle.id();
        let result = match outcome {
            Outcome::Deleted(result) => result,
            other => Err(ServiceError::Backend(format!(
                "unexpected delete outcome: {:?}",
                other
            ))),
        };
        match result {
            Ok(()) => {
                let mut rows: Vec<usize> = batch
                    .beans
                    .iter()
                    .filter_map(|id| self.store.row_of(*id))
                    .collect();
                rows.sort_unstable();
                for id in &batch.beans {
                    if self.selection.remove(*id) {
                        self.selection_dirty = true;
                    }
                    self.retained.retain(|_, retained| *retained != *id);
                    self.store.remove_added(*id);
                    self.tracker.unregister(*id);
                }
                info!(
                    target: "pagegrid_table::save",
                    beans = batch.beans.len(),
                    "delete completed"
                );
                if !rows.is_empty() {
                    self.emit(TableEvent::BeansRemoved(rows));
                }
                self.load();
            }
            Err(err) if err.is_cancellation() => {
                self.detach_all(&batch.beans, execution);
            }
            Err(err) => {
                warn!(target: "pagegrid_table::save", error = %err, "delete failed");
                self.detach_all(&batch.beans, execution);
                self.attach_message(&batch.beans, &BeanMessage::error(err.user_message()));
            }
        }
    }
}
