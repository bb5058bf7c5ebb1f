//! Save delegate: sends the tracker's dirty beans to the creator/updater.

use super::{BeanTable, Inflight};
use crate::protocol::{dispatch, Outcome};
use crate::TableError;
use pagegrid_core::config::SavePolicy;
use pagegrid_core::execution::ExecutionHandle;
use pagegrid_core::model::{RecordData, RecordModification};
use pagegrid_core::proxy::{BeanMessage, ProxyId};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaveKind {
    Create,
    Update,
}

/// One create or update request and the values each bean sent.
#[derive(Debug)]
pub(crate) struct SaveBatch {
    pub(super) handle: ExecutionHandle,
    pub(super) kind: SaveKind,
    pub(super) beans: Vec<(ProxyId, RecordData)>,
}

fn batches(ids: Vec<ProxyId>, policy: SavePolicy) -> Vec<Vec<ProxyId>> {
    match policy {
        SavePolicy::PerBean => ids.into_iter().map(|id| vec![id]).collect(),
        SavePolicy::Batch if ids.is_empty() => Vec::new(),
        SavePolicy::Batch => vec![ids],
    }
}

impl BeanTable {
    /// Save every modified bean.
    ///
    /// Transient beans go to the creator, persisted ones to the updater,
    /// grouped per [`SavePolicy`]. Beans that already have an operation in
    /// flight are skipped. Edits made while a save runs are kept and
    /// re-applied over the saved record.
    ///
    /// # Returns
    /// Number of requests started.
    ///
    /// # Errors
    /// Returns [`TableError::MissingService`] without starting anything if a
    /// needed creator or updater is not configured.
    pub fn save(&mut self) -> Result<usize, TableError> {
        let idle = |table: &Self, id: &ProxyId| {
            table
                .tracker
                .get(*id)
                .is_some_and(|proxy| !proxy.has_execution())
        };
        let creates: Vec<ProxyId> = self
            .tracker
            .to_create()
            .into_iter()
            .filter(|id| idle(self, id))
            .collect();
        let updates: Vec<ProxyId> = self
            .tracker
            .to_update()
            .into_iter()
            .filter(|id| idle(self, id))
            .collect();
        if !creates.is_empty() && self.services.creator.is_none() {
            return Err(TableError::MissingService("creator"));
        }
        if !updates.is_empty() && self.services.updater.is_none() {
            return Err(TableError::MissingService("updater"));
        }

        let policy = self.config.save_policy;
        let (create_count, update_count) = (creates.len(), updates.len());
        let mut started = 0;
        for group in batches(creates, policy) {
            self.start_save(SaveKind::Create, group);
            started += 1;
        }
        for group in batches(updates, policy) {
            self.start_save(SaveKind::Update, group);
            started += 1;
        }
        info!(
            target: "pagegrid_table::save",
            creates = create_count,
            updates = update_count,
            requests = started,
            "save started"
        );
        Ok(started)
    }

    fn start_save(&mut self, kind: SaveKind, ids: Vec<ProxyId>) {
        let handle = ExecutionHandle::new(match kind {
            SaveKind::Create => "create",
            SaveKind::Update => "update",
        });
        let mut beans = Vec::with_capacity(ids.len());
        let mut modifications = Vec::new();
        for id in ids {
            let snapshot = self.tracker.update(id, |proxy| {
                proxy.clear_messages();
                proxy.attach_execution(handle.clone());
                match kind {
                    SaveKind::Create => (proxy.current_values(), None),
                    SaveKind::Update => (proxy.changed_values(), proxy.record().key()),
                }
            });
            let Some((sent, key)) = snapshot else {
                continue;
            };
            if let Some(key) = key {
                modifications.push(RecordModification {
                    key,
                    changes: sent.clone(),
                });
            }
            beans.push((id, sent));
        }

        match kind {
            SaveKind::Create => {
                let Some(creator) = self.services.creator.clone() else {
                    return;
                };
                let data: Vec<RecordData> = beans.iter().map(|(_, sent)| sent.clone()).collect();
                dispatch(
                    self.runner.as_ref(),
                    None,
                    &handle,
                    &self.completion_tx,
                    move |token| Outcome::Records(creator.create(data, token)),
                );
            }
            SaveKind::Update => {
                let Some(updater) = self.services.updater.clone() else {
                    return;
                };
                dispatch(
                    self.runner.as_ref(),
                    None,
                    &handle,
                    &self.completion_tx,
                    move |token| Outcome::Records(updater.update(modifications, token)),
                );
            }
        }
        debug!(
            target: "pagegrid_table::save",
            kind = ?kind,
            beans = beans.len(),
            execution = %handle.id(),
            "save request queued"
        );
        let ids: Vec<ProxyId> = beans.iter().map(|(id, _)| *id).collect();
        self.inflight
            .insert(handle.id(), Inflight::Save(SaveBatch { handle, kind, beans }));
        self.emit_rows(&ids);
    }

    pub(super) fn finish_save(&mut self, batch: SaveBatch, outcome: Outcome) {
        let execution = batch.handle.id();
        let ids: Vec<ProxyId> = batch.beans.iter().map(|(id, _)| *id).collect();
        let result = match outcome {
            Outcome::Records(result) => result,
            other => {
                warn!(target: "pagegrid_table::save", outcome = ?other, "unexpected save outcome");
                self.detach_all(&ids, execution);
                return;
            }
        };
        match result {
            Ok(records) => {
                let mut records = records.into_iter();
                let mut missing = Vec::new();
                for (id, sent) in &batch.beans {
                    match records.next() {
                        Some(record) => {
                            self.tracker.update(*id, |proxy| {
                                proxy.detach_execution(execution);
                                proxy.commit_saved(Arc::new(record), sent);
                            });
                        }
                        None => missing.push(*id),
                    }
                }
                if !missing.is_empty() {
                    warn!(
                        target: "pagegrid_table::save",
                        missing = missing.len(),
                        "service returned fewer records than beans sent"
                    );
                    for id in &missing {
                        self.tracker
                            .update(*id, |proxy| proxy.detach_execution(execution));
                    }
                    self.attach_message(
                        &missing,
                        &BeanMessage::error("The service did not return this record."),
                    );
                }
                info!(
                    target: "pagegrid_table::save",
                    kind = ?batch.kind,
                    beans = batch.beans.len() - missing.len(),
                    "save completed"
                );
            }
            Err(err) if err.is_cancellation() => {
                debug!(target: "pagegrid_table::save", kind = ?batch.kind, "save cancelled");
                for id in &ids {
                    self.tracker
                        .update(*id, |proxy| proxy.detach_execution(execution));
                }
            }
            Err(err) => {
                warn!(
                    target: "pagegrid_table::save",
                    kind = ?batch.kind,
                    beans = ids.len(),
                    error = %err,
                    "save failed"
                );
                for id in &ids {
                    self.tracker
                        .update(*id, |proxy| proxy.detach_execution(execution));
                }
                self.attach_message(&ids, &BeanMessage::error(err.user_message()));
            }
        }
        self.drop_orphans();
        self.emit_rows(&ids);
    }
}
