//! Registry of every live proxy of one table.
//!
//! The tracker owns the proxies; page stores and delegates refer to them by
//! [`ProxyId`]. Aggregate state (any modification, any execution, worst
//! validation) is kept incrementally and announced only when it flips.

use crate::events::EventBus;
use crate::proxy::{ProxyId, RowProxy};
use crate::validation::{keep_worst, ValidationResult};
use crossbeam_channel::Receiver;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::trace;

/// Aggregate signals emitted by a tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    ModificationStateChanged(bool),
    ProcessStateChanged(bool),
    ValidationStateChanged(ValidationResult),
}

/// Snapshot of the aggregate state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackerSummary {
    pub modified: bool,
    pub executing: bool,
    pub validation: ValidationResult,
}

#[derive(Debug, Default)]
pub struct BeanStateTracker {
    proxies: HashMap<ProxyId, RowProxy>,
    modified: BTreeSet<ProxyId>,
    executing: BTreeSet<ProxyId>,
    invalid: BTreeMap<ProxyId, ValidationResult>,
    summary: TrackerSummary,
    events: EventBus<TrackerEvent>,
}

impl BeanStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `proxy` and prime its validation cache.
    pub fn register(&mut self, mut proxy: RowProxy) -> ProxyId {
        proxy.prime_validation();
        let id = proxy.id();
        self.proxies.insert(id, proxy);
        self.sync(id);
        id
    }

    /// Remove and dispose the proxy `id`.
    ///
    /// # Returns
    /// `true` if the proxy was registered.
    pub fn unregister(&mut self, id: ProxyId) -> bool {
        match self.take(id) {
            Some(proxy) => {
                proxy.dispose();
                true
            }
            None => false,
        }
    }

    /// Remove the proxy `id` without disposing it.
    pub fn take(&mut self, id: ProxyId) -> Option<RowProxy> {
        let proxy = self.proxies.remove(&id)?;
        self.modified.remove(&id);
        self.executing.remove(&id);
        self.invalid.remove(&id);
        self.publish();
        trace!(target: "pagegrid_core::tracker", bean = %id, "unregistered");
        Some(proxy)
    }

    pub fn get(&self, id: ProxyId) -> Option<&RowProxy> {
        self.proxies.get(&id)
    }

    pub fn contains(&self, id: ProxyId) -> bool {
        self.proxies.contains_key(&id)
    }

    /// Mutate one proxy and refresh the aggregate state afterwards.
    pub fn update<R>(&mut self, id: ProxyId, f: impl FnOnce(&mut RowProxy) -> R) -> Option<R> {
        let proxy = self.proxies.get_mut(&id)?;
        let result = f(proxy);
        self.sync(id);
        Some(result)
    }

    fn sync(&mut self, id: ProxyId) {
        let Some(proxy) = self.proxies.get(&id) else {
            return;
        };
        if proxy.has_modifications() && !proxy.is_dummy() {
            self.modified.insert(id);
        } else {
            self.modified.remove(&id);
        }
        if proxy.has_execution() {
            self.executing.insert(id);
        } else {
            self.executing.remove(&id);
        }
        let validation = proxy.validation_result();
        if validation.is_ok() || proxy.is_dummy() {
            self.invalid.remove(&id);
        } else {
            self.invalid.insert(id, validation);
        }
        self.publish();
    }

    fn publish(&mut self) {
        let mut worst = None;
        for result in self.invalid.values() {
            keep_worst(&mut worst, result.clone());
        }
        let next = TrackerSummary {
            modified: !self.modified.is_empty(),
            executing: !self.executing.is_empty(),
            validation: worst.unwrap_or_default(),
        };
        if next.modified != self.summary.modified {
            self.events
                .emit(TrackerEvent::ModificationStateChanged(next.modified));
        }
        if next.executing != self.summary.executing {
            self.events
                .emit(TrackerEvent::ProcessStateChanged(next.executing));
        }
        if next.validation.severity() != self.summary.validation.severity() {
            self.events
                .emit(TrackerEvent::ValidationStateChanged(next.validation.clone()));
        }
        self.summary = next;
    }

    /// Transient, modified beans (excluding the trailing new-row editor).
    pub fn to_create(&self) -> Vec<ProxyId> {
        self.modified
            .iter()
            .copied()
            .filter(|id| {
                self.proxies
                    .get(id)
                    .is_some_and(|proxy| proxy.is_transient() && !proxy.is_last_row_dummy())
            })
            .collect()
    }

    /// Persisted, modified beans.
    pub fn to_update(&self) -> Vec<ProxyId> {
        self.modified
            .iter()
            .copied()
            .filter(|id| self.proxies.get(id).is_some_and(RowProxy::is_persisted))
            .collect()
    }

    pub fn has_modifications(&self) -> bool {
        self.summary.modified
    }

    pub fn has_executions(&self) -> bool {
        self.summary.executing
    }

    pub fn worst_validation(&self) -> &ValidationResult {
        &self.summary.validation
    }

    pub fn summary(&self) -> &TrackerSummary {
        &self.summary
    }

    pub fn is_modified(&self, id: ProxyId) -> bool {
        self.modified.contains(&id)
    }

    pub fn is_executing(&self, id: ProxyId) -> bool {
        self.executing.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ProxyId> + '_ {
        self.proxies.keys().copied()
    }

    /// Subscribe to aggregate-state changes. Drop the receiver to unsubscribe.
    pub fn subscribe(&mut self) -> Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Dispose every proxy.
    pub fn clear(&mut self) {
        for (_, proxy) in self.proxies.drain() {
            proxy.dispose();
        }
        self.modified.clear();
        self.executing.clear();
        self.invalid.clear();
        self.publish();
    }
}
