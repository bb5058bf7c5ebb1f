//! In-memory implementation of every service contract.
//!
//! Used by the demo CLI and by tests: it honours filters, sorting, paging
//! and record versions, can simulate latency, records each call, and can be
//! told to fail the next call of a given kind.

use crate::constants::PARENT_PROPERTY;
use crate::error::ServiceError;
use crate::execution::CancelToken;
use crate::model::{
    CountRequest, Filter, ReadRequest, Record, RecordData, RecordId, RecordKey,
    RecordModification, SortKey, Value,
};
use crate::service::{CreatorService, DeleterService, ReaderService, RefreshService, UpdaterService};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Kind of service call, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceOp {
    Read,
    Count,
    Create,
    Update,
    Delete,
    Refresh,
}

/// One call as observed by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Read { offset: usize, limit: usize },
    Count,
    Create { beans: usize },
    Update { beans: usize },
    Delete { beans: usize },
    Refresh { beans: usize },
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<Record>,
    calls: Vec<ServiceCall>,
    failures: HashMap<ServiceOp, VecDeque<ServiceError>>,
}

#[derive(Debug, Default)]
pub struct MemoryService {
    state: Mutex<MemoryState>,
    latency: Duration,
}

impl MemoryService {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                records,
                ..MemoryState::default()
            }),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call by `latency`, polling for cancellation meanwhile.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call of kind `op` fail with `error`.
    pub fn fail_next(&self, op: ServiceOp, error: ServiceError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// `(offset, limit)` of every read call observed so far.
    pub fn read_calls(&self) -> Vec<(usize, usize)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ServiceCall::Read { offset, limit } => Some((*offset, *limit)),
                _ => None,
            })
            .collect()
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Insert a record at `index` (clamped), as a concurrent writer would.
    pub fn insert(&self, index: usize, record: Record) {
        let mut state = self.lock();
        let index = index.min(state.records.len());
        state.records.insert(index, record);
    }

    pub fn push(&self, record: Record) {
        self.lock().records.push(record);
    }

    pub fn remove(&self, id: &RecordId) -> Option<Record> {
        let mut state = self.lock();
        let index = state
            .records
            .iter()
            .position(|record| record.id.as_ref() == Some(id))?;
        Some(state.records.remove(index))
    }

    /// Keep only the first `len` records.
    pub fn truncate(&self, len: usize) {
        self.lock().records.truncate(len);
    }

    /// Change one value out-of-band and bump the record version.
    pub fn set_value(&self, id: &RecordId, property: &str, value: Value) -> bool {
        let mut state = self.lock();
        let Some(record) = state
            .records
            .iter_mut()
            .find(|record| record.id.as_ref() == Some(id))
        else {
            return false;
        };
        record.values.insert(property.to_string(), value);
        record.version += 1;
        true
    }

    fn begin(
        &self,
        op: ServiceOp,
        call: ServiceCall,
        cancel: &CancelToken,
    ) -> Result<(), ServiceError> {
        {
            let mut state = self.lock();
            state.calls.push(call);
            if let Some(error) = state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
                return Err(error);
            }
        }
        self.wait(cancel)
    }

    fn wait(&self, cancel: &CancelToken) -> Result<(), ServiceError> {
        let deadline = Instant::now() + self.latency;
        loop {
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(CANCEL_POLL_INTERVAL.min(deadline - now));
        }
    }

    fn matching(
        records: &[Record],
        parent_keys: &[RecordId],
        filter: Option<&Filter>,
        sort: &[SortKey],
    ) -> Vec<Record> {
        let mut rows: Vec<Record> = records
            .iter()
            .filter(|record| {
                parent_keys.is_empty()
                    || matches!(
                        record.value(PARENT_PROPERTY),
                        Some(Value::Text(parent))
                            if parent_keys.iter().any(|key| key.as_str() == parent)
                    )
            })
            .filter(|record| filter.map_or(true, |filter| filter.matches(record)))
            .cloned()
            .collect();
        if !sort.is_empty() {
            rows.sort_by(|a, b| {
                sort.iter()
                    .map(|key| key.compare(a, b))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        rows
    }

    fn check_key(records: &[Record], key: &RecordKey) -> Result<usize, ServiceError> {
        let index = records
            .iter()
            .position(|record| record.id.as_ref() == Some(&key.id))
            .ok_or_else(|| ServiceError::DeletedBean {
                id: key.id.to_string(),
            })?;
        if records[index].version != key.version {
            return Err(ServiceError::StaleBean {
                id: key.id.to_string(),
            });
        }
        Ok(index)
    }
}

impl ReaderService for MemoryService {
    fn read(
        &self,
        request: &ReadRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, ServiceError> {
        self.begin(
            ServiceOp::Read,
            ServiceCall::Read {
                offset: request.offset,
                limit: request.limit,
            },
            cancel,
        )?;
        let state = self.lock();
        let rows = Self::matching(
            &state.records,
            &request.parent_keys,
            request.filter.as_ref(),
            &request.sort,
        );
        let window: Vec<Record> = rows
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        debug!(
            target: "pagegrid_core::memory",
            offset = request.offset,
            limit = request.limit,
            returned = window.len(),
            "read"
        );
        Ok(window)
    }

    fn count(&self, request: &CountRequest, cancel: &CancelToken) -> Result<usize, ServiceError> {
        self.begin(ServiceOp::Count, ServiceCall::Count, cancel)?;
        let state = self.lock();
        Ok(Self::matching(
            &state.records,
            &request.parent_keys,
            request.filter.as_ref(),
            &[],
        )
        .len())
    }
}

impl CreatorService for MemoryService {
    fn create(
        &self,
        data: Vec<RecordData>,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, ServiceError> {
        self.begin(
            ServiceOp::Create,
            ServiceCall::Create { beans: data.len() },
            cancel,
        )?;
        let created: Vec<Record> = data
            .into_iter()
            .map(|values| Record::persisted(RecordId::generate(), 1, values))
            .collect();
        self.lock().records.extend(created.iter().cloned());
        Ok(created)
    }
}

impl UpdaterService for MemoryService {
    fn update(
        &self,
        modifications: Vec<RecordModification>,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, ServiceError> {
        self.begin(
            ServiceOp::Update,
            ServiceCall::Update {
                beans: modifications.len(),
            },
            cancel,
        )?;
        let mut state = self.lock();
        let indexes = modifications
            .iter()
            .map(|modification| Self::check_key(&state.records, &modification.key))
            .collect::<Result<Vec<_>, _>>()?;
        let mut updated = Vec::with_capacity(indexes.len());
        for (index, modification) in indexes.into_iter().zip(modifications) {
            let record = &mut state.records[index];
            record.values.extend(modification.changes);
            record.version += 1;
            updated.push(record.clone());
        }
        Ok(updated)
    }
}

impl DeleterService for MemoryService {
    fn delete(&self, keys: Vec<RecordKey>, cancel: &CancelToken) -> Result<(), ServiceError> {
        self.begin(ServiceOp::Delete, ServiceCall::Delete { beans: keys.len() }, cancel)?;
        let mut state = self.lock();
        for key in &keys {
            Self::check_key(&state.records, key)?;
        }
        state
            .records
            .retain(|record| !keys.iter().any(|key| record.id.as_ref() == Some(&key.id)));
        Ok(())
    }
}

impl RefreshService for MemoryService {
    fn refresh(
        &self,
        keys: Vec<RecordKey>,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, ServiceError> {
        self.begin(
            ServiceOp::Refresh,
            ServiceCall::Refresh { beans: keys.len() },
            cancel,
        )?;
        let state = self.lock();
        Ok(keys
            .iter()
            .filter_map(|key| {
                state
                    .records
                    .iter()
                    .find(|record| record.id.as_ref() == Some(&key.id))
                    .cloned()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryService, ServiceCall, ServiceOp};
    use crate::error::ServiceError;
    use crate::execution::CancelToken;
    use crate::model::{
        CountRequest, Filter, ReadRequest, Record, RecordId, RecordModification, SortKey, Value,
    };
    use crate::service::{ReaderService, UpdaterService};
    use std::time::Duration;

    fn service(rows: usize) -> MemoryService {
        MemoryService::new(
            (0..rows)
                .map(|i| {
                    Record::persisted(format!("r{}", i), 1, Default::default())
                        .with("n", i as i64)
                })
                .collect(),
        )
    }

    #[test]
    fn read_applies_offset_limit_and_sort() {
        let service = service(10);
        let request = ReadRequest {
            sort: vec![SortKey::descending("n")],
            offset: 2,
            limit: 3,
            ..ReadRequest::default()
        };
        let rows = service.read(&request, &CancelToken::new()).expect("read");
        let ns: Vec<i64> = rows
            .iter()
            .filter_map(|r| r.value("n").and_then(Value::as_int))
            .collect();
        assert_eq!(ns, vec![7, 6, 5]);
        assert_eq!(service.calls(), vec![ServiceCall::Read { offset: 2, limit: 3 }]);
    }

    #[test]
    fn count_honours_filter() {
        let service = service(10);
        let request = CountRequest {
            filter: Some(Filter::Range {
                property: "n".into(),
                min: Some(Value::Int(5)),
                max: None,
            }),
            ..CountRequest::default()
        };
        assert_eq!(service.count(&request, &CancelToken::new()), Ok(5));
    }

    #[test]
    fn injected_failure_applies_once() {
        let service = service(1);
        service.fail_next(ServiceOp::Count, ServiceError::Timeout);
        let request = CountRequest::default();
        assert_eq!(
            service.count(&request, &CancelToken::new()),
            Err(ServiceError::Timeout)
        );
        assert_eq!(service.count(&request, &CancelToken::new()), Ok(1));
    }

    #[test]
    fn cancelled_token_aborts_slow_call() {
        let service = service(1).with_latency(Duration::from_secs(5));
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(
            service.read(&ReadRequest::default(), &token),
            Err(ServiceError::Cancelled)
        );
    }

    #[test]
    fn update_rejects_stale_versions() {
        let service = service(1);
        let id = RecordId::from("r0");
        service.set_value(&id, "n", Value::Int(99));
        let modification = RecordModification {
            key: crate::model::RecordKey { id, version: 1 },
            changes: Default::default(),
        };
        assert!(matches!(
            service.update(vec![modification], &CancelToken::new()),
            Err(ServiceError::StaleBean { .. })
        ));
    }
}
