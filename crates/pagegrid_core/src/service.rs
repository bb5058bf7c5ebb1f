//! Contracts the table requires from its backing services.
//!
//! Every call is blocking and runs on a worker thread; the table marshals the
//! outcome back onto its owning thread. Implementations may poll the
//! [`CancelToken`] and bail out with [`ServiceError::Cancelled`].

use crate::error::ServiceError;
use crate::execution::CancelToken;
use crate::model::{CountRequest, ReadRequest, Record, RecordData, RecordKey, RecordModification};
use std::fmt;
use std::sync::Arc;

pub trait ReaderService: Send + Sync {
    /// Ordered window of records.
    fn read(
        &self,
        request: &ReadRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, ServiceError>;

    /// Total number of records matching the request.
    fn count(&self, request: &CountRequest, cancel: &CancelToken) -> Result<usize, ServiceError>;
}

pub trait CreatorService: Send + Sync {
    /// Create one record per entry; results are returned in input order.
    fn create(
        &self,
        data: Vec<RecordData>,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, ServiceError>;
}

pub trait UpdaterService: Send + Sync {
    /// Apply modifications; results are returned in input order.
    fn update(
        &self,
        modifications: Vec<RecordModification>,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, ServiceError>;
}

pub trait DeleterService: Send + Sync {
    fn delete(&self, keys: Vec<RecordKey>, cancel: &CancelToken) -> Result<(), ServiceError>;
}

pub trait RefreshService: Send + Sync {
    /// Current state of the given records; deleted records are omitted.
    fn refresh(
        &self,
        keys: Vec<RecordKey>,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, ServiceError>;
}

/// The services one table talks to. Only the reader is mandatory.
#[derive(Clone)]
pub struct ServiceSet {
    pub reader: Arc<dyn ReaderService>,
    pub creator: Option<Arc<dyn CreatorService>>,
    pub updater: Option<Arc<dyn UpdaterService>>,
    pub deleter: Option<Arc<dyn DeleterService>>,
    pub refresh: Option<Arc<dyn RefreshService>>,
}

impl fmt::Debug for ServiceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSet")
            .field("creator", &self.creator.is_some())
            .field("updater", &self.updater.is_some())
            .field("deleter", &self.deleter.is_some())
            .field("refresh", &self.refresh.is_some())
            .finish()
    }
}

impl ServiceSet {
    pub fn read_only(reader: Arc<dyn ReaderService>) -> Self {
        Self {
            reader,
            creator: None,
            updater: None,
            deleter: None,
            refresh: None,
        }
    }

    /// Use one object for every service.
    pub fn full<S>(service: Arc<S>) -> Self
    where
        S: ReaderService
            + CreatorService
            + UpdaterService
            + DeleterService
            + RefreshService
            + 'static,
    {
        Self {
            reader: service.clone(),
            creator: Some(service.clone()),
            updater: Some(service.clone()),
            deleter: Some(service.clone()),
            refresh: Some(service),
        }
    }

    pub fn with_creator(mut self, creator: Arc<dyn CreatorService>) -> Self {
        self.creator = Some(creator);
        self
    }

    pub fn with_updater(mut self, updater: Arc<dyn UpdaterService>) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn with_deleter(mut self, deleter: Arc<dyn DeleterService>) -> Self {
        self.deleter = Some(deleter);
        self
    }

    pub fn with_refresh(mut self, refresh: Arc<dyn RefreshService>) -> Self {
        self.refresh = Some(refresh);
        self
    }
}
