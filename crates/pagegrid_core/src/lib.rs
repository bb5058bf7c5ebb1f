//! Core domain library for pagegrid (records, proxies, validation, services).

/// Configuration loading and defaults.
pub mod config;
/// Shared tuning constants.
pub mod constants;
#[cfg(test)]
mod env;
/// Service error types.
pub mod error;
/// Multicast event channels.
pub mod events;
/// Cancellable execution handles.
pub mod execution;
/// In-memory service implementation for demos and tests.
pub mod memory;
/// Records, values and request payloads.
pub mod model;
/// Editable row proxies.
pub mod proxy;
/// Service contracts.
pub mod service;
/// Aggregate proxy state tracking.
pub mod tracker;
/// Validators and cached validation results.
pub mod validation;

pub use config::{SavePolicy, TableConfig};
pub use error::ServiceError;
pub use execution::{CancelToken, ExecutionHandle, ExecutionId};
pub use memory::MemoryService;
pub use model::{Record, RecordData, RecordId, RecordKey, Value};
pub use proxy::{BeanProxyFactory, ProxyId, RowProxy};
pub use service::ServiceSet;
pub use tracker::BeanStateTracker;
