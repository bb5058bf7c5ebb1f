//! Root crate facade for pagegrid.
//!
//! Re-exports the record/proxy model from `pagegrid_core` and the paging
//! engine from `pagegrid_table` so applications depend on one crate.

pub use pagegrid_core::{
    config, constants, error, events, execution, memory, model, proxy, service, tracker,
    validation, BeanProxyFactory, BeanStateTracker, CancelToken, ExecutionHandle, ExecutionId,
    MemoryService, ProxyId, Record, RecordData, RecordId, RecordKey, RowProxy, SavePolicy,
    ServiceError, ServiceSet, TableConfig, Value,
};
pub use pagegrid_table::{
    BeanTable, CellDisplay, CellState, Job, JobRunner, ManualRunner, Query, TableError,
    TableEvent, ThreadPoolRunner,
};
