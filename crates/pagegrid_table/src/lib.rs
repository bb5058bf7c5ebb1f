//! Virtualized paging engine for pagegrid.
//!
//! A [`BeanTable`] projects a paged reader service onto rows of editable
//! proxies. Pages are fetched on demand by cancellable loaders, the total
//! row count is reconciled in the background, and saves, refreshes and
//! deletes are delegated to the configured services.

/// Display state of individual cells.
pub mod cell;
/// Errors returned by table operations.
pub mod error;
/// Outward table notifications.
pub mod events;
mod protocol;
/// Job runners executing service calls.
pub mod runner;
mod selection;
mod store;
mod table;

#[cfg(test)]
mod tests;

pub use cell::{CellDisplay, CellState};
pub use error::TableError;
pub use events::TableEvent;
pub use runner::{Job, JobRunner, ManualRunner, ThreadPoolRunner};
pub use table::{BeanTable, Query};
