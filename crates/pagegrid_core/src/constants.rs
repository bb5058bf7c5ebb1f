//! Shared constants used across pagegrid crates.

/// Default number of rows fetched and evicted as one page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Extra records requested past the end of every page read.
///
/// Absorbs off-by-one drift when rows are inserted or deleted on the server
/// between two page reads.
pub const DEFAULT_PAGE_OVERLAP: usize = 2;

/// Delay before an interior (non-edge) page read is issued, in milliseconds.
pub const DEFAULT_INNER_PAGE_DELAY_MS: u64 = 80;

/// Default number of worker threads for service calls.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Text rendered in place of a cell whose page failed to load.
pub const FAILED_CELL_TEXT: &str = "---";

/// Property consulted by the in-memory service when parent keys are supplied.
pub const PARENT_PROPERTY: &str = "parent_id";
