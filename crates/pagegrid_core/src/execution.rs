//! Cancellable execution handles for in-flight asynchronous operations.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared cancellation flag handed to every service call.
///
/// Services may poll it while working; the table checks the owning handle
/// again when the result comes back.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Process-unique id of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExecutionId(u64);

impl ExecutionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exec-{}", self.0)
    }
}

/// One in-flight asynchronous operation (page read, count, save, refresh).
///
/// Clones share the cancellation flag.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    id: ExecutionId,
    label: &'static str,
    token: CancelToken,
}

impl ExecutionHandle {
    pub fn new(label: &'static str) -> Self {
        Self {
            id: ExecutionId::next(),
            label,
            token: CancelToken::new(),
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Short description of what the execution does, used in logs.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Request cancellation; calling it again has no further effect.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl PartialEq for ExecutionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ExecutionHandle {}
