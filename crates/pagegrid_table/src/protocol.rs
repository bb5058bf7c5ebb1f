//! Messages sent from worker jobs back to the table's owning thread.

use crate::runner::JobRunner;
use crossbeam_channel::Sender;
use pagegrid_core::error::ServiceError;
use pagegrid_core::execution::{CancelToken, ExecutionHandle, ExecutionId};
use pagegrid_core::model::Record;
use std::time::{Duration, Instant};

/// Result payload of one finished service call.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// Read, create, update, refresh.
    Records(Result<Vec<Record>, ServiceError>),
    Count(Result<usize, ServiceError>),
    Deleted(Result<(), ServiceError>),
}

/// Completion of the execution `execution`.
///
/// The table applies it only if `execution` still owns an in-flight slot.
/// `outcome` is `None` when the handle was cancelled before or while the call
/// ran.
#[derive(Debug)]
pub(crate) struct Completion {
    pub execution: ExecutionId,
    pub elapsed: Duration,
    pub outcome: Option<Outcome>,
}

/// Queue `call` on `runner` under `handle`, optionally after `delay`.
///
/// The job skips the call when the handle was cancelled before it ran, and
/// drops the result when cancellation arrives while it runs. Either way a
/// completion is sent, so the table can restore whatever the execution held.
pub(crate) fn dispatch<F>(
    runner: &dyn JobRunner,
    delay: Option<Duration>,
    handle: &ExecutionHandle,
    completions: &Sender<Completion>,
    call: F,
) where
    F: FnOnce(&CancelToken) -> Outcome + Send + 'static,
{
    let execution = handle.id();
    let token = handle.token().clone();
    let tx = completions.clone();
    let job = Box::new(move || {
        let started = Instant::now();
        let outcome = if token.is_cancelled() {
            None
        } else {
            Some(call(&token))
        };
        let outcome = outcome.filter(|_| !token.is_cancelled());
        let _ = tx.send(Completion {
            execution,
            elapsed: started.elapsed(),
            outcome,
        });
    });
    match delay {
        Some(delay) => runner.submit_after(delay, job),
        None => runner.submit(job),
    }
}
