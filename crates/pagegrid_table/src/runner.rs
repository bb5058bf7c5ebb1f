//! Where service calls run.
//!
//! The table never blocks its owning thread on a service. Every call is
//! wrapped in a [`Job`] and handed to a [`JobRunner`]; the job reports back
//! through the completion channel the table drains in
//! [`crate::BeanTable::process_completions`].

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One unit of blocking work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait JobRunner: Send + Sync {
    /// Run `job` as soon as a worker is free.
    fn submit(&self, job: Job);

    /// Run `job` once `delay` has elapsed.
    ///
    /// The delay only defers submission; the job itself still runs on a
    /// regular worker.
    fn submit_after(&self, delay: Duration, job: Job);
}

/// Fixed pool of named worker threads plus one timer thread.
pub struct ThreadPoolRunner {
    jobs: Option<Sender<Job>>,
    timer: Option<Sender<(Instant, Job)>>,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadPoolRunner {
    /// Spawn `workers` worker threads (at least one) and the timer thread.
    ///
    /// # Errors
    /// Returns an error if a thread cannot be spawned.
    pub fn new(workers: usize) -> io::Result<Self> {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (timer_tx, timer_rx) = unbounded::<(Instant, Job)>();
        let mut threads = Vec::with_capacity(workers.max(1) + 1);

        for index in 0..workers.max(1) {
            let rx = job_rx.clone();
            threads.push(
                thread::Builder::new()
                    .name(format!("pagegrid-worker-{}", index))
                    .spawn(move || {
                        for job in rx.iter() {
                            job();
                        }
                    })?,
            );
        }

        let delayed_tx = job_tx.clone();
        threads.push(
            thread::Builder::new()
                .name("pagegrid-timer".to_string())
                .spawn(move || {
                    let mut waiting: Vec<(Instant, Job)> = Vec::new();
                    loop {
                        let next = waiting.iter().map(|(due, _)| *due).min();
                        let received = match next {
                            Some(due) => {
                                timer_rx.recv_timeout(due.saturating_duration_since(Instant::now()))
                            }
                            None => timer_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                        };
                        match received {
                            Ok(entry) => waiting.push(entry),
                            Err(RecvTimeoutError::Timeout) => {}
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                        let now = Instant::now();
                        let mut index = 0;
                        while index < waiting.len() {
                            if waiting[index].0 <= now {
                                let (_, job) = waiting.swap_remove(index);
                                if delayed_tx.send(job).is_err() {
                                    return;
                                }
                            } else {
                                index += 1;
                            }
                        }
                    }
                    if !waiting.is_empty() {
                        debug!(
                            target: "pagegrid_table::runner",
                            dropped = waiting.len(),
                            "timer stopped with deferred jobs pending"
                        );
                    }
                })?,
        );

        Ok(Self {
            jobs: Some(job_tx),
            timer: Some(timer_tx),
            threads,
        })
    }
}

impl JobRunner for ThreadPoolRunner {
    fn submit(&self, job: Job) {
        if let Some(tx) = &self.jobs {
            if tx.send(job).is_err() {
                warn!(target: "pagegrid_table::runner", "job queue closed; job dropped");
            }
        }
    }

    fn submit_after(&self, delay: Duration, job: Job) {
        if delay.is_zero() {
            self.submit(job);
            return;
        }
        if let Some(tx) = &self.timer {
            if tx.send((Instant::now() + delay, job)).is_err() {
                warn!(target: "pagegrid_table::runner", "timer closed; job dropped");
            }
        }
    }
}

impl Drop for ThreadPoolRunner {
    fn drop(&mut self) {
        // Timer first: it holds a sender into the job queue.
        self.timer.take();
        self.jobs.take();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Runner that only queues; tests decide when jobs run.
#[derive(Default)]
pub struct ManualRunner {
    queue: Mutex<VecDeque<Job>>,
    delayed: Mutex<Vec<(Duration, Job)>>,
}

impl ManualRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delayed(&self) -> MutexGuard<'_, Vec<(Duration, Job)>> {
        self.delayed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run every immediately-submitted job, including ones queued while running.
    ///
    /// # Returns
    /// Number of jobs run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue().pop_front();
            let Some(job) = next else {
                return ran;
            };
            job();
            ran += 1;
        }
    }

    /// Release every deferred job regardless of its delay, then run the queue.
    pub fn run_delayed(&self) -> usize {
        let released: Vec<Job> = self.delayed().drain(..).map(|(_, job)| job).collect();
        self.queue().extend(released);
        self.run_pending()
    }

    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    pub fn delayed_count(&self) -> usize {
        self.delayed().len()
    }

    /// Delays of the deferred jobs, in submission order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delayed().iter().map(|(delay, _)| *delay).collect()
    }
}

impl JobRunner for ManualRunner {
    fn submit(&self, job: Job) {
        self.queue().push_back(job);
    }

    fn submit_after(&self, delay: Duration, job: Job) {
        if delay.is_zero() {
            self.submit(job);
        } else {
            self.delayed().push((delay, job));
        }
    }
}
