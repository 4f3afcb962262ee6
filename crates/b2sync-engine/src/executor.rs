//! Bounded queue executor
//!
//! A fixed pool of worker threads fed from a channel, with admission control
//! in front of it: [`BoundedQueueExecutor::submit`] blocks once `queue_limit`
//! jobs are queued or running, and unblocks as jobs finish.
//!
//! ```text
//! driver ──submit──▶ [permit] ──▶ crossbeam channel ──▶ worker 1..N
//!                       ▲                                    │
//!                       └──────────── release on drop ───────┘
//! ```
//!
//! Job failures (an `Err` return or a panic) never stop the pool; they are
//! collected and can be read back after [`BoundedQueueExecutor::shutdown`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, bail};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

/// Unit of work accepted by the executor
pub type Job = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

// ============================================================================
// Admission control
// ============================================================================

#[derive(Debug, Default)]
struct Slots {
    in_use: usize,
    peak: usize,
}

/// Counting semaphore built from a mutex and a condition variable
#[derive(Debug)]
struct Semaphore {
    limit: usize,
    slots: Mutex<Slots>,
    available: Condvar,
}

impl Semaphore {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            slots: Mutex::new(Slots::default()),
            available: Condvar::new(),
        }
    }

    /// Blocks until a slot is free.
    fn acquire(self: &Arc<Self>) -> Permit {
        let mut slots = self.slots.lock();
        while slots.in_use >= self.limit {
            self.available.wait(&mut slots);
        }
        slots.in_use += 1;
        slots.peak = slots.peak.max(slots.in_use);
        Permit {
            semaphore: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut slots = self.slots.lock();
        slots.in_use -= 1;
        self.available.notify_one();
    }

    fn peak(&self) -> usize {
        self.slots.lock().peak
    }
}

/// Held by a job from submission until it finishes
struct Permit {
    semaphore: Arc<Semaphore>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

// ============================================================================
// BoundedQueueExecutor
// ============================================================================

/// Worker pool with bounded admission
pub struct BoundedQueueExecutor {
    sender: Option<Sender<(Job, Permit)>>,
    workers: Vec<JoinHandle<()>>,
    semaphore: Arc<Semaphore>,
    exceptions: Arc<Mutex<Vec<anyhow::Error>>>,
}

impl BoundedQueueExecutor {
    /// Start `max_workers` threads accepting at most `queue_limit` jobs at once.
    ///
    /// # Arguments
    /// * `max_workers` - Number of worker threads (at least one is started)
    /// * `queue_limit` - Maximum number of jobs queued or running
    pub fn new(max_workers: usize, queue_limit: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<(Job, Permit)>();
        let exceptions = Arc::new(Mutex::new(Vec::new()));

        let workers = (0..max_workers.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                let exceptions = Arc::clone(&exceptions);
                std::thread::Builder::new()
                    .name(format!("b2sync-worker-{index}"))
                    .spawn(move || worker_loop(receiver, exceptions))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "failed to start worker thread");
                    None
                }
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            semaphore: Arc::new(Semaphore::new(queue_limit.max(1))),
            exceptions,
        }
    }

    /// Queue a job, blocking while the queue is full.
    ///
    /// # Errors
    /// Fails if the executor has been shut down or has no workers.
    pub fn submit<F>(&self, job: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            bail!("executor is shut down");
        };
        if self.workers.is_empty() {
            bail!("executor has no worker threads");
        }
        let permit = self.semaphore.acquire();
        sender
            .send((Box::new(job), permit))
            .map_err(|_| anyhow!("executor workers have stopped"))
    }

    /// Stop accepting jobs and wait for every queued job to finish.
    ///
    /// Calling it more than once is harmless.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("worker thread terminated abnormally");
            }
        }
        debug!(failures = self.num_exceptions(), "executor shut down");
    }

    /// Number of jobs that failed so far
    pub fn num_exceptions(&self) -> usize {
        self.exceptions.lock().len()
    }

    /// Failure messages, in completion order
    pub fn exceptions(&self) -> Vec<String> {
        self.exceptions
            .lock()
            .iter()
            .map(|e| format!("{e:#}"))
            .collect()
    }

    /// Highest number of jobs that were queued or running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.semaphore.peak()
    }
}

impl Drop for BoundedQueueExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Receiver<(Job, Permit)>, exceptions: Arc<Mutex<Vec<anyhow::Error>>>) {
    while let Ok((job, permit)) = receiver.recv() {
        let outcome = catch_unwind(AssertUnwindSafe(job));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(anyhow!("task panicked: {}", panic_message(&*payload))),
        };
        if let Some(e) = failure {
            exceptions.lock().push(e);
        }
        drop(permit);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
