//! Bounded hand-off between the rule evaluator and the action worker.
//!
//! Pushing never waits: when the queue is full the oldest pending job is
//! evicted and handed back to the caller, which records it as dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use greenhub_domain::id::ExecutionId;
use greenhub_domain::reading::Reading;
use greenhub_domain::rule::Rule;
use greenhub_domain::sensor::Sensor;
use greenhub_domain::time::Timestamp;

/// The actions of one matched rule, with the context that triggered them.
#[derive(Debug, Clone)]
pub struct ActionJob {
    pub execution_id: ExecutionId,
    pub rule: Arc<Rule>,
    pub sensor: Sensor,
    pub reading: Reading,
    pub triggered_at: Timestamp,
}

/// Bounded drop-oldest FIFO of [`ActionJob`]s.
#[derive(Debug)]
pub struct ActionQueue {
    jobs: Mutex<VecDeque<ActionJob>>,
    capacity: usize,
    ready: Notify,
    closed: AtomicBool,
}

impl ActionQueue {
    /// Create a queue holding at most `capacity` jobs (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a job, returning the job evicted to make room, if any.
    pub fn push(&self, job: ActionJob) -> Option<ActionJob> {
        let evicted = {
            let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            let evicted = if jobs.len() >= self.capacity {
                jobs.pop_front()
            } else {
                None
            };
            jobs.push_back(job);
            evicted
        };
        self.ready.notify_one();
        evicted
    }

    /// Wait for the next job. Returns `None` once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<ActionJob> {
        loop {
            let notified = self.ready.notified();
            if let Some(job) = self.try_pop() {
                return Some(job);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    fn try_pop(&self) -> Option<ActionJob> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Stop accepting waits; pending jobs can still be drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify_waiters();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
