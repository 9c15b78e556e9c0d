//! Bounded-concurrency task queue with per-task retry.
//!
//! Every submitted task is an independent unit: it is retried with exponential
//! backoff until it succeeds or runs out of attempts, and its failure never
//! touches sibling tasks. [`RetryQueue::on_idle`] resolves once every task
//! submitted so far (including ones submitted by running tasks) has settled.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per task, at least one
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Backoff after the `failed_attempt`-th failure (1-based): base, 2x base, 4x base, ...
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Final result of one queued task
#[derive(Debug)]
pub enum TaskOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    Failed { error: E, attempts: u32 },
}

impl<T, E> TaskOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            TaskOutcome::Succeeded { attempts, .. } | TaskOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Handle to a queued task; dropping it detaches the task without cancelling it
pub struct TaskHandle<T, E> {
    label: String,
    handle: JoinHandle<TaskOutcome<T, E>>,
}

impl<T, E> TaskHandle<T, E> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait for the task to settle. Errors only if the task panicked.
    pub async fn join(self) -> Result<TaskOutcome<T, E>, JoinError> {
        self.handle.await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Attempts beyond the first across all tasks
    pub retried: u64,
}

struct QueueInner {
    name: String,
    policy: RetryPolicy,
    semaphore: Arc<Semaphore>,
    pending: watch::Sender<usize>,
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

/// Decrements the pending count when a task settles, panics included
struct PendingGuard(Arc<QueueInner>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.pending.send_modify(|pending| *pending = pending.saturating_sub(1));
    }
}

#[derive(Clone)]
pub struct RetryQueue {
    inner: Arc<QueueInner>,
}

impl RetryQueue {
    pub fn new(name: impl Into<String>, concurrency: usize, policy: RetryPolicy) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                policy,
                semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
                pending,
                submitted: AtomicU64::new(0),
                succeeded: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                retried: AtomicU64::new(0),
            }),
        }
    }

    /// Queue a unit of work. `task` is called again for each retry.
    pub fn submit<T, E, F, Fut>(&self, label: impl Into<String>, task: F) -> TaskHandle<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let label = label.into();
        let inner = Arc::clone(&self.inner);
        inner.pending.send_modify(|pending| *pending += 1);
        inner.submitted.fetch_add(1, Ordering::Relaxed);

        let task_label = label.clone();
        let handle = tokio::spawn(async move {
            let _pending = PendingGuard(Arc::clone(&inner));
            // The semaphore is never closed
            let _permit = Arc::clone(&inner.semaphore).acquire_owned().await.ok();
            let policy = inner.policy;

            let mut attempt = 0;
            loop {
                attempt += 1;
                match task().await {
                    Ok(value) => {
                        inner.succeeded.fetch_add(1, Ordering::Relaxed);
                        debug!("[{}] {} succeeded after {} attempt(s)", inner.name, task_label, attempt);
                        return TaskOutcome::Succeeded { value, attempts: attempt };
                    }
                    Err(e) if attempt < policy.attempts => {
                        inner.retried.fetch_add(1, Ordering::Relaxed);
                        let delay = policy.delay_for(attempt);
                        warn!(
                            "[{}] {} failed (attempt {}/{}), retrying in {:?}: {}",
                            inner.name, task_label, attempt, policy.attempts, delay, e
                        );
                        sleep(delay).await;
                    }
                    Err(e) => {
                        inner.failed.fetch_add(1, Ordering::Relaxed);
                        error!(
                            "[{}] {} permanently failed after {} attempt(s): {}",
                            inner.name, task_label, attempt, e
                        );
                        return TaskOutcome::Failed { error: e, attempts: attempt };
                    }
                }
            }
        });

        TaskHandle { label, handle }
    }

    /// Resolve once no submitted task is still queued, running or backing off.
    pub async fn on_idle(&self) {
        let mut pending = self.inner.pending.subscribe();
        // The sender lives as long as `self`
        let _ = pending.wait_for(|pending| *pending == 0).await;
    }

    pub fn pending(&self) -> usize {
        *self.inner.pending.borrow()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.inner.submitted.load(Ordering::Relaxed),
            succeeded: self.inner.succeeded.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            retried: self.inner.retried.load(Ordering::Relaxed),
        }
    }
}
