//! # Delayed Dispatch Queue
//!
//! Push-based backend in the shape of a durable broker with scheduled jobs:
//! every enqueue gets a fresh job id and a timer, and the job is delivered on
//! an mpsc channel once its time comes. Consumers drive the worker from the
//! receiver (see `WorkerPool::run_push_consumer`); `pop_due` is unsupported.
//!
//! Delays are measured with the injected clock and slept on tokio's timer, so
//! paused-time tests control delivery with `tokio::time::advance`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{QueueBackend, QueueError, QueueItem};
use crate::clock::Clock;
use crate::models::{TaskId, TaskSpec};

struct PendingJob {
    item: QueueItem,
    timer: JoinHandle<()>,
}

type PendingJobs = Arc<Mutex<HashMap<TaskId, PendingJob>>>;

pub struct DelayedDispatchQueue {
    clock: Arc<dyn Clock>,
    pending: PendingJobs,
    sender: mpsc::UnboundedSender<QueueItem>,
}

impl std::fmt::Debug for DelayedDispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedDispatchQueue")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl DelayedDispatchQueue {
    /// Create the queue and the receiver its due jobs are delivered on
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<QueueItem>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            clock,
            pending: Arc::new(Mutex::new(HashMap::new())),
            sender,
        };
        (queue, receiver)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn arm_timer(&self, item: QueueItem) -> JoinHandle<()> {
        let delay = (item.scheduled_at - self.clock.now())
            .to_std()
            .unwrap_or_default();
        let deadline = tokio::time::Instant::now() + delay;
        let pending = Arc::clone(&self.pending);
        let sender = self.sender.clone();

        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            // A reschedule may have replaced this job while the timer slept.
            let current = {
                let mut pending = pending.lock();
                match pending.get(&item.task_id) {
                    Some(job) if job.item.job_id == item.job_id => pending.remove(&item.task_id),
                    _ => None,
                }
            };
            if current.is_none() {
                return;
            }

            debug!(task_id = %item.task_id, job_id = %item.job_id, "Dispatching due job");
            if sender.send(item).is_err() {
                warn!("Dispatch receiver dropped; job could not be delivered");
            }
        })
    }
}

#[async_trait]
impl QueueBackend for DelayedDispatchQueue {
    async fn enqueue(&self, task: &TaskSpec, scheduled_at: DateTime<Utc>) -> Result<String, QueueError> {
        if self.sender.is_closed() {
            return Err(QueueError::ChannelClosed);
        }

        let item = QueueItem {
            job_id: Uuid::new_v4().to_string(),
            task_id: task.task_id,
            scheduled_at,
        };
        let job_id = item.job_id.clone();

        // Hold the lock across arming so the timer cannot observe a stale entry.
        let mut pending = self.pending.lock();
        let timer = self.arm_timer(item.clone());
        if let Some(previous) = pending.insert(task.task_id, PendingJob { item, timer }) {
            previous.timer.abort();
            debug!(
                task_id = %task.task_id,
                replaced_job_id = %previous.item.job_id,
                "Rescheduled pending job"
            );
        }
        Ok(job_id)
    }

    async fn list(&self) -> Result<Vec<QueueItem>, QueueError> {
        let mut items: Vec<QueueItem> = self
            .pending
            .lock()
            .values()
            .map(|job| job.item.clone())
            .collect();
        items.sort_by_key(QueueItem::sort_key);
        Ok(items)
    }

    async fn pop_due(&self, _now: DateTime<Utc>) -> Result<Vec<QueueItem>, QueueError> {
        Err(QueueError::PopUnsupported {
            backend: self.backend_name(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "delayed_dispatch"
    }
}

impl Drop for DelayedDispatchQueue {
    fn drop(&mut self) {
        for (_, job) in self.pending.lock().drain() {
            job.timer.abort();
        }
    }
}
