//! # Messaging Module
//!
//! Queue backends that decide when a task is next eligible to run.
//!
//! The queue owns ordering only; task state stays in the repository. A task
//! has at most one live entry: enqueueing it again reschedules it.
//!
//! - [`InMemoryQueue`]: polled with `pop_due`, ordered by `(scheduled_at, task_id)`
//! - [`DelayedDispatchQueue`]: push-based, delivers each job over a channel
//!   when its timer fires

pub mod delayed_dispatch;
pub mod errors;
pub mod in_memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{TaskId, TaskSpec};

pub use delayed_dispatch::DelayedDispatchQueue;
pub use errors::QueueError;
pub use in_memory::InMemoryQueue;

/// A scheduled queue entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub job_id: String,
    pub task_id: TaskId,
    pub scheduled_at: DateTime<Utc>,
}

impl QueueItem {
    /// Ordering key shared by every backend
    pub fn sort_key(&self) -> (DateTime<Utc>, TaskId) {
        (self.scheduled_at, self.task_id)
    }
}

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Schedule `task` to become eligible at `scheduled_at`, replacing any
    /// existing entry for the same task. Returns the job id.
    async fn enqueue(&self, task: &TaskSpec, scheduled_at: DateTime<Utc>) -> Result<String, QueueError>;

    /// Pending entries ordered by `(scheduled_at, task_id)`
    async fn list(&self) -> Result<Vec<QueueItem>, QueueError>;

    /// Atomically remove and return every entry due at `now`, in order
    async fn pop_due(&self, now: DateTime<Utc>) -> Result<Vec<QueueItem>, QueueError>;

    fn backend_name(&self) -> &'static str;
}
