use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::{QueueBackend, QueueError, QueueItem};
use crate::models::{TaskId, TaskSpec};

#[derive(Debug, Default)]
struct QueueState {
    ordered: BTreeMap<(DateTime<Utc>, TaskId), QueueItem>,
    index: HashMap<TaskId, DateTime<Utc>>,
}

/// In-process queue polled with `pop_due`. The job id is the task id.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.state.lock().index.contains_key(task_id)
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueue {
    async fn enqueue(&self, task: &TaskSpec, scheduled_at: DateTime<Utc>) -> Result<String, QueueError> {
        let job_id = task.task_id.to_string();
        let mut state = self.state.lock();
        if let Some(previous) = state.index.insert(task.task_id, scheduled_at) {
            state.ordered.remove(&(previous, task.task_id));
        }
        state.ordered.insert(
            (scheduled_at, task.task_id),
            QueueItem {
                job_id: job_id.clone(),
                task_id: task.task_id,
                scheduled_at,
            },
        );
        debug!(task_id = %task.task_id, scheduled_at = %scheduled_at, "Task enqueued");
        Ok(job_id)
    }

    async fn list(&self) -> Result<Vec<QueueItem>, QueueError> {
        Ok(self.state.lock().ordered.values().cloned().collect())
    }

    async fn pop_due(&self, now: DateTime<Utc>) -> Result<Vec<QueueItem>, QueueError> {
        let mut state = self.state.lock();
        let QueueState { ordered, index } = &mut *state;

        let due_keys: Vec<(DateTime<Utc>, TaskId)> = ordered
            .keys()
            .take_while(|(scheduled_at, _)| *scheduled_at <= now)
            .copied()
            .collect();

        let mut due = Vec::with_capacity(due_keys.len());
        for key in due_keys {
            if let Some(item) = ordered.remove(&key) {
                index.remove(&item.task_id);
                due.push(item);
            }
        }
        Ok(due)
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
