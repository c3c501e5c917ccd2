use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;
use crate::state_machine::TaskStatus;

/// One status change of a task. Appended by the repository, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTransition {
    pub task_id: TaskId,
    pub from_status: TaskStatus,
    pub to_status: TaskStatus,
    pub changed_at: DateTime<Utc>,
}

impl TaskTransition {
    pub fn new(
        task_id: TaskId,
        from_status: TaskStatus,
        to_status: TaskStatus,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            from_status,
            to_status,
            changed_at,
        }
    }
}
