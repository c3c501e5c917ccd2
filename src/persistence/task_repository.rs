//! # Task Repository
//!
//! Authoritative task state plus the append-only transition log.
//!
//! [`TaskStore`] is the seam the scheduler and worker depend on;
//! [`InMemoryTaskRepository`] is the in-process implementation. Tasks are never
//! deleted, and every status change appends exactly one [`TaskTransition`].
//! Callers serialize mutation per task (the worker holds a per-task lock).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{AcquisitionError, Result};
use crate::models::{TaskId, TaskSpec, TaskTransition};
use crate::state_machine::TaskStatus;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or replace a task.
    ///
    /// Replacing a stored task that has a different status (resubmission of a
    /// settled task) appends a transition from the stored status.
    async fn add(&self, task: TaskSpec, changed_at: DateTime<Utc>) -> Result<()>;

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskSpec>>;

    /// All tasks in first-insertion order
    async fn list(&self) -> Result<Vec<TaskSpec>>;

    /// Move a task to `status`, appending a transition from its prior status.
    ///
    /// Setting the status a task already has is a no-op and records nothing.
    async fn update_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        changed_at: DateTime<Utc>,
    ) -> Result<TaskSpec>;

    /// Bump the attempt counter and return its new value
    async fn increment_attempt(&self, task_id: &TaskId) -> Result<u32>;

    async fn reschedule(&self, task_id: &TaskId, scheduled_at: DateTime<Utc>) -> Result<()>;

    async fn set_policy_id(&self, task_id: &TaskId, policy_id: Option<String>) -> Result<()>;

    async fn transitions(&self) -> Result<Vec<TaskTransition>>;

    async fn transitions_for(&self, task_id: &TaskId) -> Result<Vec<TaskTransition>>;
}

#[derive(Debug, Default)]
struct RepositoryState {
    tasks: HashMap<TaskId, TaskSpec>,
    order: Vec<TaskId>,
    transitions: Vec<TaskTransition>,
}

impl RepositoryState {
    fn task_mut(&mut self, task_id: &TaskId) -> Result<&mut TaskSpec> {
        self.tasks
            .get_mut(task_id)
            .ok_or(AcquisitionError::TaskNotFound(*task_id))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    state: RwLock<RepositoryState>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskRepository {
    async fn add(&self, task: TaskSpec, changed_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write();
        let stored_status = state.tasks.get(&task.task_id).map(|stored| stored.status);
        match stored_status {
            None => state.order.push(task.task_id),
            Some(from) if from != task.status => {
                state
                    .transitions
                    .push(TaskTransition::new(task.task_id, from, task.status, changed_at));
                debug!(task_id = %task.task_id, from = %from, to = %task.status, "Task replaced");
            }
            Some(_) => {}
        }
        debug!(task_id = %task.task_id, status = %task.status, "Task stored");
        state.tasks.insert(task.task_id, task);
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskSpec>> {
        Ok(self.state.read().tasks.get(task_id).cloned())
    }

    async fn list(&self) -> Result<Vec<TaskSpec>> {
        let state = self.state.read();
        Ok(state
            .order
            .iter()
            .filter_map(|task_id| state.tasks.get(task_id).cloned())
            .collect())
    }

    async fn update_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        changed_at: DateTime<Utc>,
    ) -> Result<TaskSpec> {
        let mut state = self.state.write();
        let task = state.task_mut(task_id)?;
        let from = task.status;

        if from == status {
            return Ok(task.clone());
        }
        if !from.can_transition_to(status) {
            return Err(AcquisitionError::InvalidTransition {
                task_id: *task_id,
                from,
                to: status,
            });
        }

        task.status = status;
        let updated = task.clone();
        state
            .transitions
            .push(TaskTransition::new(*task_id, from, status, changed_at));
        debug!(task_id = %task_id, from = %from, to = %status, "Task transitioned");
        Ok(updated)
    }

    async fn increment_attempt(&self, task_id: &TaskId) -> Result<u32> {
        let mut state = self.state.write();
        let task = state.task_mut(task_id)?;
        task.attempt += 1;
        Ok(task.attempt)
    }

    async fn reschedule(&self, task_id: &TaskId, scheduled_at: DateTime<Utc>) -> Result<()> {
        self.state.write().task_mut(task_id)?.scheduled_at = scheduled_at;
        Ok(())
    }

    async fn set_policy_id(&self, task_id: &TaskId, policy_id: Option<String>) -> Result<()> {
        self.state.write().task_mut(task_id)?.policy_id = policy_id;
        Ok(())
    }

    async fn transitions(&self) -> Result<Vec<TaskTransition>> {
        Ok(self.state.read().transitions.clone())
    }

    async fn transitions_for(&self, task_id: &TaskId) -> Result<Vec<TaskTransition>> {
        Ok(self
            .state
            .read()
            .transitions
            .iter()
            .filter(|t| &t.task_id == task_id)
            .cloned()
            .collect())
    }
}
