//! # Task Factory
//!
//! Builds [`TaskSpec`]s with a content-derived identity. Two requests with the
//! same `(task_type, source_id, domain, payload)` under the same seed always
//! receive the same `task_id`, which makes the id an idempotency key for
//! repeated submissions.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::TaskDefaults;
use crate::determinism::{dedupe_tasks, deterministic_task_id};
use crate::models::{Payload, TaskSpec, TaskType};
use crate::state_machine::TaskStatus;

/// Logical content of a task plus optional scheduling overrides
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub task_type: TaskType,
    pub source_id: String,
    pub policy_id: Option<String>,
    pub domain: String,
    pub payload: Payload,
    pub max_attempts: Option<u32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl TaskRequest {
    pub fn new(
        task_type: TaskType,
        source_id: impl Into<String>,
        domain: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            task_type,
            source_id: source_id.into(),
            policy_id: None,
            domain: domain.into(),
            payload,
            max_attempts: None,
            scheduled_at: None,
            created_at: None,
        }
    }

    pub fn with_policy_id(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = Some(policy_id.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

pub struct TaskFactory {
    seed: String,
    default_max_attempts: u32,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFactory")
            .field("seed", &self.seed)
            .field("default_max_attempts", &self.default_max_attempts)
            .finish_non_exhaustive()
    }
}

impl TaskFactory {
    pub fn new(seed: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            seed: seed.into(),
            default_max_attempts: crate::constants::DEFAULT_MAX_ATTEMPTS,
            clock,
        }
    }

    pub fn from_config(defaults: &TaskDefaults, clock: Arc<dyn Clock>) -> Self {
        Self {
            seed: defaults.seed.clone(),
            default_max_attempts: defaults.max_attempts,
            clock,
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Build a queued task with attempt 0. Unset timestamps default to now.
    pub fn create_task(&self, request: TaskRequest) -> TaskSpec {
        let task_id = deterministic_task_id(
            &self.seed,
            request.task_type,
            &request.source_id,
            &request.domain,
            &request.payload,
        );
        let now = self.clock.now();

        TaskSpec {
            task_id,
            task_type: request.task_type,
            source_id: request.source_id,
            policy_id: request.policy_id,
            domain: request.domain,
            payload: request.payload,
            status: TaskStatus::Queued,
            attempt: 0,
            max_attempts: request.max_attempts.unwrap_or(self.default_max_attempts),
            scheduled_at: request.scheduled_at.unwrap_or(now),
            created_at: request.created_at.unwrap_or(now),
        }
    }

    /// Unique tasks in first-seen order
    pub fn dedupe(&self, tasks: impl IntoIterator<Item = TaskSpec>) -> Vec<TaskSpec> {
        dedupe_tasks(tasks)
    }
}
