//! # Task Worker
//!
//! Execution state machine for a single task.
//!
//! ```text
//! queued ──no attempts left───────────────────────────▶ failed
//!   │ ──policy denied─────────────────────────────────▶ denied
//!   │ ──rate limited (no attempt consumed)───────────▶ queued @ next_available
//!   ▼
//! running ──Ok──────────────────────────────────────────▶ succeeded
//!   │ ──Permanent──────────────────────────────────────▶ failed
//!   │ ──RetryWithBackoff, attempts left────────────────▶ queued @ cooldown
//!   │ ──RetryWithBackoff, exhausted────────────────────▶ failed
//!   └ ──Unclassified (incl. handler panic)─────────────▶ failed
//! ```
//!
//! Each branch writes exactly one audit record. Once rate-limiter capacity has
//! been acquired it is released on every path, including store failures and
//! handler panics. Calls for the same `task_id` are serialized by a per-task
//! async lock; calls for different tasks run in parallel.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::Clock;
use crate::constants::{error_classes, is_fetch_task};
use crate::error::Result;
use crate::execution::{FailureDisposition, HandlerError, TaskHandler};
use crate::messaging::QueueBackend;
use crate::models::{AuditOutcome, NewAuditEntry, TaskId, TaskSpec};
use crate::persistence::{AuditLogger, TaskStore};
use crate::policy::{PolicyEvaluateRequest, PolicyGate};
use crate::resilience::DomainRateLimiter;
use crate::state_machine::TaskStatus;

/// What a single `process_task` call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// No task with that id is stored
    Missing,
    /// The task was not runnable (duplicate delivery of a settled task)
    Skipped(TaskStatus),
    Denied,
    /// Admission control said not yet; re-queued without consuming an attempt
    Deferred { until: DateTime<Utc> },
    Succeeded,
    /// The attempt failed with a retryable error and was re-queued
    RetryScheduled { at: DateTime<Utc> },
    Failed { error_class: String },
}

impl ProcessOutcome {
    /// Whether the task reached a final status in this call
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Denied | Self::Succeeded | Self::Failed { .. })
    }
}

pub struct TaskWorker {
    repository: Arc<dyn TaskStore>,
    queue: Arc<dyn QueueBackend>,
    policy_gate: Arc<dyn PolicyGate>,
    audit_logger: AuditLogger,
    rate_limiter: Arc<DomainRateLimiter>,
    handler: Arc<dyn TaskHandler>,
    clock: Arc<dyn Clock>,
    task_locks: DashMap<TaskId, Arc<AsyncMutex<()>>>,
}

impl std::fmt::Debug for TaskWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskWorker")
            .field("queue", &self.queue.backend_name())
            .field("locked_tasks", &self.task_locks.len())
            .finish_non_exhaustive()
    }
}

impl TaskWorker {
    pub fn new(
        repository: Arc<dyn TaskStore>,
        queue: Arc<dyn QueueBackend>,
        policy_gate: Arc<dyn PolicyGate>,
        audit_logger: AuditLogger,
        rate_limiter: Arc<DomainRateLimiter>,
        handler: Arc<dyn TaskHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            queue,
            policy_gate,
            audit_logger,
            rate_limiter,
            handler,
            clock,
            task_locks: DashMap::new(),
        }
    }

    /// Run one worker cycle for `task_id`
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn process_task(&self, task_id: TaskId) -> Result<ProcessOutcome> {
        let lock = self
            .task_locks
            .entry(task_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.process_locked(task_id).await
        };

        drop(lock);
        self.task_locks
            .remove_if(&task_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Put a task back on the queue for `at` after a worker cycle failed on
    /// infrastructure rather than on the task itself.
    ///
    /// A task left `running` by the failed cycle is moved back to `queued` so
    /// the next delivery runs it. Returns `false` if the task is not stored.
    pub async fn requeue_after_error(&self, task_id: TaskId, at: DateTime<Utc>) -> Result<bool> {
        let Some(mut task) = self.repository.get(&task_id).await? else {
            return Ok(false);
        };
        if task.status == TaskStatus::Running {
            task = self
                .repository
                .update_status(&task_id, TaskStatus::Queued, self.clock.now())
                .await?;
            debug!(attempt = task.attempt, "Interrupted attempt returned to queued");
        }
        self.repository.reschedule(&task_id, at).await?;
        task.scheduled_at = at;
        self.queue.enqueue(&task, at).await?;
        Ok(true)
    }

    async fn process_locked(&self, task_id: TaskId) -> Result<ProcessOutcome> {
        let Some(mut task) = self.repository.get(&task_id).await? else {
            debug!("Task not found; nothing to do");
            return Ok(ProcessOutcome::Missing);
        };
        if !task.status.is_runnable() {
            debug!(status = %task.status, "Task not runnable; skipping");
            return Ok(ProcessOutcome::Skipped(task.status));
        }
        if !task.has_attempts_remaining() {
            return self.fail_exhausted(&task).await;
        }

        let decision = self
            .policy_gate
            .evaluate(&PolicyEvaluateRequest::for_task(&task))
            .await?;
        if decision.policy_id.is_some() && decision.policy_id != task.policy_id {
            task.policy_id = decision.policy_id.clone();
            self.repository
                .set_policy_id(&task.task_id, task.policy_id.clone())
                .await?;
        }
        if !decision.allows(task.task_type) {
            self.repository
                .update_status(&task.task_id, TaskStatus::Denied, self.clock.now())
                .await?;
            warn!(
                domain = %task.domain,
                decision = %decision.decision,
                reason = %decision.reason,
                "🚫 Policy denied task at execution"
            );
            self.audit(
                &task,
                AuditOutcome::Denied,
                Some(error_classes::POLICY_DENIED),
                json!({"reason": decision.reason, "task_type": task.task_type.as_str()}),
            )
            .await?;
            return Ok(ProcessOutcome::Denied);
        }

        if let Some(until) = self.rate_limiter.acquire(&task.domain) {
            self.requeue(&task, until).await?;
            debug!(domain = %task.domain, until = %until, "⏳ Rate limited; task deferred");
            self.audit(
                &task,
                AuditOutcome::Deferred,
                Some(error_classes::RATE_LIMITED),
                json!({
                    "reason": "rate_limited",
                    "next_available_at": until.to_rfc3339(),
                    "task_type": task.task_type.as_str(),
                }),
            )
            .await?;
            return Ok(ProcessOutcome::Deferred { until });
        }

        // Capacity is held from here on.
        match self.begin_attempt(&task).await {
            Ok(attempt) => {
                task.attempt = attempt;
                task.status = TaskStatus::Running;
            }
            Err(e) => {
                self.rate_limiter.release(&task.domain, false);
                return Err(e);
            }
        }

        match self.execute(&task).await {
            Ok(()) => self.complete(&task).await,
            Err(failure) => self.handle_failure(&task, failure).await,
        }
    }

    /// Settle a queued task that has no attempt left to spend
    async fn fail_exhausted(&self, task: &TaskSpec) -> Result<ProcessOutcome> {
        self.repository
            .update_status(&task.task_id, TaskStatus::Failed, self.clock.now())
            .await?;
        warn!(
            attempt = task.attempt,
            max_attempts = task.max_attempts,
            "❌ No attempts left; task failed without running"
        );
        self.audit(
            task,
            AuditOutcome::Failed,
            Some(error_classes::ATTEMPTS_EXHAUSTED),
            json!({
                "reason": format!(
                    "attempt {} already reached max_attempts {}",
                    task.attempt, task.max_attempts
                ),
                "task_type": task.task_type.as_str(),
            }),
        )
        .await?;
        Ok(ProcessOutcome::Failed {
            error_class: error_classes::ATTEMPTS_EXHAUSTED.to_string(),
        })
    }

    async fn begin_attempt(&self, task: &TaskSpec) -> Result<u32> {
        self.repository
            .update_status(&task.task_id, TaskStatus::Running, self.clock.now())
            .await?;
        let attempt = self.repository.increment_attempt(&task.task_id).await?;
        debug!(attempt, domain = %task.domain, "▶️ Attempt started");
        Ok(attempt)
    }

    /// Fetch tasks go through the handler; other task types complete immediately
    async fn execute(&self, task: &TaskSpec) -> std::result::Result<(), HandlerError> {
        if !is_fetch_task(task.task_type) {
            return Ok(());
        }
        match AssertUnwindSafe(self.handler.execute(task)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::unclassified(
                error_classes::PANIC,
                panic_message(&*panic),
            )),
        }
    }

    async fn complete(&self, task: &TaskSpec) -> Result<ProcessOutcome> {
        self.rate_limiter.release(&task.domain, true);
        self.repository
            .update_status(&task.task_id, TaskStatus::Succeeded, self.clock.now())
            .await?;
        info!(attempt = task.attempt, domain = %task.domain, "✅ Task succeeded");
        self.audit(
            task,
            AuditOutcome::Succeeded,
            None,
            json!({"task_type": task.task_type.as_str()}),
        )
        .await?;
        Ok(ProcessOutcome::Succeeded)
    }

    async fn handle_failure(&self, task: &TaskSpec, failure: HandlerError) -> Result<ProcessOutcome> {
        let error_class = failure.error_class().to_string();
        let mut params = json!({
            "reason": failure.reason(),
            "task_type": task.task_type.as_str(),
        });

        match failure.disposition() {
            FailureDisposition::RetryWithBackoff => {
                let cooldown = self.rate_limiter.register_error(&task.domain);
                self.rate_limiter.release(&task.domain, false);

                if task.attempt < task.max_attempts {
                    self.requeue(task, cooldown).await?;
                    warn!(
                        attempt = task.attempt,
                        max_attempts = task.max_attempts,
                        error_class = %error_class,
                        retry_at = %cooldown,
                        "🔁 Attempt failed; retry scheduled"
                    );
                    params["retry_at"] = json!(cooldown.to_rfc3339());
                    self.audit(task, AuditOutcome::RetryScheduled, Some(&error_class), params)
                        .await?;
                    return Ok(ProcessOutcome::RetryScheduled { at: cooldown });
                }

                warn!(
                    attempt = task.attempt,
                    error_class = %error_class,
                    "❌ Retries exhausted; task failed"
                );
            }
            FailureDisposition::Permanent => {
                self.rate_limiter.release(&task.domain, false);
                warn!(
                    attempt = task.attempt,
                    error_class = %error_class,
                    reason = %failure.reason(),
                    "❌ Permanent failure; task will not be retried"
                );
            }
            FailureDisposition::Unclassified => {
                self.rate_limiter.release(&task.domain, false);
                error!(
                    attempt = task.attempt,
                    domain = %task.domain,
                    error_class = %error_class,
                    reason = %failure.reason(),
                    "💥 Unclassified handler failure"
                );
            }
        }

        self.repository
            .update_status(&task.task_id, TaskStatus::Failed, self.clock.now())
            .await?;
        self.audit(task, AuditOutcome::Failed, Some(&error_class), params)
            .await?;
        Ok(ProcessOutcome::Failed { error_class })
    }

    /// Move the task back to `queued` and enqueue it for `at`
    async fn requeue(&self, task: &TaskSpec, at: DateTime<Utc>) -> Result<()> {
        self.repository.reschedule(&task.task_id, at).await?;
        self.repository
            .update_status(&task.task_id, TaskStatus::Queued, self.clock.now())
            .await?;
        let mut rescheduled = task.clone();
        rescheduled.scheduled_at = at;
        rescheduled.status = TaskStatus::Queued;
        self.queue.enqueue(&rescheduled, at).await?;
        Ok(())
    }

    async fn audit(
        &self,
        task: &TaskSpec,
        outcome: AuditOutcome,
        error_class: Option<&str>,
        params: serde_json::Value,
    ) -> Result<()> {
        let mut entry = NewAuditEntry::new(task.task_id.to_string(), outcome, task.attempt)
            .with_policy_id(task.policy_id.clone())
            .with_params(params)
            .with_location(task.source_id.clone(), task.domain.clone())
            .at(self.clock.now());
        if let Some(class) = error_class {
            entry = entry.with_error_class(class);
        }
        self.audit_logger.log(entry).await?;
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
