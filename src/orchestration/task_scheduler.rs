//! # Task Scheduler
//!
//! Submission pipeline: turns raw or constructed tasks into admitted,
//! time-ordered queue entries.
//!
//! ## Pipeline
//!
//! 1. Schema validation (`submit_raw` only)
//! 2. Queue-payload validation
//! 3. Policy evaluation; the gate's `policy_id` replaces the task's when set
//! 4. `scheduled_at = max(requested, rate_limiter.next_available_time(domain))`
//! 5. Persist as `queued` and enqueue
//!
//! Every denial is audited exactly once and returned to the caller as
//! `Ok(None)`. `Err` means a collaborator (store, queue, gate) failed.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::constants::error_classes;
use crate::error::Result;
use crate::logging::log_task_operation;
use crate::messaging::QueueBackend;
use crate::models::{AuditOutcome, NewAuditEntry, TaskSpec};
use crate::orchestration::validation::{validate_queue_payload, validate_task_schema};
use crate::persistence::{AuditLogger, TaskStore};
use crate::policy::{PolicyEvaluateRequest, PolicyGate};
use crate::resilience::DomainRateLimiter;
use crate::state_machine::TaskStatus;

pub struct TaskScheduler {
    queue: Arc<dyn QueueBackend>,
    repository: Arc<dyn TaskStore>,
    policy_gate: Arc<dyn PolicyGate>,
    audit_logger: AuditLogger,
    rate_limiter: Arc<DomainRateLimiter>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("queue", &self.queue.backend_name())
            .finish_non_exhaustive()
    }
}

impl TaskScheduler {
    pub fn new(
        queue: Arc<dyn QueueBackend>,
        repository: Arc<dyn TaskStore>,
        policy_gate: Arc<dyn PolicyGate>,
        audit_logger: AuditLogger,
        rate_limiter: Arc<DomainRateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            repository,
            policy_gate,
            audit_logger,
            rate_limiter,
            clock,
        }
    }

    /// Validate a raw submission and run it through [`Self::submit_task`]
    pub async fn submit_raw(&self, raw: Value) -> Result<Option<TaskSpec>> {
        let context = RawContext::from_value(&raw);
        match validate_task_schema(raw) {
            Ok(task) => self.submit_task(task).await,
            Err(error) => {
                warn!(
                    task_id = %context.task_id,
                    error = %error,
                    "🚫 Raw submission rejected"
                );
                let mut entry = NewAuditEntry::new(context.task_id, AuditOutcome::Denied, 0)
                    .with_policy_id(context.policy_id)
                    .with_params(json!({
                        "reason": "schema_validation",
                        "detail": error.detail(),
                    }))
                    .with_error_class(error.error_class())
                    .at(self.clock.now());
                entry.source_id = context.source_id;
                entry.domain = context.domain;
                self.audit_logger.log(entry).await?;
                Ok(None)
            }
        }
    }

    /// Admit one task. Returns the queued task, or `None` when it was denied.
    #[instrument(skip(self, task), fields(task_id = %task.task_id, domain = %task.domain))]
    pub async fn submit_task(&self, mut task: TaskSpec) -> Result<Option<TaskSpec>> {
        if let Some(existing) = self.repository.get(&task.task_id).await? {
            if !existing.status.is_terminal() {
                debug!(status = %existing.status, "Duplicate submission collapsed onto live task");
                return Ok(Some(existing));
            }
        }

        if let Err(error) = validate_queue_payload(&task) {
            let policy_id = task.policy_id.clone();
            self.deny(task, error.detail(), policy_id, error.error_class())
                .await?;
            return Ok(None);
        }

        let decision = self
            .policy_gate
            .evaluate(&PolicyEvaluateRequest::for_task(&task))
            .await?;
        if decision.policy_id.is_some() {
            task.policy_id = decision.policy_id.clone();
        }
        if !decision.allows(task.task_type) {
            self.deny(
                task,
                &decision.reason,
                decision.policy_id,
                error_classes::POLICY_DENIED,
            )
            .await?;
            return Ok(None);
        }

        let scheduled_at = task
            .scheduled_at
            .max(self.rate_limiter.next_available_time(&task.domain));
        task.scheduled_at = scheduled_at;
        task.status = TaskStatus::Queued;

        self.repository.add(task.clone(), self.clock.now()).await?;
        let job_id = self.queue.enqueue(&task, scheduled_at).await?;

        log_task_operation(
            "submit",
            Some(&task.task_id.to_string()),
            Some(&task.domain),
            "queued",
            Some(&format!("job_id={job_id} scheduled_at={}", scheduled_at.to_rfc3339())),
        );
        Ok(Some(task))
    }

    /// Submit a batch in `task_id` order, returning the admitted tasks
    pub async fn submit_tasks(&self, tasks: impl IntoIterator<Item = TaskSpec>) -> Result<Vec<TaskSpec>> {
        let mut ordered: Vec<TaskSpec> = tasks.into_iter().collect();
        ordered.sort_by_key(|task| task.task_id);

        let mut admitted = Vec::with_capacity(ordered.len());
        for task in ordered {
            if let Some(task) = self.submit_task(task).await? {
                admitted.push(task);
            }
        }
        Ok(admitted)
    }

    async fn deny(
        &self,
        mut task: TaskSpec,
        reason: &str,
        policy_id: Option<String>,
        error_class: &str,
    ) -> Result<()> {
        warn!(
            task_id = %task.task_id,
            domain = %task.domain,
            error_class = %error_class,
            reason = %reason,
            "🚫 Task denied at submission"
        );

        task.status = TaskStatus::Denied;
        let entry = NewAuditEntry::new(task.task_id.to_string(), AuditOutcome::Denied, task.attempt)
            .with_policy_id(policy_id)
            .with_params(json!({
                "reason": reason,
                "task_type": task.task_type.as_str(),
            }))
            .with_error_class(error_class)
            .with_location(task.source_id.clone(), task.domain.clone())
            .at(self.clock.now());

        self.repository.add(task, self.clock.now()).await?;
        self.audit_logger.log(entry).await?;
        Ok(())
    }
}

/// Identifying fields salvaged from a submission that failed schema validation
struct RawContext {
    task_id: String,
    policy_id: Option<String>,
    source_id: Option<String>,
    domain: Option<String>,
}

impl RawContext {
    fn from_value(raw: &Value) -> Self {
        let text = |key: &str| -> Option<String> {
            match raw.get(key) {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            }
        };
        Self {
            task_id: text("task_id").unwrap_or_else(|| "unknown".to_string()),
            policy_id: text("policy_id"),
            source_id: text("source_id"),
            domain: text("domain"),
        }
    }
}
