//! # Submission Validation
//!
//! Two gates run before a task can reach the queue:
//!
//! 1. [`validate_task_schema`] turns a raw JSON submission into a [`TaskSpec`].
//!    Anything that does not deserialize (unknown fields, bad enum names,
//!    malformed timestamps or ids) is a [`SubmissionError::TaskValidation`].
//! 2. [`validate_queue_payload`] checks a well-formed task is queueable: it
//!    must carry a policy id and a domain, have an attempt left to run, and
//!    fetch tasks must describe a fetch the upstream adapter will accept.

use serde_json::Value;

use crate::constants::{is_allowed_format, is_fetch_task};
use crate::error::SubmissionError;
use crate::execution::fetch::is_truthy;
use crate::models::{TaskSchema, TaskSpec};

/// Deserialize a raw submission into a task
pub fn validate_task_schema(raw: Value) -> Result<TaskSpec, SubmissionError> {
    TaskSchema::parse(raw)
        .map(TaskSpec::from)
        .map_err(|e| SubmissionError::TaskValidation(e.to_string()))
}

/// Check that a task may be enqueued as-is
pub fn validate_queue_payload(task: &TaskSpec) -> Result<(), SubmissionError> {
    if task.policy_id.as_deref().map_or(true, str::is_empty) {
        return Err(SubmissionError::QueuePayload(
            "policy_id is required before enqueue".to_string(),
        ));
    }
    if task.domain.is_empty() {
        return Err(SubmissionError::QueuePayload(
            "domain is required before enqueue".to_string(),
        ));
    }
    if task.max_attempts == 0 {
        return Err(SubmissionError::QueuePayload(
            "max_attempts must be at least 1".to_string(),
        ));
    }
    if !task.has_attempts_remaining() {
        return Err(SubmissionError::QueuePayload(format!(
            "attempt {} already reached max_attempts {}",
            task.attempt, task.max_attempts
        )));
    }

    if is_fetch_task(task.task_type) {
        validate_fetch_payload(task)?;
    }
    Ok(())
}

fn validate_fetch_payload(task: &TaskSpec) -> Result<(), SubmissionError> {
    let formats = task
        .payload
        .get("formats")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            SubmissionError::QueuePayload("payload.formats is required for fetch tasks".to_string())
        })?;

    let mut unknown: Vec<&str> = formats
        .keys()
        .map(String::as_str)
        .filter(|key| !is_allowed_format(key))
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(SubmissionError::QueuePayload(format!(
            "Unsupported format field(s): {unknown:?}"
        )));
    }

    if task.payload.get("change_tracking").map_or(true, Value::is_null) {
        return Err(SubmissionError::QueuePayload(
            "payload.change_tracking is required for fetch tasks".to_string(),
        ));
    }
    if !formats.get("markdown").is_some_and(is_truthy) {
        return Err(SubmissionError::QueuePayload(
            "change_tracking requires markdown format".to_string(),
        ));
    }
    Ok(())
}
