//! Error types for the acquisition pipeline.
//!
//! Expected denial paths (schema validation, payload validation, policy
//! denial) are not errors from the caller's point of view: the scheduler
//! returns `Ok(None)` and records the reason in the audit log. The types here
//! cover infrastructure failures and the typed handler failures the worker
//! classifies.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::QueueError;
use crate::models::TaskId;
use crate::state_machine::TaskStatus;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("Invalid status transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("Store error: {0}")]
    Store(String),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Policy gate error: {0}")]
    PolicyGate(String),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for AcquisitionError {
    fn from(error: serde_json::Error) -> Self {
        AcquisitionError::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AcquisitionError>;

/// Reasons a submission is rejected before it reaches the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    /// The raw payload does not deserialize into a task.
    #[error("task validation failed: {0}")]
    TaskValidation(String),
    /// The task is well formed but cannot be queued as-is.
    #[error("queue payload rejected: {0}")]
    QueuePayload(String),
}

impl SubmissionError {
    /// Name recorded in the audit log's `error_class` column.
    pub fn error_class(&self) -> &'static str {
        match self {
            SubmissionError::TaskValidation(_) => "TaskValidationError",
            SubmissionError::QueuePayload(_) => "QueuePayloadError",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            SubmissionError::TaskValidation(detail) | SubmissionError::QueuePayload(detail) => {
                detail
            }
        }
    }
}
