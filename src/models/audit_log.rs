//! # Audit Log Record
//!
//! The system-of-record for what the pipeline decided about a task and why.
//! Downstream reporting consumes these records only, never task state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Outcome recorded for a scheduler or worker decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Succeeded,
    Denied,
    /// Terminal failure of the task
    Failed,
    /// The attempt failed and the task was re-queued behind a backoff
    RetryScheduled,
    /// Admission control pushed the task back without consuming an attempt
    Deferred,
}

impl AuditOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Denied => write!(f, "denied"),
            Self::Failed => write!(f, "failed"),
            Self::RetryScheduled => write!(f, "retry_scheduled"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

/// Immutable audit record.
///
/// `task_id` is a string because schema-rejected submissions are audited
/// before any valid task id exists (`"unknown"` when none was supplied).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub audit_id: Uuid,
    pub task_id: String,
    pub policy_id: Option<String>,
    pub outcome: AuditOutcome,
    pub params: serde_json::Value,
    pub attempt: u32,
    pub error_class: Option<String>,
    pub source_id: Option<String>,
    pub domain: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the caller of `AuditLogger::log`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub task_id: String,
    pub policy_id: Option<String>,
    pub outcome: AuditOutcome,
    pub params: serde_json::Value,
    pub attempt: u32,
    pub error_class: Option<String>,
    pub source_id: Option<String>,
    pub domain: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewAuditEntry {
    pub fn new(task_id: impl Into<String>, outcome: AuditOutcome, attempt: u32) -> Self {
        Self {
            task_id: task_id.into(),
            policy_id: None,
            outcome,
            params: serde_json::Value::Object(serde_json::Map::new()),
            attempt,
            error_class: None,
            source_id: None,
            domain: None,
            created_at: None,
        }
    }

    pub fn with_policy_id(mut self, policy_id: Option<String>) -> Self {
        self.policy_id = policy_id;
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_error_class(mut self, error_class: impl Into<String>) -> Self {
        self.error_class = Some(error_class.into());
        self
    }

    pub fn with_location(mut self, source_id: impl Into<String>, domain: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self.domain = Some(domain.into());
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}
