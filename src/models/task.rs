//! # Task Model
//!
//! The unit of work flowing through the acquisition pipeline.
//!
//! ## Overview
//!
//! A [`TaskSpec`] names an upstream operation (`task_type`) against a source and
//! domain, carries an opaque JSON payload, and tracks its own execution state:
//! status, attempt counter, retry ceiling and the instant it next becomes
//! eligible to run.
//!
//! ## Identity
//!
//! `task_id` is derived from the task's logical content by
//! [`crate::determinism`], so resubmitting the same request yields the same id.
//! [`TaskId`] orders by its UUID bytes, which is the tie-break the queue and the
//! batch scheduler rely on.
//!
//! ## Raw Records
//!
//! [`TaskSchema`] is the strict wire shape accepted by
//! `TaskScheduler::submit_raw`; [`TaskSpec::to_record`] produces the same shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::state_machine::TaskStatus;

/// Opaque task payload.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Stable task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Upstream operation a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "SearchTask")]
    Search,
    #[serde(rename = "MapTask")]
    Map,
    #[serde(rename = "CrawlTask")]
    Crawl,
    #[serde(rename = "ScrapeTask")]
    Scrape,
    #[serde(rename = "ImportTask")]
    Import,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::Search,
        TaskType::Map,
        TaskType::Crawl,
        TaskType::Scrape,
        TaskType::Import,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "SearchTask",
            Self::Map => "MapTask",
            Self::Crawl => "CrawlTask",
            Self::Scrape => "ScrapeTask",
            Self::Import => "ImportTask",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|task_type| task_type.as_str() == s)
            .ok_or_else(|| format!("Invalid task type: {s}"))
    }
}

/// A fetch task and its execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub source_id: String,
    /// Unset until the policy gate resolves it.
    pub policy_id: Option<String>,
    pub domain: String,
    pub payload: Payload,
    pub status: TaskStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TaskSpec {
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Serialize into the raw record shape accepted by [`TaskSchema`].
    pub fn to_record(&self) -> serde_json::Value {
        serde_json::json!({
            "task_id": self.task_id.to_string(),
            "task_type": self.task_type.as_str(),
            "source_id": self.source_id,
            "policy_id": self.policy_id,
            "domain": self.domain,
            "payload": self.payload,
            "status": self.status.to_string(),
            "attempt": self.attempt,
            "max_attempts": self.max_attempts,
            "scheduled_at": self.scheduled_at.to_rfc3339(),
            "created_at": self.created_at.to_rfc3339(),
        })
    }
}

/// Strict raw task record.
///
/// Every field is required except `policy_id`, which may be null; unknown
/// fields are rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSchema {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub source_id: String,
    pub policy_id: Option<String>,
    pub domain: String,
    pub payload: Payload,
    pub status: TaskStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TaskSchema {
    pub fn parse(raw: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(raw)
    }
}

impl From<TaskSchema> for TaskSpec {
    fn from(schema: TaskSchema) -> Self {
        Self {
            task_id: schema.task_id,
            task_type: schema.task_type,
            source_id: schema.source_id,
            policy_id: schema.policy_id,
            domain: schema.domain,
            payload: schema.payload,
            status: schema.status,
            attempt: schema.attempt,
            max_attempts: schema.max_attempts,
            scheduled_at: schema.scheduled_at,
            created_at: schema.created_at,
        }
    }
}
