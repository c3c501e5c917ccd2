//! # Policy Gate
//!
//! The authority that decides which task types may run against a source.
//! The scheduler consults it on submission and the worker again before every
//! execution, so a revocation takes effect mid-flight.
//!
//! A task is admitted iff its type is in the decision's `allowed_operations`.

pub mod matrix;
pub mod static_gate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{REQUESTED_OPERATION, SCHEMA_VERSION};
use crate::error::Result;
use crate::models::{TaskSpec, TaskType};

pub use matrix::PolicyDecisionMatrix;
pub use static_gate::{SourcePolicy, StaticPolicyGate};

/// Automation status recorded for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    CrawlAllowed,
    PartnerRequired,
    ManualOnly,
    Unknown,
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrawlAllowed => write!(f, "crawl_allowed"),
            Self::PartnerRequired => write!(f, "partner_required"),
            Self::ManualOnly => write!(f, "manual_only"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for PolicyStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "crawl_allowed" => Ok(Self::CrawlAllowed),
            "partner_required" => Ok(Self::PartnerRequired),
            "manual_only" => Ok(Self::ManualOnly),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Invalid policy status: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvaluateRequest {
    pub schema_version: String,
    pub source_id: String,
    pub domain: String,
    pub task_type: TaskType,
    pub requested_operation: String,
}

impl PolicyEvaluateRequest {
    /// The request the pipeline sends for a task
    pub fn for_task(task: &TaskSpec) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            source_id: task.source_id.clone(),
            domain: task.domain.clone(),
            task_type: task.task_type,
            requested_operation: REQUESTED_OPERATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub decision: PolicyStatus,
    pub allowed_operations: Vec<TaskType>,
    pub reason: String,
    /// Overrides the task's policy id when set
    pub policy_id: Option<String>,
}

impl PolicyDecision {
    pub fn allows(&self, task_type: TaskType) -> bool {
        self.allowed_operations.contains(&task_type)
    }
}

#[async_trait]
pub trait PolicyGate: Send + Sync {
    async fn evaluate(&self, request: &PolicyEvaluateRequest) -> Result<PolicyDecision>;
}
