use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a fetch task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Admitted and waiting in the queue
    Queued,
    /// Picked up by a worker; an attempt is in progress
    Running,
    /// Handler completed without error
    Succeeded,
    /// Permanently failed or out of attempts
    Failed,
    /// Rejected by validation or the policy gate
    Denied,
}

impl TaskStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Denied)
    }

    /// Only queued tasks are picked up by a worker
    pub fn is_runnable(&self) -> bool {
        matches!(self, Self::Queued)
    }

    /// Whether the execution state machine permits `self -> to`.
    ///
    /// `Running -> Queued` covers both admission deferral and backoff retry.
    /// `Queued -> Failed` is taken by a task that arrives with no attempts left.
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        match (self, to) {
            (Self::Queued, Self::Running | Self::Denied | Self::Failed) => true,
            (Self::Running, Self::Queued | Self::Succeeded | Self::Failed | Self::Denied) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "denied" => Ok(Self::Denied),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// Default state for new tasks
impl Default for TaskStatus {
    fn default() -> Self {
        Self::Queued
    }
}
