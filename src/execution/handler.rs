//! # Task Handlers
//!
//! The side-effecting half of task execution. A handler either succeeds or
//! fails with a [`HandlerError`], whose [`FailureDisposition`] decides what
//! the worker does next:
//!
//! | error                 | disposition         | worker action                         |
//! |-----------------------|---------------------|---------------------------------------|
//! | `AdapterValidation`   | `Permanent`         | fail now, never retry                 |
//! | `TransientNetwork`    | `RetryWithBackoff`  | cool the domain down, retry if allowed|
//! | `UpstreamRateLimit`   | `RetryWithBackoff`  | cool the domain down, retry if allowed|
//! | `Unclassified`        | `Unclassified`      | fail now, flag for investigation      |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::error_classes;
use crate::models::TaskSpec;

/// How the worker treats a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureDisposition {
    /// The request itself is invalid; retrying cannot help
    Permanent,
    /// The upstream is struggling; back off and retry while attempts remain
    RetryWithBackoff,
    /// Not a designed failure path
    Unclassified,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("adapter validation failed: {0}")]
    AdapterValidation(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("upstream rate limited: {0}")]
    UpstreamRateLimit(String),

    #[error("{class}: {message}")]
    Unclassified { class: String, message: String },
}

impl HandlerError {
    pub fn unclassified(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unclassified {
            class: class.into(),
            message: message.into(),
        }
    }

    pub fn disposition(&self) -> FailureDisposition {
        match self {
            Self::AdapterValidation(_) => FailureDisposition::Permanent,
            Self::TransientNetwork(_) | Self::UpstreamRateLimit(_) => {
                FailureDisposition::RetryWithBackoff
            }
            Self::Unclassified { .. } => FailureDisposition::Unclassified,
        }
    }

    /// Name recorded in the audit log's `error_class` column
    pub fn error_class(&self) -> &str {
        match self {
            Self::AdapterValidation(_) => error_classes::ADAPTER_VALIDATION,
            Self::TransientNetwork(_) => error_classes::TRANSIENT_NETWORK,
            Self::UpstreamRateLimit(_) => error_classes::UPSTREAM_RATE_LIMIT,
            Self::Unclassified { class, .. } => class,
        }
    }

    /// Message without the class prefix
    pub fn reason(&self) -> &str {
        match self {
            Self::AdapterValidation(message)
            | Self::TransientNetwork(message)
            | Self::UpstreamRateLimit(message)
            | Self::Unclassified { message, .. } => message,
        }
    }
}

/// Executes one attempt of a task
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, task: &TaskSpec) -> Result<(), HandlerError>;
}

/// Handler for deployments without an upstream adapter; every attempt succeeds
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

#[async_trait]
impl TaskHandler for NoopHandler {
    async fn execute(&self, _task: &TaskSpec) -> Result<(), HandlerError> {
        Ok(())
    }
}
