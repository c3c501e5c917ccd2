//! # System Constants
//!
//! Fixed values shared by the scheduler, worker, policy gate and fetch
//! adapter. Anything an operator may want to tune lives in [`crate::config`]
//! instead.

use crate::models::TaskType;

/// Schema version accepted by the policy gate and the fetch adapter.
pub const SCHEMA_VERSION: &str = "v1";

/// Operation requested from the policy gate for every pipeline evaluation.
pub const REQUESTED_OPERATION: &str = "automated_fetch";

/// Seed mixed into task identity when none is configured.
pub const DEFAULT_SEED: &str = "default";

/// Retry ceiling applied to tasks built without an explicit value.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Output formats a fetch task may request.
pub const ALLOWED_FORMATS: [&str; 3] = ["html", "markdown", "screenshot"];

/// Task types that perform an upstream fetch and therefore run a handler.
pub const FETCH_TASK_TYPES: [TaskType; 2] = [TaskType::Crawl, TaskType::Scrape];

/// Audit `error_class` values produced by the pipeline itself.
pub mod error_classes {
    pub const TASK_VALIDATION: &str = "TaskValidationError";
    pub const QUEUE_PAYLOAD: &str = "QueuePayloadError";
    pub const POLICY_DENIED: &str = "PolicyDenied";
    pub const RATE_LIMITED: &str = "RateLimitError";
    pub const ADAPTER_VALIDATION: &str = "AdapterValidationError";
    pub const TRANSIENT_NETWORK: &str = "TransientNetworkError";
    pub const UPSTREAM_RATE_LIMIT: &str = "UpstreamRateLimitError";
    pub const PANIC: &str = "Panic";
    pub const ATTEMPTS_EXHAUSTED: &str = "AttemptsExhausted";
}

pub fn is_fetch_task(task_type: TaskType) -> bool {
    FETCH_TASK_TYPES.contains(&task_type)
}

pub fn is_allowed_format(format: &str) -> bool {
    ALLOWED_FORMATS.contains(&format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_task_types() {
        assert!(is_fetch_task(TaskType::Crawl));
        assert!(is_fetch_task(TaskType::Scrape));
        assert!(!is_fetch_task(TaskType::Search));
        assert!(!is_fetch_task(TaskType::Import));
    }

    #[test]
    fn test_allowed_formats() {
        assert!(is_allowed_format("markdown"));
        assert!(is_allowed_format("screenshot"));
        assert!(!is_allowed_format("pdf"));
    }
}
