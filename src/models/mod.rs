pub mod audit_log;
pub mod task;
pub mod task_transition;

// Re-export core models for easy access
pub use audit_log::{AuditLogRecord, AuditOutcome, NewAuditEntry};
pub use task::{Payload, TaskId, TaskSchema, TaskSpec, TaskType};
pub use task_transition::TaskTransition;
