//! # Persistence
//!
//! Store seams for task state and the audit trail, with in-memory
//! implementations. Durable backends implement the same traits.

pub mod audit;
pub mod task_repository;

pub use audit::{AuditLogger, AuditStore, InMemoryAuditStore};
pub use task_repository::{InMemoryTaskRepository, TaskStore};
