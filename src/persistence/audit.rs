//! # Audit Logger
//!
//! Durable record of every scheduler and worker decision. Each decision
//! branch calls [`AuditLogger::log`] exactly once. Records are append-only.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Result;
use crate::models::{AuditLogRecord, AuditOutcome, NewAuditEntry};

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: AuditLogRecord) -> Result<()>;

    /// All records in append order
    async fn list(&self) -> Result<Vec<AuditLogRecord>>;

    async fn list_for_task(&self, task_id: &str) -> Result<Vec<AuditLogRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: RwLock<Vec<AuditLogRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, record: AuditLogRecord) -> Result<()> {
        self.records.write().push(record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AuditLogRecord>> {
        Ok(self.records.read().clone())
    }

    async fn list_for_task(&self, task_id: &str) -> Result<Vec<AuditLogRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|record| record.task_id == task_id)
            .cloned()
            .collect())
    }
}

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").finish_non_exhaustive()
    }
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Assign an id and timestamp, append, and return the stored record
    pub async fn log(&self, entry: NewAuditEntry) -> Result<AuditLogRecord> {
        let record = AuditLogRecord {
            audit_id: Uuid::new_v4(),
            task_id: entry.task_id,
            policy_id: entry.policy_id,
            outcome: entry.outcome,
            params: entry.params,
            attempt: entry.attempt,
            error_class: entry.error_class,
            source_id: entry.source_id,
            domain: entry.domain,
            created_at: entry.created_at.unwrap_or_else(|| self.clock.now()),
        };

        match record.outcome {
            AuditOutcome::Succeeded | AuditOutcome::Deferred => info!(
                task_id = %record.task_id,
                outcome = %record.outcome,
                attempt = record.attempt,
                domain = record.domain.as_deref(),
                error_class = record.error_class.as_deref(),
                "📝 AUDIT"
            ),
            AuditOutcome::Denied | AuditOutcome::Failed | AuditOutcome::RetryScheduled => warn!(
                task_id = %record.task_id,
                outcome = %record.outcome,
                attempt = record.attempt,
                domain = record.domain.as_deref(),
                error_class = record.error_class.as_deref(),
                params = %record.params,
                "📝 AUDIT"
            ),
        }

        self.store.append(record.clone()).await?;
        Ok(record)
    }
}
