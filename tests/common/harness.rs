//! Pipeline harness: frozen clock, in-memory stores, a static policy gate
//! and a handler that replays scripted results.

use acquisition_core::clock::{Clock, FrozenClock};
use acquisition_core::config::AcquisitionConfig;
use acquisition_core::error::{AcquisitionError, Result as StoreResult};
use acquisition_core::execution::{HandlerError, TaskHandler};
use acquisition_core::messaging::InMemoryQueue;
use acquisition_core::models::{AuditLogRecord, TaskId, TaskSpec, TaskTransition};
use acquisition_core::state_machine::TaskStatus;
use acquisition_core::orchestration::{AcquisitionCore, CoreComponents};
use acquisition_core::persistence::{AuditStore, InMemoryAuditStore, InMemoryTaskRepository, TaskStore};
use acquisition_core::policy::{PolicyStatus, StaticPolicyGate};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const SOURCE_ID: &str = "source-1";
pub const POLICY_ID: &str = "policy-1";

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

enum Step {
    Return(Result<(), HandlerError>),
    Panic(String),
}

/// Handler that replays queued steps in order, then succeeds
#[derive(Default)]
pub struct ScriptedHandler {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(TaskId, u32)>>,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: Result<(), HandlerError>) {
        self.script.lock().push_back(Step::Return(result));
    }

    pub fn push_panic(&self, message: &str) {
        self.script.lock().push_back(Step::Panic(message.to_string()));
    }

    /// `(task_id, attempt)` for every invocation
    pub fn calls(&self) -> Vec<(TaskId, u32)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TaskHandler for ScriptedHandler {
    async fn execute(&self, task: &TaskSpec) -> Result<(), HandlerError> {
        self.calls.lock().push((task.task_id, task.attempt));
        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Return(result)) => result,
            Some(Step::Panic(message)) => panic!("{message}"),
            None => Ok(()),
        }
    }
}

/// Task store whose `increment_attempt` fails a set number of times
pub struct FlakyStore {
    inner: Arc<InMemoryTaskRepository>,
    increment_failures: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryTaskRepository>) -> Self {
        Self {
            inner,
            increment_failures: AtomicU32::new(0),
        }
    }

    pub fn fail_increments(&self, times: u32) {
        self.increment_failures.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskStore for FlakyStore {
    async fn add(&self, task: TaskSpec, changed_at: DateTime<Utc>) -> StoreResult<()> {
        self.inner.add(task, changed_at).await
    }

    async fn get(&self, task_id: &TaskId) -> StoreResult<Option<TaskSpec>> {
        self.inner.get(task_id).await
    }

    async fn list(&self) -> StoreResult<Vec<TaskSpec>> {
        self.inner.list().await
    }

    async fn update_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        changed_at: DateTime<Utc>,
    ) -> StoreResult<TaskSpec> {
        self.inner.update_status(task_id, status, changed_at).await
    }

    async fn increment_attempt(&self, task_id: &TaskId) -> StoreResult<u32> {
        let failing = self
            .increment_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AcquisitionError::Store("connection reset".to_string()));
        }
        self.inner.increment_attempt(task_id).await
    }

    async fn reschedule(&self, task_id: &TaskId, scheduled_at: DateTime<Utc>) -> StoreResult<()> {
        self.inner.reschedule(task_id, scheduled_at).await
    }

    async fn set_policy_id(&self, task_id: &TaskId, policy_id: Option<String>) -> StoreResult<()> {
        self.inner.set_policy_id(task_id, policy_id).await
    }

    async fn transitions(&self) -> StoreResult<Vec<TaskTransition>> {
        self.inner.transitions().await
    }

    async fn transitions_for(&self, task_id: &TaskId) -> StoreResult<Vec<TaskTransition>> {
        self.inner.transitions_for(task_id).await
    }
}

pub struct PipelineHarness {
    pub clock: Arc<FrozenClock>,
    pub gate: Arc<StaticPolicyGate>,
    pub handler: Arc<ScriptedHandler>,
    pub repository: Arc<InMemoryTaskRepository>,
    pub audit_store: Arc<InMemoryAuditStore>,
    pub queue: Arc<InMemoryQueue>,
    pub core: AcquisitionCore,
}

impl PipelineHarness {
    /// Default configuration, with `SOURCE_ID` registered as crawl_allowed
    pub fn new() -> Self {
        Self::with_config(AcquisitionConfig::default())
    }

    pub fn with_config(config: AcquisitionConfig) -> Self {
        let repository = Arc::new(InMemoryTaskRepository::new());
        Self::assemble(config, repository.clone(), repository)
    }

    /// Pipeline whose store fails on demand; `repository` still reads the state
    pub fn with_flaky_store() -> (Self, Arc<FlakyStore>) {
        let repository = Arc::new(InMemoryTaskRepository::new());
        let store = Arc::new(FlakyStore::new(repository.clone()));
        let harness = Self::assemble(AcquisitionConfig::default(), repository, store.clone());
        (harness, store)
    }

    fn assemble(
        config: AcquisitionConfig,
        repository: Arc<InMemoryTaskRepository>,
        store: Arc<dyn TaskStore>,
    ) -> Self {
        let clock = Arc::new(FrozenClock::new(epoch()));
        let gate = Arc::new(StaticPolicyGate::new());
        gate.upsert_policy(SOURCE_ID, POLICY_ID, PolicyStatus::CrawlAllowed);
        let handler = Arc::new(ScriptedHandler::new());
        let audit_store = Arc::new(InMemoryAuditStore::new());
        let queue = Arc::new(InMemoryQueue::new());

        let core = AcquisitionCore::from_components(
            &config,
            CoreComponents {
                clock: clock.clone(),
                repository: store,
                audit_store: audit_store.clone(),
                queue: queue.clone(),
                policy_gate: gate.clone(),
                handler: handler.clone(),
            },
        );

        Self {
            clock,
            gate,
            handler,
            repository,
            audit_store,
            queue,
            core,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn task(&self, task_id: TaskId) -> TaskSpec {
        self.repository
            .get(&task_id)
            .await
            .unwrap()
            .expect("task should be stored")
    }

    pub async fn audit_for(&self, task_id: TaskId) -> Vec<AuditLogRecord> {
        self.audit_store
            .list_for_task(&task_id.to_string())
            .await
            .unwrap()
    }

    pub async fn audit(&self) -> Vec<AuditLogRecord> {
        self.audit_store.list().await.unwrap()
    }
}
