//! # Acquisition Core
//!
//! Single bootstrap path for the pipeline. Every entry point (binaries,
//! integration tests, embedding services) builds the same component graph
//! here, so the scheduler and worker always share one rate limiter, one
//! repository, one audit trail and one queue.

use std::sync::Arc;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::{AcquisitionConfig, ConfigManager, WorkerConfig};
use crate::error::Result;
use crate::execution::{TaskHandler, WorkerPool};
use crate::messaging::{InMemoryQueue, QueueBackend};
use crate::orchestration::{TaskFactory, TaskScheduler, TaskWorker};
use crate::persistence::{AuditLogger, AuditStore, InMemoryAuditStore, InMemoryTaskRepository, TaskStore};
use crate::policy::PolicyGate;
use crate::resilience::DomainRateLimiter;

/// Injected collaborators the core is assembled from
pub struct CoreComponents {
    pub clock: Arc<dyn Clock>,
    pub repository: Arc<dyn TaskStore>,
    pub audit_store: Arc<dyn AuditStore>,
    pub queue: Arc<dyn QueueBackend>,
    pub policy_gate: Arc<dyn PolicyGate>,
    pub handler: Arc<dyn TaskHandler>,
}

impl CoreComponents {
    /// In-process stores and an [`InMemoryQueue`]
    pub fn in_memory(
        clock: Arc<dyn Clock>,
        policy_gate: Arc<dyn PolicyGate>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        Self {
            clock,
            repository: Arc::new(InMemoryTaskRepository::new()),
            audit_store: Arc::new(InMemoryAuditStore::new()),
            queue: Arc::new(InMemoryQueue::new()),
            policy_gate,
            handler,
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn QueueBackend>) -> Self {
        self.queue = queue;
        self
    }
}

/// The assembled pipeline
#[derive(Clone)]
pub struct AcquisitionCore {
    pub clock: Arc<dyn Clock>,
    pub task_factory: Arc<TaskFactory>,
    pub repository: Arc<dyn TaskStore>,
    pub audit_logger: AuditLogger,
    pub queue: Arc<dyn QueueBackend>,
    pub policy_gate: Arc<dyn PolicyGate>,
    pub rate_limiter: Arc<DomainRateLimiter>,
    pub task_scheduler: Arc<TaskScheduler>,
    pub task_worker: Arc<TaskWorker>,
    pub worker_config: WorkerConfig,
}

impl std::fmt::Debug for AcquisitionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionCore")
            .field("queue", &self.queue.backend_name())
            .field("rate_limiter", &self.rate_limiter)
            .field("worker_config", &self.worker_config)
            .finish_non_exhaustive()
    }
}

impl AcquisitionCore {
    /// Load configuration for the detected environment and build an
    /// in-memory core on the system clock
    pub fn from_environment(
        policy_gate: Arc<dyn PolicyGate>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Self> {
        let config_manager = ConfigManager::load()?;
        Ok(Self::from_config_manager(&config_manager, policy_gate, handler))
    }

    pub fn from_config_manager(
        config_manager: &ConfigManager,
        policy_gate: Arc<dyn PolicyGate>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        info!(
            environment = %config_manager.environment(),
            config_path = %config_manager.config_path().display(),
            "🔧 Initializing AcquisitionCore from configuration"
        );
        let components = CoreComponents::in_memory(Arc::new(SystemClock), policy_gate, handler);
        Self::from_components(config_manager.config(), components)
    }

    pub fn from_components(config: &AcquisitionConfig, components: CoreComponents) -> Self {
        let CoreComponents {
            clock,
            repository,
            audit_store,
            queue,
            policy_gate,
            handler,
        } = components;

        let audit_logger = AuditLogger::new(audit_store, clock.clone());
        let rate_limiter = Arc::new(DomainRateLimiter::from_config(
            clock.clone(),
            &config.rate_limits,
        ));
        let task_factory = Arc::new(TaskFactory::from_config(&config.tasks, clock.clone()));

        let task_scheduler = Arc::new(TaskScheduler::new(
            queue.clone(),
            repository.clone(),
            policy_gate.clone(),
            audit_logger.clone(),
            rate_limiter.clone(),
            clock.clone(),
        ));
        let task_worker = Arc::new(TaskWorker::new(
            repository.clone(),
            queue.clone(),
            policy_gate.clone(),
            audit_logger.clone(),
            rate_limiter.clone(),
            handler,
            clock.clone(),
        ));

        info!(
            queue = queue.backend_name(),
            seed = %config.tasks.seed,
            domain_overrides = config.rate_limits.domains.len(),
            "✅ AcquisitionCore ready"
        );

        Self {
            clock,
            task_factory,
            repository,
            audit_logger,
            queue,
            policy_gate,
            rate_limiter,
            task_scheduler,
            task_worker,
            worker_config: config.worker.clone(),
        }
    }

    /// A worker pool draining this core's queue
    pub fn worker_pool(&self) -> WorkerPool {
        WorkerPool::new(
            self.task_worker.clone(),
            self.queue.clone(),
            self.clock.clone(),
            self.worker_config.clone(),
        )
    }
}
