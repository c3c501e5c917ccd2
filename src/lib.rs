#![allow(clippy::doc_markdown)] // Allow technical terms like TaskSpec, RateLimitError in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Acquisition Core Rust
//!
//! Rate-limited, policy-gated acquisition pipeline for fetch tasks.
//!
//! ## Overview
//!
//! External fetch requests ("tasks") run against domains that impose rate
//! limits and against sources governed by an acquisition policy. The pipeline
//! admits, schedules, executes and retries them under a fixed discipline and
//! leaves an append-only audit trail of every decision.
//!
//! ## Architecture
//!
//! Leaf-to-root:
//!
//! - [`clock`] - time source; a frozen clock drives deterministic tests
//! - [`determinism`] - canonical JSON and content-derived task ids
//! - [`resilience`] - per-domain admission control and error backoff
//! - [`persistence`] - task repository, transition log and audit trail
//! - [`messaging`] - queue backends (polled in-memory, push-based delayed dispatch)
//! - [`policy`] - policy gate seam plus an in-process reference gate
//! - [`execution`] - task handlers, the fetch adapter and the worker pool
//! - [`orchestration`] - task factory, scheduler, worker and core bootstrap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use acquisition_core::clock::SystemClock;
//! use acquisition_core::config::AcquisitionConfig;
//! use acquisition_core::execution::NoopHandler;
//! use acquisition_core::models::{Payload, TaskType};
//! use acquisition_core::orchestration::{AcquisitionCore, CoreComponents, TaskRequest};
//! use acquisition_core::policy::{PolicyStatus, StaticPolicyGate};
//!
//! # async fn example() -> acquisition_core::Result<()> {
//! let gate = Arc::new(StaticPolicyGate::new());
//! gate.upsert_policy("source-1", "policy-1", PolicyStatus::CrawlAllowed);
//!
//! let core = AcquisitionCore::from_components(
//!     &AcquisitionConfig::default(),
//!     CoreComponents::in_memory(Arc::new(SystemClock), gate, Arc::new(NoopHandler)),
//! );
//!
//! let task = core.task_factory.create_task(
//!     TaskRequest::new(TaskType::Search, "source-1", "example.com", Payload::new())
//!         .with_policy_id("policy-1"),
//! );
//! if let Some(admitted) = core.task_scheduler.submit_task(task).await? {
//!     core.task_worker.process_task(admitted.task_id).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod clock;
pub mod config;
pub mod constants;
pub mod determinism;
pub mod error;
pub mod execution;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod policy;
pub mod resilience;
pub mod state_machine;

pub use clock::{Clock, FrozenClock, SystemClock};
pub use config::{AcquisitionConfig, ConfigManager, ConfigurationError};
pub use error::{AcquisitionError, Result, SubmissionError};
pub use execution::{FailureDisposition, HandlerError, TaskHandler, WorkerPool};
pub use messaging::{DelayedDispatchQueue, InMemoryQueue, QueueBackend, QueueError, QueueItem};
pub use models::{AuditLogRecord, AuditOutcome, TaskId, TaskSpec, TaskTransition, TaskType};
pub use orchestration::{
    AcquisitionCore, CoreComponents, ProcessOutcome, TaskFactory, TaskRequest, TaskScheduler,
    TaskWorker,
};
pub use persistence::{AuditLogger, AuditStore, TaskStore};
pub use policy::{PolicyDecision, PolicyGate, PolicyStatus, StaticPolicyGate};
pub use resilience::{DomainPolicy, DomainRateLimiter, DomainState};
pub use state_machine::TaskStatus;
