//! # Orchestration
//!
//! The acquisition pipeline proper.
//!
//! ## Control flow
//!
//! ```text
//! caller ─▶ TaskScheduler::submit_task
//!             validate ─▶ policy ─▶ rate-limit-aware delay ─▶ persist + enqueue
//!        ─▶ queue ─▶ TaskWorker::process_task
//!             policy re-check ─▶ acquire/defer ─▶ handler ─▶ classify
//!             ─▶ repository + audit + release
//! ```
//!
//! ## Core Components
//!
//! - **TaskFactory**: content-derived task identity and default scheduling fields
//! - **TaskScheduler**: submission pipeline; denials are audited, never raised
//! - **TaskWorker**: per-task execution state machine with typed failure handling
//! - **AcquisitionCore**: bootstrap that wires one shared set of collaborators

pub mod core;
pub mod task_factory;
pub mod task_scheduler;
pub mod task_worker;
pub mod validation;

pub use self::core::{AcquisitionCore, CoreComponents};
pub use task_factory::{TaskFactory, TaskRequest};
pub use task_scheduler::TaskScheduler;
pub use task_worker::{ProcessOutcome, TaskWorker};
pub use validation::{validate_queue_payload, validate_task_schema};
