//! # Worker Pool
//!
//! Drives [`TaskWorker`] from a queue backend.
//!
//! - **Polling**: `start()` spawns `pool_size` loops, each popping due items
//!   every `poll_interval_ms` and processing them in `(scheduled_at, task_id)`
//!   order. `pop_due` removes atomically, so loops never share an item.
//! - **Push**: `run_push_consumer()` drives the worker from a
//!   [`DelayedDispatchQueue`](crate::messaging::DelayedDispatchQueue) receiver.
//! - **Deterministic**: `drain_once()` processes everything due right now on
//!   the caller's task, for tests and single-shot tooling.
//!
//! Waiting for capacity is a re-enqueue, never a sleep inside a loop, so one
//! saturated domain cannot hold a poller hostage. When a cycle fails on
//! infrastructure the item is re-enqueued `error_requeue_delay_seconds` later.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::{add_seconds, Clock};
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::messaging::{QueueBackend, QueueError, QueueItem};
use crate::orchestration::{ProcessOutcome, TaskWorker};

/// Everything one loop needs, cheap to clone into a spawned task
#[derive(Clone)]
struct Dispatcher {
    worker: Arc<TaskWorker>,
    queue: Arc<dyn QueueBackend>,
    clock: Arc<dyn Clock>,
    error_requeue_delay_seconds: f64,
}

impl Dispatcher {
    /// Process one item; infrastructure errors are logged and the item re-enqueued
    async fn dispatch(&self, item: QueueItem) -> Option<ProcessOutcome> {
        match self.worker.process_task(item.task_id).await {
            Ok(outcome) => {
                debug!(task_id = %item.task_id, job_id = %item.job_id, outcome = ?outcome, "Queue item processed");
                Some(outcome)
            }
            Err(e) => {
                let retry_at = add_seconds(self.clock.now(), self.error_requeue_delay_seconds);
                error!(
                    task_id = %item.task_id,
                    job_id = %item.job_id,
                    error = %e,
                    retry_at = %retry_at,
                    "❌ Worker cycle failed; re-enqueueing"
                );
                match self.worker.requeue_after_error(item.task_id, retry_at).await {
                    Ok(true) => {}
                    Ok(false) => warn!(task_id = %item.task_id, "Task vanished before re-enqueue"),
                    Err(requeue_error) => error!(
                        task_id = %item.task_id,
                        error = %requeue_error,
                        "💥 Re-enqueue failed; task needs manual recovery"
                    ),
                }
                None
            }
        }
    }

    async fn poll(&self) -> std::result::Result<usize, QueueError> {
        let items = self.queue.pop_due(self.clock.now()).await?;
        let count = items.len();
        for item in items {
            self.dispatch(item).await;
        }
        Ok(count)
    }
}

pub struct WorkerPool {
    dispatcher: Dispatcher,
    config: WorkerConfig,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("running_loops", &self.handles.lock().len())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn new(
        worker: Arc<TaskWorker>,
        queue: Arc<dyn QueueBackend>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            dispatcher: Dispatcher {
                worker,
                queue,
                clock,
                error_requeue_delay_seconds: config.error_requeue_delay_seconds,
            },
            config,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process every item due now, in queue order, and return how many were popped
    pub async fn drain_once(&self) -> Result<usize> {
        Ok(self.dispatcher.poll().await?)
    }

    /// Spawn the polling loops
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            warn!("Worker pool already started");
            return;
        }
        // A previous shutdown leaves the flag set
        self.shutdown_tx.send_replace(false);

        for loop_index in 0..self.config.pool_size {
            let dispatcher = self.dispatcher.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            let interval = self.config.poll_interval();
            handles.push(tokio::spawn(async move {
                poll_loop(loop_index, dispatcher, interval, shutdown_rx).await;
            }));
        }
        info!(
            pool_size = self.config.pool_size,
            poll_interval_ms = self.config.poll_interval_ms,
            queue = self.dispatcher.queue.backend_name(),
            "🚀 Worker pool started"
        );
    }

    /// Deliver items from a push-based backend until the channel closes or the pool shuts down
    pub fn run_push_consumer(&self, mut receiver: mpsc::UnboundedReceiver<QueueItem>) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("📬 Push consumer started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!("Shutdown signal received by push consumer");
                        break;
                    }
                    item = receiver.recv() => match item {
                        Some(item) => {
                            let dispatcher = dispatcher.clone();
                            tokio::spawn(async move {
                                dispatcher.dispatch(item).await;
                            });
                        }
                        None => {
                            debug!("Push channel closed");
                            break;
                        }
                    }
                }
            }
            info!("Push consumer stopped");
        })
    }

    /// Signal every loop to stop and wait for them
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker loop terminated abnormally");
            }
        }
        info!("🛑 Worker pool stopped");
    }
}

async fn poll_loop(
    loop_index: usize,
    dispatcher: Dispatcher,
    interval: std::time::Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(loop_index, "Poll loop started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        match dispatcher.poll().await {
            Ok(0) => {}
            Ok(count) => debug!(loop_index, count, "Drained due items"),
            Err(QueueError::PopUnsupported { backend }) => {
                error!(
                    loop_index,
                    backend,
                    "💥 Queue backend cannot be polled; use run_push_consumer"
                );
                break;
            }
            Err(e) => warn!(loop_index, error = %e, "Polling failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_rx.changed() => {
                debug!(loop_index, "Shutdown signal received");
                break;
            }
        }
    }
    debug!(loop_index, "Poll loop stopped");
}
