//! Worker execution state machine against scripted handlers.

mod common;

use acquisition_core::execution::HandlerError;
use acquisition_core::messaging::QueueBackend;
use acquisition_core::models::{AuditOutcome, TaskSpec};
use acquisition_core::orchestration::ProcessOutcome;
use acquisition_core::persistence::TaskStore;
use acquisition_core::policy::PolicyStatus;
use acquisition_core::state_machine::TaskStatus;
use chrono::Duration;
use common::*;

async fn submit(harness: &PipelineHarness, request: acquisition_core::orchestration::TaskRequest) -> TaskSpec {
    let task = harness.core.task_factory.create_task(request);
    harness
        .core
        .task_scheduler
        .submit_task(task)
        .await
        .unwrap()
        .expect("task should be admitted")
}

#[tokio::test]
async fn test_successful_fetch() {
    let harness = PipelineHarness::new();
    let task = submit(&harness, crawl_request("example.com", "https://example.com/a")).await;

    let outcome = harness.core.task_worker.process_task(task.task_id).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Succeeded);
    assert!(outcome.is_terminal());

    let stored = harness.task(task.task_id).await;
    assert_eq!(stored.status, TaskStatus::Succeeded);
    assert_eq!(stored.attempt, 1);
    assert_eq!(harness.handler.calls(), vec![(task.task_id, 1)]);

    let records = harness.audit_for(task.task_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, AuditOutcome::Succeeded);
    assert_eq!(records[0].attempt, 1);
    assert_eq!(records[0].error_class, None);
    assert_eq!(records[0].policy_id.as_deref(), Some(POLICY_ID));
    assert_eq!(records[0].domain.as_deref(), Some("example.com"));
    assert_eq!(harness.core.rate_limiter.state_snapshot("example.com").inflight, 0);

    let transitions = harness.repository.transitions_for(&task.task_id).await.unwrap();
    let path: Vec<(TaskStatus, TaskStatus)> = transitions.iter().map(|t| (t.from_status, t.to_status)).collect();
    assert_eq!(
        path,
        vec![
            (TaskStatus::Queued, TaskStatus::Running),
            (TaskStatus::Running, TaskStatus::Succeeded),
        ]
    );
}

#[tokio::test]
async fn test_non_fetch_task_skips_handler() {
    let harness = PipelineHarness::new();
    let task = submit(&harness, search_request("example.com", "annual report")).await;

    let outcome = harness.core.task_worker.process_task(task.task_id).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Succeeded);
    assert!(harness.handler.calls().is_empty());
    assert_eq!(harness.task(task.task_id).await.attempt, 1);
}

#[tokio::test]
async fn test_policy_revoked_after_submission_denies() {
    let harness = PipelineHarness::new();
    let task = submit(&harness, crawl_request("example.com", "https://example.com/a")).await;

    harness
        .gate
        .upsert_policy(SOURCE_ID, "policy-2", PolicyStatus::ManualOnly);

    let outcome = harness.core.task_worker.process_task(task.task_id).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Denied);

    let stored = harness.task(task.task_id).await;
    assert_eq!(stored.status, TaskStatus::Denied);
    assert_eq!(stored.attempt, 0);
    assert_eq!(stored.policy_id.as_deref(), Some("policy-2"));
    assert!(harness.handler.calls().is_empty());
    assert_eq!(harness.core.rate_limiter.state_snapshot("example.com").inflight, 0);

    let records = harness.audit_for(task.task_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, AuditOutcome::Denied);
    assert_eq!(records[0].error_class.as_deref(), Some("PolicyDenied"));
    assert_eq!(records[0].policy_id.as_deref(), Some("policy-2"));
    assert_eq!(records[0].params["reason"], "manual_only: ImportTask only; requested CrawlTask denied");
}

#[tokio::test]
async fn test_upstream_rate_limit_retries_then_succeeds() {
    let harness = PipelineHarness::new();
    let task = submit(
        &harness,
        crawl_request("example.com", "https://example.com/a").with_max_attempts(2),
    )
    .await;
    harness
        .handler
        .push(Err(HandlerError::UpstreamRateLimit("429 Too Many Requests".to_string())));

    let start = harness.now();
    let outcome = harness.core.task_worker.process_task(task.task_id).await.unwrap();
    // Default policy: 5s base backoff
    assert_eq!(outcome, ProcessOutcome::RetryScheduled { at: start + Duration::seconds(5) });

    let stored = harness.task(task.task_id).await;
    assert_eq!(stored.status, TaskStatus::Queued);
    assert_eq!(stored.attempt, 1);
    assert_eq!(stored.scheduled_at, start + Duration::seconds(5));
    assert!(harness.queue.contains(&task.task_id));

    harness.clock.advance(5.0);
    let outcome = harness.core.task_worker.process_task(task.task_id).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Succeeded);

    let records = harness.audit_for(task.task_id).await;
    let outcomes: Vec<AuditOutcome> = records.iter().map(|r| r.outcome).collect();
    let attempts: Vec<u32> = records.iter().map(|r| r.attempt).collect();
    assert_eq!(outcomes, vec![AuditOutcome::RetryScheduled, AuditOutcome::Succeeded]);
    assert_eq!(attempts, vec![1, 2]);
    assert_eq!(records[0].error_class.as_deref(), Some("UpstreamRateLimitError"));
    assert_eq!(
        records[0].params["retry_at"],
        (start + Duration::seconds(5)).to_rfc3339()
    );

    let calls: Vec<u32> = harness.handler.calls().into_iter().map(|(_, attempt)| attempt).collect();
    assert_eq!(calls, vec![1, 2]);

    let state = harness.core.rate_limiter.state_snapshot("example.com");
    assert_eq!(state.error_count, 0);
    assert_eq!(state.cooldown_until, None);
    assert_eq!(state.inflight, 0);
}

#[tokio::test]
async fn test_transient_error_exhausts_attempts() {
    let harness = PipelineHarness::new();
    let task = submit(
        &harness,
        crawl_request("example.com", "https://example.com/a").with_max_attempts(1),
    )
    .await;
    harness
        .handler
        .push(Err(HandlerError::TransientNetwork("connection reset".to_string())));

    let outcome = harness.core.task_worker.process_task(task.task_id).await.unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Failed {
            error_class: "TransientNetworkError".to_string()
        }
    );

    let stored = harness.task(task.task_id).await;
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.attempt, 1);
    assert!(!harness.queue.contains(&task.task_id));

    let records = harness.audit_for(task.task_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, AuditOutcome::Failed);
    assert_eq!(records[0].attempt, 1);

    // The domain still cools down even though the task is finished
    let state = harness.core.rate_limiter.state_snapshot("example.com");
    assert_eq!(state.error_count, 1);
    assert!(state.cooldown_until.is_some());
    assert_eq!(state.inflight, 0);
}

#[tokio::test]
async fn test_adapter_validation_is_never_retried() {
    let harness = PipelineHarness::new();
    let task = submit(
        &harness,
        scrape_request("example.com", "https://example.com/a").with_max_attempts(3),
    )
    .await;
    harness
        .handler
        .push(Err(HandlerError::AdapterValidation("url must be absolute".to_string())));

    let outcome = harness.core.task_worker.process_task(task.task_id).await.unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Failed {
            error_class: "AdapterValidationError".to_string()
        }
    );
    assert_eq!(harness.task(task.task_id).await.attempt, 1);
    assert_eq!(harness.handler.calls().len(), 1);

    let state = harness.core.rate_limiter.state_snapshot("example.com");
    assert_eq!(state.error_count, 0);
    assert_eq!(state.inflight, 0);

    let records = harness.audit_for(task.task_id).await;
    assert_eq!(records[0].params["reason"], "url must be absolute");
}

#[tokio::test]
async fn test_handler_panic_fails_task_and_releases_capacity() {
    let harness = PipelineHarness::new();
    let task = submit(&harness, crawl_request("example.com", "https://example.com/a")).await;
    harness.handler.push_panic("parser exploded");

    let outcome = harness.core.task_worker.process_task(task.task_id).await.unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Failed {
            error_class: "Panic".to_string()
        }
    );
    assert_eq!(harness.task(task.task_id).await.status, TaskStatus::Failed);
    assert_eq!(harness.core.rate_limiter.state_snapshot("example.com").inflight, 0);

    let records = harness.audit_for(task.task_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error_class.as_deref(), Some("Panic"));
    assert_eq!(records[0].params["reason"], "parser exploded");
}

#[tokio::test]
async fn test_unclassified_error_is_terminal() {
    let harness = PipelineHarness::new();
    let task = submit(
        &harness,
        crawl_request("example.com", "https://example.com/a").with_max_attempts(5),
    )
    .await;
    harness
        .handler
        .push(Err(HandlerError::unclassified("DecodeError", "unexpected byte")));

    let outcome = harness.core.task_worker.process_task(task.task_id).await.unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Failed {
            error_class: "DecodeError".to_string()
        }
    );
    assert_eq!(harness.task(task.task_id).await.attempt, 1);
}

#[tokio::test]
async fn test_settled_task_is_skipped() {
    let harness = PipelineHarness::new();
    let task = submit(&harness, crawl_request("example.com", "https://example.com/a")).await;
    harness.core.task_worker.process_task(task.task_id).await.unwrap();

    let outcome = harness.core.task_worker.process_task(task.task_id).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Skipped(TaskStatus::Succeeded));
    assert_eq!(harness.handler.calls().len(), 1);
    assert_eq!(harness.audit_for(task.task_id).await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_delivery_runs_once() {
    let harness = PipelineHarness::new();
    let task = submit(&harness, crawl_request("example.com", "https://example.com/a")).await;

    let worker = harness.core.task_worker.clone();
    let (first, second) = tokio::join!(
        worker.process_task(task.task_id),
        harness.core.task_worker.process_task(task.task_id)
    );
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|outcome| matches!(outcome, ProcessOutcome::Skipped(_)));

    assert_eq!(
        outcomes,
        vec![ProcessOutcome::Succeeded, ProcessOutcome::Skipped(TaskStatus::Succeeded)]
    );
    assert_eq!(harness.handler.calls().len(), 1);
}

#[tokio::test]
async fn test_audit_trail_is_complete() {
    let harness = PipelineHarness::new();
    let ok = submit(&harness, crawl_request("a.example", "https://a.example/")).await;
    let retry = submit(
        &harness,
        crawl_request("b.example", "https://b.example/").with_max_attempts(2),
    )
    .await;
    let fail = submit(&harness, scrape_request("c.example", "https://c.example/")).await;

    harness.core.task_worker.process_task(ok.task_id).await.unwrap();

    harness
        .handler
        .push(Err(HandlerError::TransientNetwork("timeout".to_string())));
    harness.core.task_worker.process_task(retry.task_id).await.unwrap();

    harness
        .handler
        .push(Err(HandlerError::AdapterValidation("bad selector".to_string())));
    harness.core.task_worker.process_task(fail.task_id).await.unwrap();

    harness.clock.advance(60.0);
    harness.core.task_worker.process_task(retry.task_id).await.unwrap();

    let records = harness.audit().await;
    assert_eq!(records.len(), 4);
    for record in &records {
        assert_eq!(record.error_class.is_none(), record.outcome.is_success());
        assert!(record.attempt >= 1);
    }

    for task in harness.repository.list().await.unwrap() {
        assert!(task.status.is_terminal());
        let records = harness.audit_for(task.task_id).await;
        let last = records.last().expect("every processed task is audited");
        assert_eq!(last.attempt, task.attempt);
    }
}

#[tokio::test]
async fn test_task_without_attempts_left_fails_without_running() {
    let harness = PipelineHarness::new();
    let mut task = harness
        .core
        .task_factory
        .create_task(crawl_request("example.com", "https://example.com/a"));
    task.attempt = 3;
    task.max_attempts = 3;
    harness.repository.add(task.clone(), harness.now()).await.unwrap();

    let outcome = harness.core.task_worker.process_task(task.task_id).await.unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Failed {
            error_class: "AttemptsExhausted".to_string()
        }
    );
    assert!(harness.handler.calls().is_empty());

    let stored = harness.task(task.task_id).await;
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.attempt, 3);
    assert!(!harness.queue.contains(&task.task_id));
    assert_eq!(harness.core.rate_limiter.state_snapshot("example.com").inflight, 0);

    let records = harness.audit_for(task.task_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, AuditOutcome::Failed);
    assert_eq!(records[0].attempt, 3);
}

#[tokio::test]
async fn test_store_failure_mid_cycle_returns_task_to_queue() {
    let (harness, store) = PipelineHarness::with_flaky_store();
    let task = submit(&harness, crawl_request("example.com", "https://example.com/a")).await;
    store.fail_increments(1);

    let pool = harness.core.worker_pool();
    assert_eq!(pool.drain_once().await.unwrap(), 1);

    let stored = harness.task(task.task_id).await;
    assert_eq!(stored.status, TaskStatus::Queued);
    assert_eq!(stored.attempt, 0);
    assert!(harness.queue.contains(&task.task_id));
    assert_eq!(harness.core.rate_limiter.state_snapshot("example.com").inflight, 0);
    assert!(harness.audit_for(task.task_id).await.is_empty());

    harness.clock.advance(5.0);
    assert_eq!(pool.drain_once().await.unwrap(), 1);

    let stored = harness.task(task.task_id).await;
    assert_eq!(stored.status, TaskStatus::Succeeded);
    assert_eq!(stored.attempt, 1);
    assert_eq!(harness.handler.calls(), vec![(task.task_id, 1)]);

    let transitions = harness.repository.transitions_for(&task.task_id).await.unwrap();
    let path: Vec<(TaskStatus, TaskStatus)> = transitions.iter().map(|t| (t.from_status, t.to_status)).collect();
    assert_eq!(
        path,
        vec![
            (TaskStatus::Queued, TaskStatus::Running),
            (TaskStatus::Running, TaskStatus::Queued),
            (TaskStatus::Queued, TaskStatus::Running),
            (TaskStatus::Running, TaskStatus::Succeeded),
        ]
    );
}

#[tokio::test]
async fn test_worker_pool_drains_retries_to_completion() {
    let harness = PipelineHarness::new();
    let task = submit(
        &harness,
        crawl_request("example.com", "https://example.com/a").with_max_attempts(3),
    )
    .await;
    harness
        .handler
        .push(Err(HandlerError::UpstreamRateLimit("429".to_string())));
    harness
        .handler
        .push(Err(HandlerError::UpstreamRateLimit("429".to_string())));

    let pool = harness.core.worker_pool();
    assert_eq!(pool.drain_once().await.unwrap(), 1);
    assert_eq!(pool.drain_once().await.unwrap(), 0);

    // 5s, then 10s of cooldown
    harness.clock.advance(5.0);
    assert_eq!(pool.drain_once().await.unwrap(), 1);
    harness.clock.advance(10.0);
    assert_eq!(pool.drain_once().await.unwrap(), 1);

    assert_eq!(harness.task(task.task_id).await.status, TaskStatus::Succeeded);
    assert!(harness.core.queue.list().await.unwrap().is_empty());
    assert_eq!(harness.handler.calls().len(), 3);
}
