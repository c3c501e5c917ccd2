//! Task builders for integration tests

use super::harness::{POLICY_ID, SOURCE_ID};
use acquisition_core::models::{Payload, TaskType};
use acquisition_core::orchestration::TaskRequest;
use serde_json::json;

/// A payload every fetch validation rule accepts
pub fn fetch_payload(url: &str) -> Payload {
    json!({
        "url": url,
        "formats": {"markdown": true, "html": true},
        "change_tracking": {"modes": ["git-diff"]},
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

pub fn crawl_request(domain: &str, url: &str) -> TaskRequest {
    TaskRequest::new(TaskType::Crawl, SOURCE_ID, domain, fetch_payload(url)).with_policy_id(POLICY_ID)
}

pub fn scrape_request(domain: &str, url: &str) -> TaskRequest {
    TaskRequest::new(TaskType::Scrape, SOURCE_ID, domain, fetch_payload(url)).with_policy_id(POLICY_ID)
}

/// A non-fetch task; completes without invoking the handler
pub fn search_request(domain: &str, query: &str) -> TaskRequest {
    let payload = json!({"query": query}).as_object().cloned().unwrap_or_default();
    TaskRequest::new(TaskType::Search, SOURCE_ID, domain, payload).with_policy_id(POLICY_ID)
}
