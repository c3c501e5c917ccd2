//! # Fetch Handler
//!
//! Adapter between fetch tasks (`CrawlTask`, `ScrapeTask`) and an upstream
//! fetch client. The request is built from the task payload and validated
//! before anything leaves the process; a response must carry enough content
//! to derive a content hash. Snapshot storage happens downstream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::handler::{HandlerError, TaskHandler};
use crate::constants::{is_allowed_format, SCHEMA_VERSION};
use crate::determinism::{canonical_json, sha256_hex};
use crate::models::{Payload, TaskSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub schema_version: String,
    pub url: String,
    pub formats: Payload,
    pub change_tracking: Option<Payload>,
    pub metadata: Option<Payload>,
}

impl FetchRequest {
    /// Build the request a task's payload describes
    pub fn from_task(task: &TaskSpec) -> Result<Self, HandlerError> {
        let url = task
            .payload
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerError::AdapterValidation("payload.url is required".to_string()))?;

        Ok(Self {
            schema_version: SCHEMA_VERSION.to_string(),
            url: url.to_string(),
            formats: object_field(&task.payload, "formats").unwrap_or_default(),
            change_tracking: object_field(&task.payload, "change_tracking"),
            metadata: object_field(&task.payload, "metadata"),
        })
    }

    pub fn validate(&self) -> Result<(), HandlerError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(HandlerError::AdapterValidation(format!(
                "schema_version must be {SCHEMA_VERSION}"
            )));
        }
        if self.change_tracking.is_none() {
            return Err(HandlerError::AdapterValidation(
                "change_tracking is required".to_string(),
            ));
        }

        let mut unknown: Vec<&str> = self
            .formats
            .keys()
            .map(String::as_str)
            .filter(|key| !is_allowed_format(key))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(HandlerError::AdapterValidation(format!(
                "Unsupported format field(s): {unknown:?}"
            )));
        }

        if !self.formats.get("markdown").is_some_and(is_truthy) {
            return Err(HandlerError::AdapterValidation(
                "change_tracking requires markdown format".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub http_status: u16,
    pub formats: Payload,
    pub fetched_at: String,
    pub content_hash: Option<String>,
    pub change_tracking: Option<Payload>,
    pub storage_refs: Option<Payload>,
    pub raw_content: Option<String>,
}

impl FetchResponse {
    /// Upstream hash, else hash of the raw content, else hash of the storage refs
    pub fn resolve_content_hash(&self) -> Result<String, HandlerError> {
        if let Some(hash) = self.content_hash.as_ref().filter(|h| !h.is_empty()) {
            return Ok(hash.clone());
        }
        if let Some(raw) = self.raw_content.as_ref().filter(|r| !r.is_empty()) {
            return Ok(sha256_hex(raw));
        }
        if let Some(refs) = self.storage_refs.as_ref().filter(|r| !r.is_empty()) {
            return Ok(sha256_hex(&canonical_json(&serde_json::Value::Object(refs.clone()))));
        }
        Err(HandlerError::AdapterValidation(
            "content_hash missing and no raw_content available".to_string(),
        ))
    }
}

/// Upstream fetch transport
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, HandlerError>;
}

/// Runs fetch tasks through a [`FetchClient`]
#[derive(Debug)]
pub struct FetchTaskHandler<C> {
    client: Arc<C>,
}

impl<C: FetchClient> FetchTaskHandler<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: FetchClient + 'static> TaskHandler for FetchTaskHandler<C> {
    async fn execute(&self, task: &TaskSpec) -> Result<(), HandlerError> {
        let request = FetchRequest::from_task(task)?;
        request.validate()?;
        debug!(task_id = %task.task_id, url = %request.url, "Fetching");

        let response = self.client.fetch(&request).await?;
        let content_hash = response.resolve_content_hash()?;

        info!(
            task_id = %task.task_id,
            url = %response.url,
            http_status = response.http_status,
            content_hash = %content_hash,
            "🌐 Fetch completed"
        );
        Ok(())
    }
}

fn object_field(payload: &Payload, key: &str) -> Option<Payload> {
    payload.get(key).and_then(|v| v.as_object()).cloned()
}

/// Truthiness of a JSON value: null, false, 0, "" and empty containers are false
pub(crate) fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(flag) => *flag,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
    }
}
