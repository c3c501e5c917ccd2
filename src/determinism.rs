//! # Deterministic Task Identity
//!
//! Task ids are a pure function of logical content: the canonical JSON
//! encoding of `{task_type, source_id, domain, payload, seed}` is hashed with
//! SHA-256 and the hex digest becomes the name of a version 5 UUID in the DNS
//! namespace.
//!
//! ## Canonical Encoding
//!
//! - object keys sorted by their UTF-8 bytes, at every depth
//! - `,` and `:` separators with no whitespace
//! - strings escaped to ASCII (`\uXXXX`, surrogate pairs above the BMP)
//! - numbers in `serde_json`'s shortest round-trip form
//!
//! None of these depend on locale, platform or map insertion order.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{Payload, TaskId, TaskSpec, TaskType};

/// Encode a JSON value canonically.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => write_string(text, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (index, (key, item)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

fn write_string(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='\u{7f}' => out.push(ch),
            _ => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }
    out.push('"');
}

/// Lowercase hex SHA-256 of a string.
pub fn sha256_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Derive the task id for a piece of logical content.
pub fn deterministic_task_id(
    seed: &str,
    task_type: TaskType,
    source_id: &str,
    domain: &str,
    payload: &Payload,
) -> TaskId {
    let content = serde_json::json!({
        "task_type": task_type.as_str(),
        "source_id": source_id,
        "domain": domain,
        "payload": payload,
        "seed": seed,
    });
    let digest = sha256_hex(&canonical_json(&content));
    TaskId::new(Uuid::new_v5(&Uuid::NAMESPACE_DNS, digest.as_bytes()))
}

/// Drop repeated ids, keeping the first occurrence of each.
pub fn dedupe_task_ids<I>(task_ids: I) -> Vec<TaskId>
where
    I: IntoIterator<Item = TaskId>,
{
    let mut seen = HashSet::new();
    task_ids
        .into_iter()
        .filter(|task_id| seen.insert(*task_id))
        .collect()
}

/// Drop tasks whose id was already seen, keeping the first occurrence.
pub fn dedupe_tasks<I>(tasks: I) -> Vec<TaskSpec>
where
    I: IntoIterator<Item = TaskSpec>,
{
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| seen.insert(task.task_id))
        .collect()
}
