use acquisition_core::models::{Payload, TaskType};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for generating domain names
pub fn domain_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,12}\\.(com|org|net|io)"
}

/// Strategy for generating source identifiers
pub fn source_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

pub fn task_type_strategy() -> impl Strategy<Value = TaskType> {
    prop::sample::select(TaskType::ALL.to_vec())
}

/// Strategy for JSON leaves, including non-ASCII strings
pub fn json_leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "\\PC{0,16}".prop_map(Value::String),
    ]
}

/// Strategy for payload maps up to two levels deep
pub fn payload_strategy() -> impl Strategy<Value = Payload> {
    let nested = prop::collection::btree_map("[a-z_]{1,8}", json_leaf_strategy(), 0..4)
        .prop_map(|m| Value::Object(m.into_iter().collect()));
    let value = prop_oneof![json_leaf_strategy(), nested];
    prop::collection::btree_map("[a-z_]{1,8}", value, 0..6).prop_map(|m| m.into_iter().collect())
}

