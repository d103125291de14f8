//! Evaluation of the tiny boolean guard DSL over source payloads.

use metahub_core::Condition;
use serde_json::Value;

use crate::path::{resolve, stringify};

/// Evaluate a condition against the source payload.
pub fn holds(condition: &Condition, payload: &Value) -> bool {
    match condition {
        Condition::Exists { path } => resolve(payload, path).is_some(),
        Condition::NotEmpty { path } => match resolve(payload, path) {
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        },
        Condition::Equals { path, value } => {
            resolve(payload, path).is_some_and(|v| stringify(v) == *value)
        }
        Condition::NotEquals { path, value } => {
            resolve(payload, path).is_some_and(|v| stringify(v) != *value)
        }
    }
}
