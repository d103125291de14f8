//! The closed transform set of field rules.

use chrono::{DateTime, TimeZone, Utc};
use metahub_core::Transform;
use serde_json::Value;

/// Outcome of applying a transform to a resolved value.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// The transformed value.
    Value(Value),
    /// The transform consumed the value (empty coercion, NaN). The rule
    /// writes nothing.
    Absent,
    /// The input type does not fit the transform. The rule falls back to
    /// its default, or skips.
    TypeError(String),
}

/// Apply a transform. Behaviour is exactly as each transform is named; see
/// the per-arm comments for the edge rules.
pub fn apply(transform: Transform, value: &Value) -> TransformOutcome {
    use TransformOutcome::{Absent, TypeError};

    match transform {
        // String-only transforms.
        Transform::Uppercase => match value.as_str() {
            Some(s) => ok(s.to_uppercase()),
            None => type_error("uppercase", value),
        },
        Transform::Lowercase => match value.as_str() {
            Some(s) => ok(s.to_lowercase()),
            None => type_error("lowercase", value),
        },
        Transform::Trim => match value.as_str() {
            Some(s) => ok(s.trim().to_owned()),
            None => type_error("trim", value),
        },

        // Best-effort coercions. Empty input coerces to absent.
        Transform::Number => match value {
            Value::Number(_) => TransformOutcome::Value(value.clone()),
            Value::Bool(b) => TransformOutcome::Value(Value::from(u8::from(*b))),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Absent;
                }
                match trimmed.parse::<f64>() {
                    Ok(n) if n.is_finite() => match serde_json::Number::from_f64(n) {
                        Some(num) => TransformOutcome::Value(Value::Number(num)),
                        None => Absent,
                    },
                    // NaN and infinities coerce to absent.
                    Ok(_) => Absent,
                    Err(_) => Absent,
                }
            }
            _ => type_error("number", value),
        },
        Transform::Boolean => match value {
            Value::Bool(_) => TransformOutcome::Value(value.clone()),
            Value::Number(n) => TransformOutcome::Value(Value::Bool(n.as_f64() != Some(0.0))),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Absent;
                }
                match trimmed.to_lowercase().as_str() {
                    "true" | "1" | "yes" => TransformOutcome::Value(Value::Bool(true)),
                    "false" | "0" | "no" => TransformOutcome::Value(Value::Bool(false)),
                    _ => Absent,
                }
            }
            _ => type_error("boolean", value),
        },
        Transform::String => match value {
            Value::String(s) if s.is_empty() => Absent,
            Value::Null => Absent,
            Value::String(_) => TransformOutcome::Value(value.clone()),
            other => ok(other.to_string()),
        },

        // Heterogeneous date parsing, RFC3339 UTC out.
        Transform::DateIso => parse_date(value),

        Transform::JsonParse => match value.as_str() {
            Some(s) => match serde_json::from_str::<Value>(s) {
                Ok(parsed) => TransformOutcome::Value(parsed),
                Err(e) => TypeError(format!("json_parse: {e}")),
            },
            None => type_error("json_parse", value),
        },
        Transform::JsonStringify => ok(value.to_string()),

        // Identity on non-arrays.
        Transform::ArrayFirst => match value.as_array() {
            Some(items) => items.first().map_or(Absent, |v| TransformOutcome::Value(v.clone())),
            None => TransformOutcome::Value(value.clone()),
        },
        Transform::ArrayLast => match value.as_array() {
            Some(items) => items.last().map_or(Absent, |v| TransformOutcome::Value(v.clone())),
            None => TransformOutcome::Value(value.clone()),
        },
        Transform::ArrayJoin => match value.as_array() {
            Some(items) => ok(items
                .iter()
                .map(crate::path::stringify)
                .collect::<Vec<_>>()
                .join(",")),
            None => TransformOutcome::Value(value.clone()),
        },

        Transform::PhoneClean => match value.as_str() {
            Some(s) => {
                let digits: String = s.chars().filter(char::is_ascii_digit).collect();
                let cleaned = if s.trim_start().starts_with('+') {
                    format!("+{digits}")
                } else {
                    digits
                };
                ok(cleaned)
            }
            None => type_error("phone_clean", value),
        },
        Transform::EmailLower => match value.as_str() {
            Some(s) => ok(s.trim().to_lowercase()),
            None => type_error("email_lower", value),
        },
    }
}

fn ok(s: String) -> TransformOutcome {
    TransformOutcome::Value(Value::String(s))
}

fn type_error(name: &str, value: &Value) -> TransformOutcome {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    TransformOutcome::TypeError(format!("{name} cannot apply to {kind}"))
}

/// Parse RFC3339 strings, unix seconds and unix milliseconds; emit RFC3339
/// in UTC. The seconds/millis boundary is 10^12: anything at or above it is
/// read as milliseconds.
fn parse_date(value: &Value) -> TransformOutcome {
    let parsed: Option<DateTime<Utc>> = match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return TransformOutcome::Absent;
            }
            DateTime::parse_from_rfc3339(trimmed)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| trimmed.parse::<i64>().ok().and_then(epoch_to_datetime))
        }
        Value::Number(n) => n.as_i64().and_then(epoch_to_datetime),
        _ => return type_error("date_iso", value),
    };
    match parsed {
        Some(dt) => ok(dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        None => TransformOutcome::Absent,
    }
}

fn epoch_to_datetime(epoch: i64) -> Option<DateTime<Utc>> {
    if epoch.abs() >= 1_000_000_000_000 {
        Utc.timestamp_millis_opt(epoch).single()
    } else {
        Utc.timestamp_opt(epoch, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value_of(outcome: TransformOutcome) -> Value {
        match outcome {
            TransformOutcome::Value(v) => v,
            other => panic!("expected value, got {other:?}"),
        }
    }

    #[test]
    fn string_transforms() {
        assert_eq!(value_of(apply(Transform::Uppercase, &json!("abc"))), json!("ABC"));
        assert_eq!(value_of(apply(Transform::Lowercase, &json!("AbC"))), json!("abc"));
        assert_eq!(value_of(apply(Transform::Trim, &json!("  x  "))), json!("x"));
        assert!(matches!(
            apply(Transform::Uppercase, &json!(5)),
            TransformOutcome::TypeError(_)
        ));
    }

    #[test]
    fn number_coercion() {
        assert_eq!(value_of(apply(Transform::Number, &json!("42"))), json!(42.0));
        assert_eq!(value_of(apply(Transform::Number, &json!(true))), json!(1));
        assert_eq!(apply(Transform::Number, &json!("")), TransformOutcome::Absent);
        assert_eq!(apply(Transform::Number, &json!("NaN")), TransformOutcome::Absent);
        assert_eq!(apply(Transform::Number, &json!("abc")), TransformOutcome::Absent);
    }

    #[test]
    fn boolean_coercion() {
        assert_eq!(value_of(apply(Transform::Boolean, &json!("yes"))), json!(true));
        assert_eq!(value_of(apply(Transform::Boolean, &json!("0"))), json!(false));
        assert_eq!(value_of(apply(Transform::Boolean, &json!(2))), json!(true));
        assert_eq!(apply(Transform::Boolean, &json!("")), TransformOutcome::Absent);
        assert_eq!(apply(Transform::Boolean, &json!("maybe")), TransformOutcome::Absent);
    }

    #[test]
    fn string_coercion_empty_is_absent() {
        assert_eq!(apply(Transform::String, &json!("")), TransformOutcome::Absent);
        assert_eq!(apply(Transform::String, &json!(null)), TransformOutcome::Absent);
        assert_eq!(value_of(apply(Transform::String, &json!(12))), json!("12"));
    }

    #[test]
    fn date_iso_heterogeneous_inputs() {
        let rfc = value_of(apply(Transform::DateIso, &json!("2024-03-01T10:00:00+02:00")));
        assert_eq!(rfc, json!("2024-03-01T08:00:00Z"));

        let secs = value_of(apply(Transform::DateIso, &json!(1_700_000_000)));
        assert_eq!(secs, json!("2023-11-14T22:13:20Z"));

        let millis = value_of(apply(Transform::DateIso, &json!(1_700_000_000_000_i64)));
        assert_eq!(millis, json!("2023-11-14T22:13:20Z"));

        let from_string = value_of(apply(Transform::DateIso, &json!("1700000000")));
        assert_eq!(from_string, json!("2023-11-14T22:13:20Z"));

        assert_eq!(apply(Transform::DateIso, &json!("not a date")), TransformOutcome::Absent);
    }

    #[test]
    fn json_parse_and_stringify_once() {
        let parsed = value_of(apply(Transform::JsonParse, &json!("{\"a\":1}")));
        assert_eq!(parsed, json!({"a": 1}));
        let text = value_of(apply(Transform::JsonStringify, &json!({"a": 1})));
        assert_eq!(text, json!("{\"a\":1}"));
    }

    #[test]
    fn array_transforms() {
        assert_eq!(value_of(apply(Transform::ArrayFirst, &json!([1, 2, 3]))), json!(1));
        assert_eq!(value_of(apply(Transform::ArrayLast, &json!([1, 2, 3]))), json!(3));
        assert_eq!(apply(Transform::ArrayFirst, &json!([])), TransformOutcome::Absent);
        // Identity on non-arrays.
        assert_eq!(value_of(apply(Transform::ArrayFirst, &json!("x"))), json!("x"));
        assert_eq!(
            value_of(apply(Transform::ArrayJoin, &json!(["a", "b", 3]))),
            json!("a,b,3")
        );
        assert_eq!(value_of(apply(Transform::ArrayJoin, &json!(7))), json!(7));
    }

    #[test]
    fn phone_clean_keeps_leading_plus() {
        assert_eq!(
            value_of(apply(Transform::PhoneClean, &json!("+49 (151) 123-456"))),
            json!("+49151123456")
        );
        assert_eq!(value_of(apply(Transform::PhoneClean, &json!("0151 / 23"))), json!("015123"));
    }

    #[test]
    fn email_lower_trims() {
        assert_eq!(
            value_of(apply(Transform::EmailLower, &json!("  Ada@Example.COM "))),
            json!("ada@example.com")
        );
    }
}
