//! The mapping engine proper: pure, no I/O, never fails on bad data.

use std::sync::LazyLock;

use metahub_core::{Mapping, MappingMode, MappingRule};
use regex::Regex;
use serde_json::Value;

use crate::condition;
use crate::error::MappingError;
use crate::path;
use crate::transform::{self, TransformOutcome};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder regex"));

/// Result of applying a mapping: the output payload plus warnings for every
/// rule that degraded instead of applying cleanly.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingOutput {
    /// The transformed payload.
    pub output: Value,
    /// Human-readable notes about skipped rules, type errors and
    /// unresolved placeholders.
    pub warnings: Vec<String>,
}

/// Apply a mapping to a payload.
///
/// Only structurally invalid mappings fail; every data problem is reported
/// through `warnings` while the engine keeps going. Calling twice on the
/// same inputs produces identical output.
pub fn apply(mapping: &Mapping, payload: &Value) -> Result<MappingOutput, MappingError> {
    match mapping.mode {
        MappingMode::FieldMap => {
            if mapping.template.is_some() {
                return Err(MappingError::TemplateInFieldMap);
            }
            Ok(apply_field_map(mapping, payload))
        }
        MappingMode::Template => {
            if !mapping.rules.is_empty() {
                return Err(MappingError::RulesInTemplate);
            }
            let template = mapping.template.as_deref().ok_or(MappingError::MissingTemplate)?;
            Ok(apply_template(mapping, template, payload))
        }
    }
}

fn apply_field_map(mapping: &Mapping, payload: &Value) -> MappingOutput {
    let mut output = if mapping.pass_through {
        payload.clone()
    } else {
        Value::Object(serde_json::Map::new())
    };
    let mut warnings = Vec::new();

    for rule in &mapping.rules {
        if let Some(value) = evaluate_rule(rule, payload, &mut warnings)
            && !path::write(&mut output, &rule.target_path, value)
        {
            warnings.push(format!("unwritable target path '{}'", rule.target_path));
        }
    }

    merge_static_fields(mapping, &mut output, &mut warnings);
    MappingOutput { output, warnings }
}

/// Resolve one rule to the value it writes, or `None` when the rule skips.
fn evaluate_rule(rule: &MappingRule, payload: &Value, warnings: &mut Vec<String>) -> Option<Value> {
    let resolved = path::resolve(payload, &rule.source_path).cloned();

    // Absent source falls back to the default, otherwise the rule skips.
    let (value, from_default) = match resolved {
        Some(v) => (v, false),
        None => match &rule.default_value {
            Some(default) => (default.clone(), true),
            None => return None,
        },
    };

    let value = match rule.transform {
        Some(t) => match transform::apply(t, &value) {
            TransformOutcome::Value(v) => v,
            TransformOutcome::Absent => {
                // A consumed value falls back to the default once.
                match (&rule.default_value, from_default) {
                    (Some(default), false) => default.clone(),
                    _ => return None,
                }
            }
            TransformOutcome::TypeError(msg) => {
                warnings.push(format!("rule '{}': {msg}", rule.source_path));
                match (&rule.default_value, from_default) {
                    (Some(default), false) => default.clone(),
                    _ => return None,
                }
            }
        },
        None => value,
    };

    if let Some(cond) = &rule.condition
        && !condition::holds(cond, payload)
    {
        return None;
    }

    Some(value)
}

fn merge_static_fields(mapping: &Mapping, output: &mut Value, warnings: &mut Vec<String>) {
    if mapping.static_fields.is_empty() {
        return;
    }
    let Some(object) = output.as_object_mut() else {
        warnings.push("static_fields ignored: output is not an object".to_owned());
        return;
    };
    for (key, value) in &mapping.static_fields {
        if mapping.pass_through {
            // Computed and passed-through values win over statics.
            object.entry(key.clone()).or_insert_with(|| value.clone());
        } else {
            object.insert(key.clone(), value.clone());
        }
    }
}

fn apply_template(mapping: &Mapping, template: &str, payload: &Value) -> MappingOutput {
    let mut warnings = Vec::new();

    let rendered = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
        let p = &caps[1];
        match path::resolve(payload, p) {
            Some(v) => path::stringify(v),
            None => {
                warnings.push(format!("unresolved placeholder '{{{{{p}}}}}'"));
                String::new()
            }
        }
    });

    // The rendered text becomes a JSON value when it parses, a string
    // otherwise. Static fields only apply to a parsed object.
    let output = match serde_json::from_str::<Value>(&rendered) {
        Ok(mut value) => {
            if !mapping.static_fields.is_empty() {
                if let Some(object) = value.as_object_mut() {
                    for (key, v) in &mapping.static_fields {
                        object.insert(key.clone(), v.clone());
                    }
                } else {
                    warnings.push("static_fields ignored in template mode: output is not an object".to_owned());
                }
            }
            value
        }
        Err(_) => {
            if !mapping.static_fields.is_empty() {
                warnings.push("static_fields ignored in template mode: output is not JSON".to_owned());
            }
            Value::String(rendered.into_owned())
        }
    };

    MappingOutput { output, warnings }
}

#[cfg(test)]
mod tests {
    use metahub_core::{Condition, Transform};
    use serde_json::json;

    use super::*;

    fn field_map() -> Mapping {
        Mapping::new("ws-1", "m")
    }

    #[test]
    fn empty_field_map_yields_empty_object() {
        let result = apply(&field_map(), &json!({"a": 1})).unwrap();
        assert_eq!(result.output, json!({}));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn rule_copies_and_creates_nesting() {
        let mapping = field_map().with_rule(MappingRule::new("contact.name", "lead.full_name"));
        let result = apply(&mapping, &json!({"contact": {"name": "Ada"}})).unwrap();
        assert_eq!(result.output, json!({"lead": {"full_name": "Ada"}}));
    }

    #[test]
    fn absent_source_uses_default_else_skips() {
        let mapping = field_map()
            .with_rule(MappingRule::new("missing", "a").with_default(json!("fallback")))
            .with_rule(MappingRule::new("also_missing", "b"));
        let result = apply(&mapping, &json!({})).unwrap();
        assert_eq!(result.output, json!({"a": "fallback"}));
    }

    #[test]
    fn transform_type_error_warns_and_uses_default() {
        let mapping = field_map().with_rule(
            MappingRule::new("n", "out")
                .with_transform(Transform::Uppercase)
                .with_default(json!("DEFAULT")),
        );
        let result = apply(&mapping, &json!({"n": 42})).unwrap();
        assert_eq!(result.output, json!({"out": "DEFAULT"}));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn transform_type_error_without_default_skips() {
        let mapping = field_map()
            .with_rule(MappingRule::new("n", "out").with_transform(Transform::Trim));
        let result = apply(&mapping, &json!({"n": 42})).unwrap();
        assert_eq!(result.output, json!({}));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn condition_gates_the_write() {
        let mapping = field_map().with_rule(
            MappingRule::new("name", "out").with_condition(Condition::Equals {
                path: "status".into(),
                value: "new".into(),
            }),
        );
        let hit = apply(&mapping, &json!({"name": "Ada", "status": "new"})).unwrap();
        assert_eq!(hit.output, json!({"out": "Ada"}));
        let miss = apply(&mapping, &json!({"name": "Ada", "status": "old"})).unwrap();
        assert_eq!(miss.output, json!({}));
    }

    #[test]
    fn static_fields_win_over_computed() {
        let mapping = field_map()
            .with_rule(MappingRule::new("a", "source"))
            .with_static_field("source", json!("static"));
        let result = apply(&mapping, &json!({"a": "computed"})).unwrap();
        assert_eq!(result.output, json!({"source": "static"}));
    }

    #[test]
    fn pass_through_keeps_payload_and_computed_wins() {
        let mapping = field_map()
            .with_pass_through()
            .with_static_field("kept", json!("static"))
            .with_static_field("a", json!("static"));
        let result = apply(&mapping, &json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(result.output, json!({"a": 1, "b": 2, "kept": "static"}));
    }

    #[test]
    fn field_map_with_template_is_structural_error() {
        let mut mapping = field_map();
        mapping.template = Some("{{a}}".into());
        assert_eq!(apply(&mapping, &json!({})), Err(MappingError::TemplateInFieldMap));
    }

    #[test]
    fn template_substitutes_and_parses_json() {
        let mapping = Mapping::template(
            "ws-1",
            "t",
            r#"{"name": "{{contact.name}}", "first": "{{items[0]}}"}"#,
        );
        let result = apply(&mapping, &json!({"contact": {"name": "Ada"}, "items": ["x"]})).unwrap();
        assert_eq!(result.output, json!({"name": "Ada", "first": "x"}));
    }

    #[test]
    fn template_absent_path_renders_empty_and_warns() {
        let mapping = Mapping::template("ws-1", "t", "hello {{missing}}!");
        let result = apply(&mapping, &json!({})).unwrap();
        assert_eq!(result.output, json!("hello !"));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn template_static_fields_merge_only_into_objects() {
        let mapping = Mapping::template("ws-1", "t", r#"{"a": "{{a}}"}"#)
            .with_static_field("source", json!("hub"));
        let result = apply(&mapping, &json!({"a": "x"})).unwrap();
        assert_eq!(result.output, json!({"a": "x", "source": "hub"}));

        let mapping = Mapping::template("ws-1", "t", "plain {{a}}").with_static_field("s", json!(1));
        let result = apply(&mapping, &json!({"a": "x"})).unwrap();
        assert_eq!(result.output, json!("plain x"));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn template_without_text_is_structural_error() {
        let mut mapping = Mapping::template("ws-1", "t", "x");
        mapping.template = None;
        assert_eq!(apply(&mapping, &json!({})), Err(MappingError::MissingTemplate));
    }

    #[test]
    fn apply_is_deterministic() {
        let mapping = field_map()
            .with_rule(MappingRule::new("a", "x.y"))
            .with_static_field("s1", json!(1))
            .with_static_field("s2", json!(2));
        let payload = json!({"a": [1, {"b": "c"}]});
        let one = apply(&mapping, &payload).unwrap();
        let two = apply(&mapping, &payload).unwrap();
        assert_eq!(
            serde_json::to_vec(&one.output).unwrap(),
            serde_json::to_vec(&two.output).unwrap()
        );
    }
}
