use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MappingId, SourceType, TenantId};

/// How a mapping produces its output payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    /// Build the output from an ordered list of field rules.
    FieldMap,
    /// Render a free-form text template with `{{path}}` placeholders.
    Template,
}

/// The closed set of value transforms a field rule may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Uppercase,
    Lowercase,
    Trim,
    Number,
    Boolean,
    String,
    DateIso,
    JsonParse,
    JsonStringify,
    ArrayFirst,
    ArrayLast,
    ArrayJoin,
    PhoneClean,
    EmailLower,
}

/// A boolean guard over the source payload. A rule whose condition does not
/// hold is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// The path resolves to any value (including null).
    Exists { path: String },
    /// The path resolves to a non-empty string, array or object.
    NotEmpty { path: String },
    /// The stringified value at the path equals the literal.
    Equals { path: String, value: String },
    /// The stringified value at the path differs from the literal.
    NotEquals { path: String, value: String },
}

/// One field rule of a `field_map` mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MappingRule {
    /// Dotted/indexed JSON path into the source payload.
    pub source_path: String,

    /// Dotted path into the output object. Intermediate objects are created
    /// as needed.
    pub target_path: String,

    /// Optional transform applied after resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,

    /// Value used when the source path resolves to nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,

    /// Optional guard; the rule is skipped unless it holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl MappingRule {
    /// Create a rule copying `source_path` to `target_path` unchanged.
    #[must_use]
    pub fn new(source_path: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
            transform: None,
            default_value: None,
            condition: None,
        }
    }

    /// Set the transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Set the default value.
    #[must_use]
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Set the condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// A reusable declarative JSON-to-JSON transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Mapping {
    /// Unique mapping identifier.
    pub id: MappingId,

    /// Tenant that owns this mapping.
    pub tenant: TenantId,

    /// Human-readable name.
    pub name: String,

    /// Output mode.
    pub mode: MappingMode,

    /// Field rules, applied in order. Only meaningful in `field_map` mode.
    #[serde(default)]
    pub rules: Vec<MappingRule>,

    /// Template text with `{{path}}` placeholders. Only meaningful in
    /// `template` mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Fields merged into the output after rules run.
    #[serde(default)]
    pub static_fields: HashMap<String, serde_json::Value>,

    /// In `field_map` mode, start from a shallow copy of the source payload
    /// instead of an empty object.
    #[serde(default)]
    pub pass_through: bool,

    /// Editor hint for which source kind this mapping is written against.
    pub source_type: SourceType,

    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,

    /// Timestamp when the mapping was created.
    pub created_at: DateTime<Utc>,
}

impl Mapping {
    /// Create an empty `field_map` mapping for any source type.
    #[must_use]
    pub fn new(tenant: impl Into<TenantId>, name: impl Into<String>) -> Self {
        Self {
            id: MappingId::generate(),
            tenant: tenant.into(),
            name: name.into(),
            mode: MappingMode::FieldMap,
            rules: Vec::new(),
            template: None,
            static_fields: HashMap::new(),
            pass_through: false,
            source_type: SourceType::Any,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    /// Create a `template` mapping from template text.
    #[must_use]
    pub fn template(
        tenant: impl Into<TenantId>,
        name: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        let mut mapping = Self::new(tenant, name);
        mapping.mode = MappingMode::Template;
        mapping.template = Some(template.into());
        mapping
    }

    /// Append a field rule.
    #[must_use]
    pub fn with_rule(mut self, rule: MappingRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Insert a static field.
    #[must_use]
    pub fn with_static_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.static_fields.insert(key.into(), value);
        self
    }

    /// Enable pass-through mode.
    #[must_use]
    pub fn with_pass_through(mut self) -> Self {
        self.pass_through = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_builder() {
        let rule = MappingRule::new("contact.name", "lead.full_name")
            .with_transform(Transform::Trim)
            .with_default(serde_json::json!("unknown"));
        assert_eq!(rule.source_path, "contact.name");
        assert_eq!(rule.transform, Some(Transform::Trim));
        assert!(rule.condition.is_none());
    }

    #[test]
    fn mapping_serde_roundtrip() {
        let mapping = Mapping::new("ws-1", "lead-map")
            .with_rule(MappingRule::new("a", "b"))
            .with_static_field("source", serde_json::json!("metahub"));
        let json = serde_json::to_string(&mapping).unwrap();
        let back: Mapping = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, mapping.id);
        assert_eq!(back.rules.len(), 1);
        assert_eq!(back.mode, MappingMode::FieldMap);
    }

    #[test]
    fn transform_snake_case_names() {
        assert_eq!(serde_json::to_string(&Transform::DateIso).unwrap(), "\"date_iso\"");
        assert_eq!(serde_json::to_string(&Transform::PhoneClean).unwrap(), "\"phone_clean\"");
    }

    #[test]
    fn condition_tagged_serde() {
        let cond = Condition::Equals {
            path: "status".into(),
            value: "new".into(),
        };
        let json = serde_json::to_string(&cond).unwrap();
        assert!(json.contains("\"op\":\"equals\""));
    }
}
