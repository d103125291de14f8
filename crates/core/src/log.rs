use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    /// Returns the level as a snake_case string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// Functional area a log entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Webhook,
    Delivery,
    Oauth,
    Whatsapp,
    Mapping,
    System,
    Billing,
    Auth,
    Alert,
}

impl LogCategory {
    /// Returns the category as a snake_case string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Delivery => "delivery",
            Self::Oauth => "oauth",
            Self::Whatsapp => "whatsapp",
            Self::Mapping => "mapping",
            Self::System => "system",
            Self::Billing => "billing",
            Self::Auth => "auth",
            Self::Alert => "alert",
        }
    }
}

/// A structured, append-only log record scoped to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LogEntry {
    /// Unique record identifier.
    pub id: String,

    /// Tenant that owns this record.
    pub tenant: TenantId,

    /// Severity.
    pub level: LogLevel,

    /// Functional area.
    pub category: LogCategory,

    /// Machine-readable action tag, e.g. `webhook.received`.
    pub action: String,

    /// Human-readable message.
    pub message: String,

    /// Optional reference to the affected resource (event id, route id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Structured context.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub metadata: serde_json::Value,

    /// Optional operation duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    /// Create a log entry with empty metadata, stamped now.
    #[must_use]
    pub fn new(
        tenant: impl Into<TenantId>,
        level: LogLevel,
        category: LogCategory,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant: tenant.into(),
            level,
            category,
            action: action.into(),
            message: message.into(),
            resource: None,
            metadata: serde_json::Value::Null,
            duration_ms: None,
            created_at: Utc::now(),
        }
    }

    /// Set the resource reference.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Set the structured metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the operation duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}
