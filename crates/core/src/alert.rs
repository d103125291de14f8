use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AlertId, AlertRuleId, TenantId, UserId};

/// A rule condition together with its type-specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "condition_type", content = "condition_config", rename_all = "snake_case")]
pub enum AlertCondition {
    /// Fraction of events in the window that ended in `failed` or `dlq`
    /// reaches the threshold. Requires at least one event in the window.
    ErrorRate {
        threshold_pct: f64,
        window_minutes: i64,
    },

    /// Count of events currently in the DLQ reaches the threshold.
    DlqThreshold { threshold: u64 },

    /// Average delivery latency (delivered_at - created_at) over delivered
    /// events in the window reaches the threshold.
    LatencyThreshold {
        threshold_ms: u64,
        window_minutes: i64,
    },

    /// No events were created in the last `minutes`.
    NoEvents { minutes: i64 },

    /// The last `threshold` finished attempts were all failures.
    ConsecutiveFails { threshold: u32 },

    /// Reserved. Never fires.
    Custom {
        #[cfg_attr(feature = "openapi", schema(value_type = Object))]
        config: serde_json::Value,
    },
}

/// Channel an alert notification is fanned out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AlertChannel {
    InApp,
    Email,
    Webhook,
}

/// Per-channel notification parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NotifyConfig {
    /// Recipient addresses for the email channel.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_to: Vec<String>,

    /// Target URL for the webhook channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// A user-defined alert rule: condition, cooldown and channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AlertRule {
    /// Unique rule identifier.
    pub id: AlertRuleId,

    /// Tenant that owns this rule.
    pub tenant: TenantId,

    /// Human-readable name.
    pub name: String,

    /// Condition with its configuration.
    pub condition: AlertCondition,

    /// Channels notified when the rule fires.
    pub notify_channels: Vec<AlertChannel>,

    /// Per-channel parameters.
    #[serde(default)]
    pub notify_config: NotifyConfig,

    /// Minimum minutes between two firings. At least 1.
    pub cooldown_minutes: u32,

    /// When the rule last fired.
    pub last_triggered_at: Option<DateTime<Utc>>,

    /// How many times the rule has fired.
    pub trigger_count: u64,

    /// Inactive rules are never evaluated.
    pub is_active: bool,

    /// Timestamp when the rule was created.
    pub created_at: DateTime<Utc>,
}

impl AlertRule {
    /// Create an active in-app rule with a 60 minute cooldown.
    #[must_use]
    pub fn new(tenant: impl Into<TenantId>, name: impl Into<String>, condition: AlertCondition) -> Self {
        Self {
            id: AlertRuleId::generate(),
            tenant: tenant.into(),
            name: name.into(),
            condition,
            notify_channels: vec![AlertChannel::InApp],
            notify_config: NotifyConfig::default(),
            cooldown_minutes: 60,
            last_triggered_at: None,
            trigger_count: 0,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Set the notification channels.
    #[must_use]
    pub fn with_channels(mut self, channels: Vec<AlertChannel>) -> Self {
        self.notify_channels = channels;
        self
    }

    /// Set the per-channel configuration.
    #[must_use]
    pub fn with_notify_config(mut self, config: NotifyConfig) -> Self {
        self.notify_config = config;
        self
    }

    /// Set the cooldown, floored at one minute.
    #[must_use]
    pub fn with_cooldown_minutes(mut self, minutes: u32) -> Self {
        self.cooldown_minutes = minutes.max(1);
        self
    }

    /// Whether the rule is inside its cooldown window at `now`.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.last_triggered_at.is_some_and(|last| {
            now - last < chrono::Duration::minutes(i64::from(self.cooldown_minutes))
        })
    }
}

/// Lifecycle state of one firing of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Triggered,
    Acknowledged,
    Resolved,
}

/// One firing of an alert rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AlertHistory {
    /// Unique identifier of this firing.
    pub id: AlertId,

    /// Tenant that owns the rule.
    pub tenant: TenantId,

    /// Rule that fired.
    pub rule_id: AlertRuleId,

    /// Lifecycle state.
    pub status: AlertStatus,

    /// Measured numeric values that crossed the threshold.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub condition_snapshot: serde_json::Value,

    /// Channels the notification actually reached.
    pub notified_via: Vec<AlertChannel>,

    /// Who acknowledged, when status is at least `acknowledged`.
    pub acknowledged_by: Option<UserId>,

    /// When the firing was acknowledged.
    pub acknowledged_at: Option<DateTime<Utc>>,

    /// When the firing was resolved.
    pub resolved_at: Option<DateTime<Utc>>,

    /// When the rule fired.
    pub triggered_at: DateTime<Utc>,
}

impl AlertHistory {
    /// Record a fresh firing with an empty `notified_via`.
    #[must_use]
    pub fn triggered(rule: &AlertRule, condition_snapshot: serde_json::Value) -> Self {
        Self {
            id: AlertId::generate(),
            tenant: rule.tenant.clone(),
            rule_id: rule.id.clone(),
            status: AlertStatus::Triggered,
            condition_snapshot,
            notified_via: Vec::new(),
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            triggered_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> AlertRule {
        AlertRule::new("ws-1", "dlq watch", AlertCondition::DlqThreshold { threshold: 3 })
    }

    #[test]
    fn cooldown_floor_is_one_minute() {
        let r = rule().with_cooldown_minutes(0);
        assert_eq!(r.cooldown_minutes, 1);
    }

    #[test]
    fn in_cooldown_window() {
        let mut r = rule().with_cooldown_minutes(10);
        let now = Utc::now();
        assert!(!r.in_cooldown(now));
        r.last_triggered_at = Some(now - chrono::Duration::minutes(5));
        assert!(r.in_cooldown(now));
        r.last_triggered_at = Some(now - chrono::Duration::minutes(11));
        assert!(!r.in_cooldown(now));
    }

    #[test]
    fn condition_serde_shape() {
        let cond = AlertCondition::ErrorRate {
            threshold_pct: 25.0,
            window_minutes: 60,
        };
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["condition_type"], "error_rate");
        assert_eq!(json["condition_config"]["threshold_pct"], 25.0);
    }

    #[test]
    fn triggered_history_starts_empty() {
        let r = rule();
        let h = AlertHistory::triggered(&r, serde_json::json!({"dlq_count": 4}));
        assert_eq!(h.status, AlertStatus::Triggered);
        assert!(h.notified_via.is_empty());
        assert_eq!(h.rule_id, r.id);
    }
}
