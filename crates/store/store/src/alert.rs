use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metahub_core::{AlertChannel, AlertHistory, AlertId, AlertRule, AlertRuleId, TenantId, UserId};

use crate::error::StoreError;

/// Alert rules and their firing history.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Persist a rule.
    async fn create_rule(&self, rule: AlertRule) -> Result<(), StoreError>;

    /// Fetch a rule by id.
    async fn get_rule(&self, id: &AlertRuleId) -> Result<Option<AlertRule>, StoreError>;

    /// Every active rule across all tenants, for the evaluator sweep.
    async fn list_active_rules(&self) -> Result<Vec<AlertRule>, StoreError>;

    /// Record a firing on the rule: bump `trigger_count` and set
    /// `last_triggered_at`.
    async fn record_trigger(&self, id: &AlertRuleId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Insert a firing record.
    async fn insert_history(&self, history: AlertHistory) -> Result<(), StoreError>;

    /// Fetch a firing record by id.
    async fn get_history(&self, id: &AlertId) -> Result<Option<AlertHistory>, StoreError>;

    /// Record which channels a notification actually reached.
    async fn set_history_notified(
        &self,
        id: &AlertId,
        channels: &[AlertChannel],
    ) -> Result<(), StoreError>;

    /// Move a firing from `triggered` to `acknowledged`. Conflicts when the
    /// record is in any other state.
    async fn acknowledge(
        &self,
        id: &AlertId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<AlertHistory, StoreError>;

    /// Move a firing from `triggered` or `acknowledged` to `resolved`.
    async fn resolve(&self, id: &AlertId, at: DateTime<Utc>) -> Result<AlertHistory, StoreError>;

    /// Recent firings of a tenant, newest first.
    async fn list_history(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<AlertHistory>, StoreError>;
}
