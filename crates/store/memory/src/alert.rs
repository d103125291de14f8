use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metahub_core::{
    AlertChannel, AlertHistory, AlertId, AlertRule, AlertRuleId, AlertStatus, TenantId, UserId,
};
use metahub_store::{AlertStore, StoreError};

/// In-memory [`AlertStore`].
#[derive(Default)]
pub struct MemoryAlertStore {
    rules: RwLock<HashMap<AlertRuleId, AlertRule>>,
    history: RwLock<HashMap<AlertId, AlertHistory>>,
}

impl MemoryAlertStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn create_rule(&self, rule: AlertRule) -> Result<(), StoreError> {
        self.rules
            .write()
            .expect("rule map poisoned")
            .insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn get_rule(&self, id: &AlertRuleId) -> Result<Option<AlertRule>, StoreError> {
        Ok(self.rules.read().expect("rule map poisoned").get(id).cloned())
    }

    async fn list_active_rules(&self) -> Result<Vec<AlertRule>, StoreError> {
        let rules = self.rules.read().expect("rule map poisoned");
        let mut out: Vec<AlertRule> = rules.values().filter(|r| r.is_active).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn record_trigger(&self, id: &AlertRuleId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut rules = self.rules.write().expect("rule map poisoned");
        let rule = rules
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("alert rule {id}")))?;
        rule.trigger_count += 1;
        rule.last_triggered_at = Some(at);
        Ok(())
    }

    async fn insert_history(&self, history: AlertHistory) -> Result<(), StoreError> {
        self.history
            .write()
            .expect("history map poisoned")
            .insert(history.id.clone(), history);
        Ok(())
    }

    async fn get_history(&self, id: &AlertId) -> Result<Option<AlertHistory>, StoreError> {
        Ok(self.history.read().expect("history map poisoned").get(id).cloned())
    }

    async fn set_history_notified(
        &self,
        id: &AlertId,
        channels: &[AlertChannel],
    ) -> Result<(), StoreError> {
        let mut history = self.history.write().expect("history map poisoned");
        let row = history
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {id}")))?;
        row.notified_via = channels.to_vec();
        Ok(())
    }

    async fn acknowledge(
        &self,
        id: &AlertId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<AlertHistory, StoreError> {
        let mut history = self.history.write().expect("history map poisoned");
        let row = history
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {id}")))?;
        if row.status != AlertStatus::Triggered {
            return Err(StoreError::Conflict {
                expected: "triggered".into(),
                found: format!("{:?}", row.status).to_lowercase(),
            });
        }
        row.status = AlertStatus::Acknowledged;
        row.acknowledged_by = Some(user.clone());
        row.acknowledged_at = Some(at);
        Ok(row.clone())
    }

    async fn resolve(&self, id: &AlertId, at: DateTime<Utc>) -> Result<AlertHistory, StoreError> {
        let mut history = self.history.write().expect("history map poisoned");
        let row = history
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {id}")))?;
        if row.status == AlertStatus::Resolved {
            return Err(StoreError::Conflict {
                expected: "triggered or acknowledged".into(),
                found: "resolved".into(),
            });
        }
        row.status = AlertStatus::Resolved;
        row.resolved_at = Some(at);
        Ok(row.clone())
    }

    async fn list_history(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<AlertHistory>, StoreError> {
        let history = self.history.read().expect("history map poisoned");
        let mut out: Vec<AlertHistory> = history
            .values()
            .filter(|h| h.tenant == *tenant)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        out.truncate(limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use metahub_core::AlertCondition;

    use super::*;

    fn rule() -> AlertRule {
        AlertRule::new("ws-1", "dlq", AlertCondition::DlqThreshold { threshold: 3 })
    }

    #[tokio::test]
    async fn trigger_bumps_rule_counters() {
        let store = MemoryAlertStore::new();
        let r = rule();
        store.create_rule(r.clone()).await.unwrap();
        let at = Utc::now();
        store.record_trigger(&r.id, at).await.unwrap();
        let r = store.get_rule(&r.id).await.unwrap().unwrap();
        assert_eq!(r.trigger_count, 1);
        assert_eq!(r.last_triggered_at, Some(at));
    }

    #[tokio::test]
    async fn lifecycle_triggered_acknowledged_resolved() {
        let store = MemoryAlertStore::new();
        let r = rule();
        store.create_rule(r.clone()).await.unwrap();
        let h = AlertHistory::triggered(&r, serde_json::json!({"dlq_count": 4}));
        store.insert_history(h.clone()).await.unwrap();

        let user = UserId::new("u-1");
        let acked = store.acknowledge(&h.id, &user, Utc::now()).await.unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by, Some(user.clone()));

        // A second acknowledge conflicts.
        let err = store.acknowledge(&h.id, &user, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let resolved = store.resolve(&h.id, Utc::now()).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        let err = store.resolve(&h.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn inactive_rules_are_not_listed() {
        let store = MemoryAlertStore::new();
        let mut inactive = rule();
        inactive.is_active = false;
        store.create_rule(inactive).await.unwrap();
        store.create_rule(rule()).await.unwrap();
        assert_eq!(store.list_active_rules().await.unwrap().len(), 1);
    }
}
