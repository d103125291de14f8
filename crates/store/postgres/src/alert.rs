use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use metahub_core::{AlertChannel, AlertHistory, AlertId, AlertRule, AlertRuleId, TenantId, UserId};
use metahub_store::{AlertStore, StoreError};

use crate::rows::{db_err, enum_str, from_json, parse_enum, to_json};

/// Postgres-backed [`AlertStore`].
pub struct PostgresAlertStore {
    pool: PgPool,
}

impl PostgresAlertStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: String,
    tenant: String,
    name: String,
    condition: serde_json::Value,
    notify_channels: serde_json::Value,
    notify_config: serde_json::Value,
    cooldown_minutes: i32,
    last_triggered_at: Option<DateTime<Utc>>,
    trigger_count: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for AlertRule {
    type Error = StoreError;

    fn try_from(row: RuleRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: AlertRuleId::new(row.id),
            tenant: TenantId::new(row.tenant),
            name: row.name,
            condition: from_json(row.condition)?,
            notify_channels: from_json(row.notify_channels)?,
            notify_config: from_json(row.notify_config)?,
            cooldown_minutes: u32::try_from(row.cooldown_minutes.max(1)).unwrap_or(1),
            last_triggered_at: row.last_triggered_at,
            trigger_count: u64::try_from(row.trigger_count).unwrap_or(0),
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: String,
    tenant: String,
    rule_id: String,
    status: String,
    condition_snapshot: serde_json::Value,
    notified_via: serde_json::Value,
    acknowledged_by: Option<String>,
    acknowledged_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    triggered_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for AlertHistory {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: AlertId::new(row.id),
            tenant: TenantId::new(row.tenant),
            rule_id: AlertRuleId::new(row.rule_id),
            status: parse_enum(&row.status)?,
            condition_snapshot: row.condition_snapshot,
            notified_via: from_json(row.notified_via)?,
            acknowledged_by: row.acknowledged_by.map(UserId::new),
            acknowledged_at: row.acknowledged_at,
            resolved_at: row.resolved_at,
            triggered_at: row.triggered_at,
        })
    }
}

const RULE_COLUMNS: &str = "id, tenant, name, condition, notify_channels, notify_config, \
     cooldown_minutes, last_triggered_at, trigger_count, is_active, created_at";

const HISTORY_COLUMNS: &str = "id, tenant, rule_id, status, condition_snapshot, notified_via, \
     acknowledged_by, acknowledged_at, resolved_at, triggered_at";

#[async_trait]
impl AlertStore for PostgresAlertStore {
    async fn create_rule(&self, rule: AlertRule) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mh_alert_rules \
             (id, tenant, name, condition, notify_channels, notify_config, cooldown_minutes, \
              last_triggered_at, trigger_count, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(rule.id.as_str())
        .bind(rule.tenant.as_str())
        .bind(&rule.name)
        .bind(to_json(&rule.condition)?)
        .bind(to_json(&rule.notify_channels)?)
        .bind(to_json(&rule.notify_config)?)
        .bind(i32::try_from(rule.cooldown_minutes).unwrap_or(i32::MAX))
        .bind(rule.last_triggered_at)
        .bind(i64::try_from(rule.trigger_count).unwrap_or(i64::MAX))
        .bind(rule.is_active)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_rule(&self, id: &AlertRuleId) -> Result<Option<AlertRule>, StoreError> {
        let row: Option<RuleRow> =
            sqlx::query_as(&format!("SELECT {RULE_COLUMNS} FROM mh_alert_rules WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(AlertRule::try_from).transpose()
    }

    async fn list_active_rules(&self) -> Result<Vec<AlertRule>, StoreError> {
        let rows: Vec<RuleRow> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM mh_alert_rules WHERE is_active ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(AlertRule::try_from).collect()
    }

    async fn record_trigger(&self, id: &AlertRuleId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE mh_alert_rules SET trigger_count = trigger_count + 1, last_triggered_at = $2 \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("alert rule {id}")));
        }
        Ok(())
    }

    async fn insert_history(&self, history: AlertHistory) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mh_alert_history \
             (id, tenant, rule_id, status, condition_snapshot, notified_via, acknowledged_by, \
              acknowledged_at, resolved_at, triggered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(history.id.as_str())
        .bind(history.tenant.as_str())
        .bind(history.rule_id.as_str())
        .bind(enum_str(&history.status)?)
        .bind(&history.condition_snapshot)
        .bind(to_json(&history.notified_via)?)
        .bind(history.acknowledged_by.as_ref().map(UserId::as_str))
        .bind(history.acknowledged_at)
        .bind(history.resolved_at)
        .bind(history.triggered_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_history(&self, id: &AlertId) -> Result<Option<AlertHistory>, StoreError> {
        let row: Option<HistoryRow> = sqlx::query_as(&format!(
            "SELECT {HISTORY_COLUMNS} FROM mh_alert_history WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(AlertHistory::try_from).transpose()
    }

    async fn set_history_notified(
        &self,
        id: &AlertId,
        channels: &[AlertChannel],
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE mh_alert_history SET notified_via = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(to_json(&channels)?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("alert {id}")));
        }
        Ok(())
    }

    async fn acknowledge(
        &self,
        id: &AlertId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<AlertHistory, StoreError> {
        let row: Option<HistoryRow> = sqlx::query_as(&format!(
            "UPDATE mh_alert_history SET status = 'acknowledged', acknowledged_by = $2, \
             acknowledged_at = $3 \
             WHERE id = $1 AND status = 'triggered' \
             RETURNING {HISTORY_COLUMNS}"
        ))
        .bind(id.as_str())
        .bind(user.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => row.try_into(),
            None => self.conflict_or_missing(id, "triggered").await,
        }
    }

    async fn resolve(&self, id: &AlertId, at: DateTime<Utc>) -> Result<AlertHistory, StoreError> {
        let row: Option<HistoryRow> = sqlx::query_as(&format!(
            "UPDATE mh_alert_history SET status = 'resolved', resolved_at = $2 \
             WHERE id = $1 AND status IN ('triggered', 'acknowledged') \
             RETURNING {HISTORY_COLUMNS}"
        ))
        .bind(id.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => row.try_into(),
            None => self.conflict_or_missing(id, "triggered or acknowledged").await,
        }
    }

    async fn list_history(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<AlertHistory>, StoreError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(&format!(
            "SELECT {HISTORY_COLUMNS} FROM mh_alert_history \
             WHERE tenant = $1 ORDER BY triggered_at DESC LIMIT $2"
        ))
        .bind(tenant.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(AlertHistory::try_from).collect()
    }
}

impl PostgresAlertStore {
    /// Resolve a zero-row conditional update into `Conflict` or `NotFound`.
    async fn conflict_or_missing(
        &self,
        id: &AlertId,
        expected: &str,
    ) -> Result<AlertHistory, StoreError> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT status FROM mh_alert_history WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        match found {
            Some((status,)) => Err(StoreError::Conflict {
                expected: expected.to_owned(),
                found: status,
            }),
            None => Err(StoreError::NotFound(format!("alert {id}"))),
        }
    }
}
