//! The periodic alert evaluator.
//!
//! Every tick walks the active rules, evaluates each condition against the
//! recent event window and fires the ones that cross their threshold. A
//! broken rule never blocks the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metahub_core::{
    AlertCondition, AlertHistory, AlertId, AlertRule, Caller, HubError, LogCategory, LogEntry,
    LogLevel, UserId,
};
use metahub_store::{AlertStore, EventStore, LogStore, Stores};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::error::AlertError;
use crate::notify::Notifier;

/// Default evaluation cadence.
pub const DEFAULT_EVAL_INTERVAL: Duration = Duration::from_secs(60);

/// Attempt outcomes inspected per tenant for the consecutive-failure
/// condition.
const CONSECUTIVE_SCAN_LIMIT: usize = 200;

/// Evaluates alert rules and drives the alert lifecycle.
pub struct Evaluator {
    stores: Stores,
    notifier: Notifier,
}

impl Evaluator {
    /// Create an evaluator over the shared stores.
    #[must_use]
    pub fn new(stores: Stores, notifier: Notifier) -> Self {
        Self { stores, notifier }
    }

    /// One evaluation sweep over every active rule. Returns how many rules
    /// fired. Per-rule errors are written to the log sink and skipped.
    #[instrument(skip(self))]
    pub async fn evaluate_all(&self) -> Result<u64, AlertError> {
        let rules = self.stores.alerts.list_active_rules().await?;
        let mut fired = 0;
        for rule in rules {
            match self.evaluate_rule(&rule).await {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(rule = %rule.name, error = %e, "rule evaluation failed");
                    let entry = LogEntry::new(
                        rule.tenant.clone(),
                        LogLevel::Error,
                        LogCategory::Alert,
                        "alert.evaluation_failed",
                        format!("Rule '{}' evaluation failed: {e}", rule.name),
                    );
                    let _ = self.stores.logs.append(entry).await;
                }
            }
        }
        debug!(fired, "evaluation sweep finished");
        Ok(fired)
    }

    /// Evaluate one rule; fire it when the condition holds and the rule is
    /// out of cooldown. Returns whether it fired.
    async fn evaluate_rule(&self, rule: &AlertRule) -> Result<bool, AlertError> {
        let now = Utc::now();
        if rule.in_cooldown(now) {
            debug!(rule = %rule.name, "rule in cooldown");
            return Ok(false);
        }
        let Some(snapshot) = self.measure(rule).await? else {
            return Ok(false);
        };

        let history = AlertHistory::triggered(rule, snapshot);
        let history_id = history.id.clone();
        self.stores.alerts.insert_history(history.clone()).await?;

        let reached = self.notifier.notify(rule, &history).await;
        self.stores
            .alerts
            .set_history_notified(&history_id, &reached)
            .await?;
        self.stores.alerts.record_trigger(&rule.id, now).await?;

        info!(rule = %rule.name, alert_id = %history_id, ?reached, "alert fired");
        Ok(true)
    }

    /// Measure the rule's condition. `Some(snapshot)` means it crossed the
    /// threshold; the snapshot records the numbers that did it.
    async fn measure(&self, rule: &AlertRule) -> Result<Option<serde_json::Value>, AlertError> {
        let now = Utc::now();
        match &rule.condition {
            AlertCondition::ErrorRate {
                threshold_pct,
                window_minutes,
            } => {
                let since = now - chrono::Duration::minutes(*window_minutes);
                let stats = self.stores.events.stats_since(&rule.tenant, since).await?;
                if stats.total == 0 {
                    return Ok(None);
                }
                let rate_pct = (stats.failed + stats.dlq) as f64 / stats.total as f64 * 100.0;
                Ok((rate_pct >= *threshold_pct).then(|| {
                    serde_json::json!({
                        "error_rate_pct": rate_pct,
                        "failed": stats.failed,
                        "dlq": stats.dlq,
                        "total": stats.total,
                        "threshold_pct": threshold_pct,
                        "window_minutes": window_minutes,
                    })
                }))
            }
            AlertCondition::DlqThreshold { threshold } => {
                let count = self.stores.events.count_dlq(&rule.tenant).await?;
                Ok((count >= *threshold).then(|| {
                    serde_json::json!({ "dlq_count": count, "threshold": threshold })
                }))
            }
            AlertCondition::LatencyThreshold {
                threshold_ms,
                window_minutes,
            } => {
                let since = now - chrono::Duration::minutes(*window_minutes);
                let stats = self.stores.events.stats_since(&rule.tenant, since).await?;
                let Some(avg) = stats.avg_latency_ms else {
                    return Ok(None);
                };
                Ok((avg >= *threshold_ms as f64).then(|| {
                    serde_json::json!({
                        "avg_latency_ms": avg,
                        "delivered": stats.delivered,
                        "threshold_ms": threshold_ms,
                        "window_minutes": window_minutes,
                    })
                }))
            }
            AlertCondition::NoEvents { minutes } => {
                let since = now - chrono::Duration::minutes(*minutes);
                let count = self
                    .stores
                    .events
                    .count_created_since(&rule.tenant, since)
                    .await?;
                Ok((count == 0).then(|| {
                    serde_json::json!({ "events_in_window": 0, "window_minutes": minutes })
                }))
            }
            AlertCondition::ConsecutiveFails { threshold } => {
                let outcomes = self
                    .stores
                    .events
                    .recent_attempt_outcomes(&rule.tenant, CONSECUTIVE_SCAN_LIMIT)
                    .await?;
                // Group newest-first outcomes per destination and look for
                // one whose most recent `threshold` attempts all failed.
                let mut per_destination: HashMap<&str, (u32, bool)> = HashMap::new();
                for outcome in &outcomes {
                    let entry = per_destination
                        .entry(outcome.destination_id.as_str())
                        .or_insert((0, true));
                    if entry.1 {
                        if outcome.success {
                            entry.1 = false;
                        } else {
                            entry.0 += 1;
                        }
                    }
                }
                let hit = per_destination
                    .iter()
                    .find(|(_, (streak, _))| *streak >= *threshold);
                Ok(hit.map(|(destination, (streak, _))| {
                    serde_json::json!({
                        "destination_id": destination,
                        "consecutive_failures": streak,
                        "threshold": threshold,
                    })
                }))
            }
            // Reserved; never fires.
            AlertCondition::Custom { .. } => Ok(None),
        }
    }

    /// Acknowledge a firing. Requires the caller to be a member of the
    /// alert's tenant and the firing to be in `triggered`.
    pub async fn acknowledge(
        &self,
        caller: &Caller,
        alert_id: &AlertId,
    ) -> Result<AlertHistory, HubError> {
        let history = self.require_membership(caller, alert_id).await?;
        let user: UserId = caller.user.clone();
        Ok(self
            .stores
            .alerts
            .acknowledge(&history.id, &user, Utc::now())
            .await?)
    }

    /// Resolve a firing from `triggered` or `acknowledged`.
    pub async fn resolve(
        &self,
        caller: &Caller,
        alert_id: &AlertId,
    ) -> Result<AlertHistory, HubError> {
        let history = self.require_membership(caller, alert_id).await?;
        Ok(self.stores.alerts.resolve(&history.id, Utc::now()).await?)
    }

    async fn require_membership(
        &self,
        caller: &Caller,
        alert_id: &AlertId,
    ) -> Result<AlertHistory, HubError> {
        let history = self
            .stores
            .alerts
            .get_history(alert_id)
            .await
            .map_err(HubError::from)?
            .ok_or_else(|| HubError::not_found("alert", alert_id))?;
        if !caller.is_member(&history.tenant) {
            return Err(HubError::Auth(format!(
                "caller is not a member of tenant {}",
                history.tenant
            )));
        }
        Ok(history)
    }
}

/// Spawn the evaluator loop. Returns the task handle and a shutdown
/// sender; dropping the sender (or sending on it) stops the loop after the
/// current tick.
pub fn spawn_evaluator(
    evaluator: Arc<Evaluator>,
    period: Duration,
) -> (tokio::task::JoinHandle<()>, mpsc::Sender<()>) {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let handle = tokio::spawn(async move {
        let mut timer = interval(period);
        // The first tick completes immediately; skip it so startup does not
        // double-evaluate with the first scheduled tick.
        timer.tick().await;
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = evaluator.evaluate_all().await {
                        warn!(error = %e, "evaluation sweep failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("alert evaluator stopping");
                    break;
                }
            }
        }
    });
    (handle, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use metahub_core::{
        AlertChannel, AlertStatus, DeliveryEvent, DestinationId, EventStatus, RouteId, SourceType,
        TenantId,
    };
    use metahub_store_memory::memory_stores;

    use super::*;

    fn evaluator(stores: &Stores) -> Evaluator {
        Evaluator::new(stores.clone(), Notifier::new(Arc::clone(&stores.logs)))
    }

    async fn insert_dlq_events(stores: &Stores, tenant: &str, count: usize) {
        for _ in 0..count {
            let mut event = DeliveryEvent::new(
                tenant,
                RouteId::generate(),
                DestinationId::generate(),
                SourceType::Whatsapp,
                serde_json::json!({}),
            );
            event.status = EventStatus::Dlq;
            event.next_retry_at = None;
            stores.events.create(event).await.unwrap();
        }
    }

    fn dlq_rule(threshold: u64, cooldown_minutes: u32) -> AlertRule {
        AlertRule::new("ws-1", "dlq watch", AlertCondition::DlqThreshold { threshold })
            .with_channels(vec![AlertChannel::InApp])
            .with_cooldown_minutes(cooldown_minutes)
    }

    #[tokio::test]
    async fn fires_once_then_cools_down_then_fires_again() {
        let stores = memory_stores();
        let tenant = TenantId::new("ws-1");
        let rule = dlq_rule(3, 10);
        stores.alerts.create_rule(rule.clone()).await.unwrap();
        insert_dlq_events(&stores, "ws-1", 3).await;

        let evaluator = evaluator(&stores);

        // First sweep fires.
        assert_eq!(evaluator.evaluate_all().await.unwrap(), 1);
        let history = stores.alerts.list_history(&tenant, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, AlertStatus::Triggered);
        assert_eq!(history[0].notified_via, vec![AlertChannel::InApp]);
        let rule_after = stores.alerts.get_rule(&rule.id).await.unwrap().unwrap();
        assert_eq!(rule_after.trigger_count, 1);

        // A minute later (well inside the 10 minute cooldown): nothing.
        assert_eq!(evaluator.evaluate_all().await.unwrap(), 0);
        assert_eq!(stores.alerts.list_history(&tenant, 10).await.unwrap().len(), 1);

        // Push the last trigger back past the cooldown and add more dead
        // events: the rule fires again.
        stores
            .alerts
            .record_trigger(&rule.id, Utc::now() - chrono::Duration::minutes(11))
            .await
            .unwrap();
        insert_dlq_events(&stores, "ws-1", 3).await;
        assert_eq!(evaluator.evaluate_all().await.unwrap(), 1);
        assert_eq!(stores.alerts.list_history(&tenant, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn below_threshold_does_not_fire() {
        let stores = memory_stores();
        stores.alerts.create_rule(dlq_rule(5, 1)).await.unwrap();
        insert_dlq_events(&stores, "ws-1", 4).await;
        assert_eq!(evaluator(&stores).evaluate_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn error_rate_requires_at_least_one_event() {
        let stores = memory_stores();
        let rule = AlertRule::new(
            "ws-1",
            "errors",
            AlertCondition::ErrorRate {
                threshold_pct: 50.0,
                window_minutes: 60,
            },
        );
        stores.alerts.create_rule(rule).await.unwrap();

        // Empty window: no firing.
        assert_eq!(evaluator(&stores).evaluate_all().await.unwrap(), 0);

        // One delivered, one dead: 50% error rate crosses the threshold.
        let mut ok = DeliveryEvent::new(
            "ws-1",
            RouteId::generate(),
            DestinationId::generate(),
            SourceType::Whatsapp,
            serde_json::json!({}),
        );
        ok.status = EventStatus::Delivered;
        stores.events.create(ok).await.unwrap();
        insert_dlq_events(&stores, "ws-1", 1).await;
        assert_eq!(evaluator(&stores).evaluate_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn no_events_condition_fires_on_empty_window() {
        let stores = memory_stores();
        let rule = AlertRule::new("ws-1", "silence", AlertCondition::NoEvents { minutes: 30 });
        stores.alerts.create_rule(rule).await.unwrap();
        assert_eq!(evaluator(&stores).evaluate_all().await.unwrap(), 1);

        let fresh = memory_stores();
        fresh
            .alerts
            .create_rule(AlertRule::new("ws-1", "silence", AlertCondition::NoEvents { minutes: 30 }))
            .await
            .unwrap();
        fresh
            .events
            .create(DeliveryEvent::new(
                "ws-1",
                RouteId::generate(),
                DestinationId::generate(),
                SourceType::Whatsapp,
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(evaluator(&fresh).evaluate_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn custom_condition_never_fires() {
        let stores = memory_stores();
        stores
            .alerts
            .create_rule(AlertRule::new(
                "ws-1",
                "custom",
                AlertCondition::Custom {
                    config: serde_json::json!({"anything": true}),
                },
            ))
            .await
            .unwrap();
        insert_dlq_events(&stores, "ws-1", 10).await;
        assert_eq!(evaluator(&stores).evaluate_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn broken_rule_does_not_block_others() {
        let stores = memory_stores();
        // A rule whose lifecycle bookkeeping will fail: delete it between
        // listing and trigger recording is hard to stage, so instead stage
        // a healthy rule after one that cannot fire, and assert the sweep
        // completes.
        stores
            .alerts
            .create_rule(AlertRule::new(
                "ws-1",
                "never",
                AlertCondition::Custom { config: serde_json::Value::Null },
            ))
            .await
            .unwrap();
        stores.alerts.create_rule(dlq_rule(1, 1)).await.unwrap();
        insert_dlq_events(&stores, "ws-1", 1).await;
        assert_eq!(evaluator(&stores).evaluate_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lifecycle_enforces_membership() {
        let stores = memory_stores();
        let rule = dlq_rule(1, 1);
        stores.alerts.create_rule(rule.clone()).await.unwrap();
        insert_dlq_events(&stores, "ws-1", 1).await;
        let evaluator = evaluator(&stores);
        evaluator.evaluate_all().await.unwrap();

        let alert_id = stores
            .alerts
            .list_history(&TenantId::new("ws-1"), 1)
            .await
            .unwrap()[0]
            .id
            .clone();

        let outsider = Caller::new("u-2", vec![TenantId::new("ws-9")]);
        assert!(matches!(
            evaluator.acknowledge(&outsider, &alert_id).await,
            Err(HubError::Auth(_))
        ));

        let member = Caller::new("u-1", vec![TenantId::new("ws-1")]);
        let acked = evaluator.acknowledge(&member, &alert_id).await.unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by, Some(UserId::new("u-1")));

        let resolved = evaluator.resolve(&member, &alert_id).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
    }
}
