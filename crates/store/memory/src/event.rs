use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metahub_core::{DeliveryAttempt, DeliveryEvent, EventId, EventStatus, TenantId};
use metahub_store::event::{AttemptOutcome, EventWindowStats, TransitionUpdate};
use metahub_store::{EventStore, StoreError};

/// In-memory [`EventStore`] backed by `RwLock`ed maps.
///
/// Locks are never held across await points; the async trait methods do all
/// their work synchronously under the lock.
#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<HashMap<EventId, DeliveryEvent>>,
    attempts: RwLock<HashMap<EventId, Vec<DeliveryAttempt>>>,
}

impl MemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn create(&self, event: DeliveryEvent) -> Result<(), StoreError> {
        self.events
            .write()
            .expect("event map poisoned")
            .insert(event.id.clone(), event);
        Ok(())
    }

    async fn get(&self, id: &EventId) -> Result<Option<DeliveryEvent>, StoreError> {
        Ok(self.events.read().expect("event map poisoned").get(id).cloned())
    }

    async fn transition(
        &self,
        id: &EventId,
        from: EventStatus,
        to: EventStatus,
        update: TransitionUpdate,
    ) -> Result<DeliveryEvent, StoreError> {
        if !from.can_transition(to) {
            return Err(StoreError::InvalidTransition(format!("{from} -> {to}")));
        }
        let mut events = self.events.write().expect("event map poisoned");
        let event = events
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("event {id}")))?;
        if event.status != from {
            return Err(StoreError::Conflict {
                expected: from.to_string(),
                found: event.status.to_string(),
            });
        }

        event.status = to;
        // Terminal states never carry a retry schedule.
        event.next_retry_at = if to.is_terminal() { None } else { update.next_retry_at };
        event.error_message = update.error_message;
        if let Some(at) = update.delivered_at {
            event.delivered_at = Some(at);
        }
        if let Some(at) = update.failed_at {
            event.failed_at = Some(at);
        }
        event.attempts_count = event.attempts_count.saturating_add_signed(update.attempts_delta);
        if update.bump_max_attempts {
            event.max_attempts += 1;
        }
        Ok(event.clone())
    }

    async fn append_attempt(&self, attempt: DeliveryAttempt) -> Result<(), StoreError> {
        let events = self.events.read().expect("event map poisoned");
        let event = events
            .get(&attempt.event_id)
            .ok_or_else(|| StoreError::NotFound(format!("event {}", attempt.event_id)))?;
        let mut attempts = self.attempts.write().expect("attempt map poisoned");
        let rows = attempts.entry(attempt.event_id.clone()).or_default();
        let expected = u32::try_from(rows.len()).unwrap_or(u32::MAX) + 1;
        if attempt.attempt_number != expected {
            return Err(StoreError::InvalidAppend(format!(
                "attempt number {} but expected {expected}",
                attempt.attempt_number
            )));
        }
        if attempt.attempt_number > event.max_attempts {
            return Err(StoreError::InvalidAppend(format!(
                "attempt number {} exceeds budget {}",
                attempt.attempt_number, event.max_attempts
            )));
        }
        rows.push(attempt);
        Ok(())
    }

    async fn attempts(&self, id: &EventId) -> Result<Vec<DeliveryAttempt>, StoreError> {
        Ok(self
            .attempts
            .read()
            .expect("attempt map poisoned")
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn query_ready(
        &self,
        statuses: &[EventStatus],
        ready_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeliveryEvent>, StoreError> {
        let events = self.events.read().expect("event map poisoned");
        let mut ready: Vec<DeliveryEvent> = events
            .values()
            .filter(|e| {
                statuses.contains(&e.status)
                    && e.next_retry_at.is_none_or(|at| at <= ready_before)
            })
            .cloned()
            .collect();
        ready.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        ready.truncate(limit);
        Ok(ready)
    }

    async fn list_by_tenant(
        &self,
        tenant: &TenantId,
        status: Option<EventStatus>,
        limit: usize,
    ) -> Result<Vec<DeliveryEvent>, StoreError> {
        let events = self.events.read().expect("event map poisoned");
        let mut rows: Vec<DeliveryEvent> = events
            .values()
            .filter(|e| e.tenant == *tenant && status.is_none_or(|s| e.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn stats_since(
        &self,
        tenant: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<EventWindowStats, StoreError> {
        let events = self.events.read().expect("event map poisoned");
        let mut stats = EventWindowStats::default();
        let mut latency_total_ms = 0.0_f64;
        let mut latency_count = 0u64;

        for event in events
            .values()
            .filter(|e| e.tenant == *tenant && e.created_at >= since)
        {
            stats.total += 1;
            match event.status {
                EventStatus::Delivered => {
                    stats.delivered += 1;
                    if let Some(delivered_at) = event.delivered_at {
                        latency_total_ms +=
                            (delivered_at - event.created_at).num_milliseconds() as f64;
                        latency_count += 1;
                    }
                }
                EventStatus::Failed => stats.failed += 1,
                EventStatus::Dlq => stats.dlq += 1,
                EventStatus::Pending | EventStatus::Processing => stats.in_flight += 1,
                EventStatus::Cancelled => stats.cancelled += 1,
            }
        }
        if latency_count > 0 {
            stats.avg_latency_ms = Some(latency_total_ms / latency_count as f64);
        }
        Ok(stats)
    }

    async fn count_dlq(&self, tenant: &TenantId) -> Result<u64, StoreError> {
        let events = self.events.read().expect("event map poisoned");
        Ok(events
            .values()
            .filter(|e| e.tenant == *tenant && e.status == EventStatus::Dlq)
            .count() as u64)
    }

    async fn count_created_since(
        &self,
        tenant: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let events = self.events.read().expect("event map poisoned");
        Ok(events
            .values()
            .filter(|e| e.tenant == *tenant && e.created_at >= since)
            .count() as u64)
    }

    async fn recent_attempt_outcomes(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<AttemptOutcome>, StoreError> {
        let events = self.events.read().expect("event map poisoned");
        let attempts = self.attempts.read().expect("attempt map poisoned");
        let mut outcomes: Vec<AttemptOutcome> = attempts
            .iter()
            .filter_map(|(event_id, rows)| {
                events
                    .get(event_id)
                    .filter(|e| e.tenant == *tenant)
                    .map(|e| (e, rows))
            })
            .flat_map(|(event, rows)| {
                rows.iter().map(|a| AttemptOutcome {
                    destination_id: event.destination_id.clone(),
                    success: a.is_success(),
                    attempted_at: a.attempted_at,
                })
            })
            .collect();
        outcomes.sort_by(|a, b| b.attempted_at.cmp(&a.attempted_at));
        outcomes.truncate(limit);
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use metahub_core::{DestinationId, RouteId, SourceType};

    use super::*;

    fn event() -> DeliveryEvent {
        DeliveryEvent::new(
            "ws-1",
            RouteId::generate(),
            DestinationId::generate(),
            SourceType::Whatsapp,
            serde_json::json!({"k": "v"}),
        )
    }

    fn attempt(event: &DeliveryEvent, number: u32, status: Option<u16>) -> DeliveryAttempt {
        DeliveryAttempt {
            event_id: event.id.clone(),
            attempt_number: number,
            request_url: "https://example.com".into(),
            request_method: "POST".into(),
            status_code: status,
            response_body: None,
            error_message: None,
            duration_ms: 1,
            attempted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn transition_enforces_expected_status() {
        let store = MemoryEventStore::new();
        let e = event();
        store.create(e.clone()).await.unwrap();

        let claimed = store
            .transition(
                &e.id,
                EventStatus::Pending,
                EventStatus::Processing,
                TransitionUpdate {
                    attempts_delta: 1,
                    ..TransitionUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(claimed.status, EventStatus::Processing);
        assert_eq!(claimed.attempts_count, 1);

        // A second claim from pending loses the race.
        let err = store
            .transition(
                &e.id,
                EventStatus::Pending,
                EventStatus::Processing,
                TransitionUpdate::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn transition_rejects_non_edges() {
        let store = MemoryEventStore::new();
        let e = event();
        store.create(e.clone()).await.unwrap();
        let err = store
            .transition(
                &e.id,
                EventStatus::Pending,
                EventStatus::Delivered,
                TransitionUpdate::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn terminal_transition_clears_retry_schedule() {
        let store = MemoryEventStore::new();
        let e = event();
        store.create(e.clone()).await.unwrap();
        store
            .transition(
                &e.id,
                EventStatus::Pending,
                EventStatus::Processing,
                TransitionUpdate {
                    attempts_delta: 1,
                    next_retry_at: Some(Utc::now()),
                    ..TransitionUpdate::default()
                },
            )
            .await
            .unwrap();
        let delivered = store
            .transition(
                &e.id,
                EventStatus::Processing,
                EventStatus::Delivered,
                TransitionUpdate {
                    delivered_at: Some(Utc::now()),
                    // Deliberately tries to keep a schedule; the store
                    // clears it on terminal states.
                    next_retry_at: Some(Utc::now()),
                    ..TransitionUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(delivered.next_retry_at.is_none());
        assert!(delivered.delivered_at.is_some());
    }

    #[tokio::test]
    async fn cancel_edge_hands_back_an_unused_claim() {
        let store = MemoryEventStore::new();
        let e = event();
        store.create(e.clone()).await.unwrap();
        store
            .transition(
                &e.id,
                EventStatus::Pending,
                EventStatus::Processing,
                TransitionUpdate {
                    attempts_delta: 1,
                    ..TransitionUpdate::default()
                },
            )
            .await
            .unwrap();

        // The claim produced no attempt row, so cancelling returns it.
        let cancelled = store
            .transition(
                &e.id,
                EventStatus::Processing,
                EventStatus::Cancelled,
                TransitionUpdate {
                    attempts_delta: -1,
                    error_message: Some("Destination inactive".into()),
                    ..TransitionUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cancelled.attempts_count, 0);
        assert!(store.attempts(&e.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn attempts_are_dense_and_bounded() {
        let store = MemoryEventStore::new();
        let e = event();
        store.create(e.clone()).await.unwrap();

        store.append_attempt(attempt(&e, 1, Some(500))).await.unwrap();
        // Gap in numbering.
        let err = store.append_attempt(attempt(&e, 3, Some(500))).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidAppend(_)));

        for n in 2..=5 {
            store.append_attempt(attempt(&e, n, Some(500))).await.unwrap();
        }
        // Budget exhausted (default max_attempts is 5).
        let err = store.append_attempt(attempt(&e, 6, Some(500))).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidAppend(_)));
    }

    #[tokio::test]
    async fn query_ready_orders_oldest_first() {
        let store = MemoryEventStore::new();
        let mut first = event();
        first.created_at = Utc::now() - chrono::Duration::minutes(10);
        first.next_retry_at = Some(first.created_at);
        let second = event();
        store.create(second.clone()).await.unwrap();
        store.create(first.clone()).await.unwrap();

        let ready = store
            .query_ready(&[EventStatus::Pending], Utc::now(), 50)
            .await
            .unwrap();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].id, first.id);

        // A future retry time is not ready yet.
        let mut scheduled = event();
        scheduled.next_retry_at = Some(Utc::now() + chrono::Duration::minutes(5));
        store.create(scheduled).await.unwrap();
        let ready = store
            .query_ready(&[EventStatus::Pending], Utc::now(), 50)
            .await
            .unwrap();
        assert_eq!(ready.len(), 2);
    }

    #[tokio::test]
    async fn stats_and_counters() {
        let store = MemoryEventStore::new();
        let mut delivered = event();
        delivered.status = EventStatus::Delivered;
        delivered.delivered_at = Some(delivered.created_at + chrono::Duration::milliseconds(250));
        let mut dead = event();
        dead.status = EventStatus::Dlq;
        store.create(delivered).await.unwrap();
        store.create(dead).await.unwrap();
        store.create(event()).await.unwrap();

        let tenant = TenantId::new("ws-1");
        let stats = store.stats_window(&tenant, 24).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dlq, 1);
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.avg_latency_ms, Some(250.0));

        assert_eq!(store.count_dlq(&tenant).await.unwrap(), 1);
        let since = Utc::now() - chrono::Duration::minutes(1);
        assert_eq!(store.count_created_since(&tenant, since).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn recent_outcomes_newest_first() {
        let store = MemoryEventStore::new();
        let e = event();
        store.create(e.clone()).await.unwrap();
        let mut first = attempt(&e, 1, Some(500));
        first.attempted_at = Utc::now() - chrono::Duration::seconds(10);
        store.append_attempt(first).await.unwrap();
        store.append_attempt(attempt(&e, 2, Some(200))).await.unwrap();

        let outcomes = store
            .recent_attempt_outcomes(&TenantId::new("ws-1"), 10)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
    }
}
