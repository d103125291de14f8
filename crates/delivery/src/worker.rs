//! The delivery worker: claims ready events, drives attempts and applies
//! the backoff / DLQ rules.

use chrono::Utc;
use metahub_core::{
    DeliveryAttempt, DeliveryEvent, Destination, DestinationId, EventId, EventStatus, LogCategory,
    LogEntry, LogLevel,
};
use metahub_store::event::TransitionUpdate;
use metahub_store::{DestinationStore, EventStore, LogStore, StoreError, Stores};
use tracing::{debug, info, instrument, warn};

use crate::backoff::backoff_ms;
use crate::client::{AttemptResult, DestinationClient};
use crate::error::DeliveryError;

/// Events claimed per `process` cycle.
pub const CLAIM_BATCH_SIZE: usize = 50;

/// Counters returned by one `process` cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Events claimed and attempted.
    pub processed: u64,
    /// Of those, delivered.
    pub delivered: u64,
    /// Of those, failed (scheduled for retry or dead-lettered).
    pub failed: u64,
}

/// Outcome of a user-initiated resend.
#[derive(Debug, Clone)]
pub struct ResendOutcome {
    /// Whether the inline attempt delivered the event.
    pub success: bool,
    /// Error of the inline attempt, when it failed.
    pub error: Option<String>,
}

/// Drives delivery events through the destination client.
pub struct DeliveryWorker {
    stores: Stores,
    client: DestinationClient,
}

impl DeliveryWorker {
    /// Create a worker over the given stores with a fresh HTTP client.
    #[must_use]
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            client: DestinationClient::new(),
        }
    }

    /// Create a worker with an explicit destination client.
    #[must_use]
    pub fn with_client(stores: Stores, client: DestinationClient) -> Self {
        Self { stores, client }
    }

    /// One scheduled cycle: claim up to [`CLAIM_BATCH_SIZE`] ready events
    /// and attempt each. Claim conflicts are skipped silently; per-event
    /// errors are logged and do not abort the batch.
    #[instrument(skip(self))]
    pub async fn process(&self) -> Result<ProcessSummary, DeliveryError> {
        let now = Utc::now();
        let ready = self
            .stores
            .events
            .query_ready(&[EventStatus::Pending, EventStatus::Failed], now, CLAIM_BATCH_SIZE)
            .await?;

        let mut summary = ProcessSummary::default();
        for event in ready {
            match self.claim_and_deliver(&event).await {
                Ok(Some(delivered)) => {
                    summary.processed += 1;
                    if delivered {
                        summary.delivered += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                // Another worker claimed it first.
                Ok(None) => {}
                Err(e) => {
                    summary.processed += 1;
                    summary.failed += 1;
                    warn!(event_id = %event.id, error = %e, "delivery cycle error");
                }
            }
        }
        debug!(?summary, "process cycle finished");
        Ok(summary)
    }

    /// Claim one event and drive a single attempt. Returns `None` on a
    /// claim conflict, otherwise whether the attempt delivered.
    async fn claim_and_deliver(&self, event: &DeliveryEvent) -> Result<Option<bool>, DeliveryError> {
        let claimed = match self
            .stores
            .events
            .transition(
                &event.id,
                event.status,
                EventStatus::Processing,
                TransitionUpdate {
                    attempts_delta: 1,
                    error_message: event.error_message.clone(),
                    ..TransitionUpdate::default()
                },
            )
            .await
        {
            Ok(claimed) => claimed,
            Err(StoreError::Conflict { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let delivered = self.deliver_claimed(&claimed).await?;
        Ok(Some(delivered))
    }

    /// Deliver an event that is already in `processing` with its attempt
    /// number reserved. Applies the success / retry / DLQ transition.
    async fn deliver_claimed(&self, event: &DeliveryEvent) -> Result<bool, DeliveryError> {
        let destination = self.stores.destinations.get(&event.destination_id).await?;
        let Some(destination) = destination.filter(Destination::is_usable) else {
            // No call was made, so the claim's attempt number goes back:
            // a cancelled event keeps attempts_count equal to its rows.
            self.stores
                .events
                .transition(
                    &event.id,
                    EventStatus::Processing,
                    EventStatus::Cancelled,
                    TransitionUpdate {
                        attempts_delta: -1,
                        error_message: Some("Destination inactive".to_owned()),
                        ..TransitionUpdate::default()
                    },
                )
                .await?;
            self.log(event, LogLevel::Warn, "delivery.cancelled", "Destination inactive", None)
                .await;
            return Ok(false);
        };

        let result = self
            .client
            .call(
                &destination,
                event.id.as_str(),
                event.attempts_count,
                event.delivery_payload(),
            )
            .await;

        self.stores
            .events
            .append_attempt(attempt_row(event, &destination, &result))
            .await?;

        let now = Utc::now();
        if result.is_success() {
            self.stores
                .events
                .transition(
                    &event.id,
                    EventStatus::Processing,
                    EventStatus::Delivered,
                    TransitionUpdate {
                        delivered_at: Some(now),
                        ..TransitionUpdate::default()
                    },
                )
                .await?;
            info!(event_id = %event.id, attempts = event.attempts_count, "event delivered");
            self.log(event, LogLevel::Info, "delivery.succeeded", "Event delivered", result.status_code)
                .await;
            return Ok(true);
        }

        let error = attempt_error(&result);
        if event.attempts_count >= event.max_attempts {
            self.stores
                .events
                .transition(
                    &event.id,
                    EventStatus::Processing,
                    EventStatus::Dlq,
                    TransitionUpdate {
                        error_message: Some(error.clone()),
                        failed_at: Some(now),
                        ..TransitionUpdate::default()
                    },
                )
                .await?;
            warn!(event_id = %event.id, attempts = event.attempts_count, "event dead-lettered");
            self.log(event, LogLevel::Error, "delivery.dlq", &error, result.status_code)
                .await;
        } else {
            let delay_ms = backoff_ms(event.attempts_count);
            self.stores
                .events
                .transition(
                    &event.id,
                    EventStatus::Processing,
                    EventStatus::Failed,
                    TransitionUpdate {
                        error_message: Some(error.clone()),
                        failed_at: Some(now),
                        next_retry_at: Some(
                            now + chrono::Duration::milliseconds(
                                i64::try_from(delay_ms).unwrap_or(i64::MAX),
                            ),
                        ),
                        ..TransitionUpdate::default()
                    },
                )
                .await?;
            debug!(event_id = %event.id, delay_ms, "retry scheduled");
            self.log(event, LogLevel::Warn, "delivery.failed", &error, result.status_code)
                .await;
        }
        Ok(false)
    }

    /// Deliver a just-created `pending` event once, immediately. Used by
    /// the webhook receiver for the inline first attempt; a conflict means
    /// a scheduled worker got there first, which is fine.
    pub async fn deliver_now(&self, event_id: &EventId) -> Result<(), DeliveryError> {
        let Some(event) = self.stores.events.get(event_id).await? else {
            return Err(DeliveryError::NotFound(format!("event {event_id}")));
        };
        match self.claim_and_deliver(&event).await {
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// User-initiated resend, allowed only from `failed` or `dlq`.
    ///
    /// Grants one extra delivery cycle by raising `max_attempts` by one,
    /// resets the event to `pending` and drives one inline attempt.
    #[instrument(skip(self))]
    pub async fn resend(&self, event_id: &EventId) -> Result<ResendOutcome, DeliveryError> {
        let Some(event) = self.stores.events.get(event_id).await? else {
            return Err(DeliveryError::NotFound(format!("event {event_id}")));
        };
        if !matches!(event.status, EventStatus::Failed | EventStatus::Dlq) {
            return Err(DeliveryError::InvalidState(format!(
                "resend requires failed or dlq, event is {}",
                event.status
            )));
        }

        let pending = self
            .stores
            .events
            .transition(
                event_id,
                event.status,
                EventStatus::Pending,
                TransitionUpdate {
                    next_retry_at: Some(Utc::now()),
                    bump_max_attempts: true,
                    ..TransitionUpdate::default()
                },
            )
            .await?;
        self.log(&pending, LogLevel::Info, "delivery.resend", "Manual resend requested", None)
            .await;

        match self.claim_and_deliver(&pending).await? {
            Some(true) => Ok(ResendOutcome { success: true, error: None }),
            Some(false) | None => {
                let error = self
                    .stores
                    .events
                    .get(event_id)
                    .await?
                    .and_then(|e| e.error_message);
                Ok(ResendOutcome { success: false, error })
            }
        }
    }

    /// Dry-run a destination with a canned sample payload. Touches nothing
    /// in the event store.
    #[instrument(skip(self))]
    pub async fn test(&self, destination_id: &DestinationId) -> Result<AttemptResult, DeliveryError> {
        let destination = self
            .stores
            .destinations
            .get(destination_id)
            .await?
            .filter(|d| d.deleted_at.is_none())
            .ok_or_else(|| DeliveryError::NotFound(format!("destination {destination_id}")))?;
        Ok(self
            .client
            .call(&destination, "test", 1, &sample_payload())
            .await)
    }

    async fn log(
        &self,
        event: &DeliveryEvent,
        level: LogLevel,
        action: &str,
        message: &str,
        status_code: Option<u16>,
    ) {
        let mut entry = LogEntry::new(event.tenant.clone(), level, LogCategory::Delivery, action, message)
            .with_resource(event.id.to_string());
        if let Some(code) = status_code {
            entry = entry.with_metadata(serde_json::json!({ "status_code": code }));
        }
        // The log sink is best-effort; a failed write never affects the
        // delivery outcome.
        if let Err(e) = self.stores.logs.append(entry).await {
            warn!(error = %e, "log sink write failed");
        }
    }
}

/// Build the attempt row for a finished call.
fn attempt_row(
    event: &DeliveryEvent,
    destination: &Destination,
    result: &AttemptResult,
) -> DeliveryAttempt {
    DeliveryAttempt {
        event_id: event.id.clone(),
        attempt_number: event.attempts_count,
        request_url: destination.url.clone(),
        request_method: destination.method.as_str().to_owned(),
        status_code: result.status_code,
        response_body: result.response_body.clone(),
        error_message: result.error_message.clone(),
        duration_ms: result.duration_ms,
        attempted_at: Utc::now(),
    }
}

/// Error recorded on a failed attempt.
fn attempt_error(result: &AttemptResult) -> String {
    match (&result.error_message, result.status_code) {
        (Some(message), _) => message.clone(),
        (None, Some(status)) => format!("HTTP {status}"),
        (None, None) => "Request failed".to_owned(),
    }
}

/// Canned WhatsApp-style sample payload sent by `test`.
#[must_use]
pub fn sample_payload() -> serde_json::Value {
    serde_json::json!({
        "test": true,
        "source": "metahub",
        "message": {
            "from": "15550000001",
            "type": "text",
            "text": { "body": "MetaHub delivery test" }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use metahub_core::{RouteId, SourceType};
    use metahub_store_memory::memory_stores;

    use super::*;
    use crate::testing::MockEndpoint;

    async fn seed(stores: &Stores, url: &str) -> (Destination, DeliveryEvent) {
        let destination = Destination::new("ws-1", "hook", url).with_timeout_ms(5_000);
        stores.destinations.create(destination.clone()).await.unwrap();
        let event = DeliveryEvent::new(
            "ws-1",
            RouteId::generate(),
            destination.id.clone(),
            SourceType::Whatsapp,
            serde_json::json!({"hello": "world"}),
        );
        stores.events.create(event.clone()).await.unwrap();
        (destination, event)
    }

    /// Make a failed or pending event immediately claimable again.
    async fn make_ready(stores: &Stores, event_id: &EventId) {
        let event = stores.events.get(event_id).await.unwrap().unwrap();
        stores
            .events
            .transition(
                event_id,
                event.status,
                EventStatus::Pending,
                TransitionUpdate {
                    next_retry_at: Some(Utc::now() - chrono::Duration::seconds(1)),
                    error_message: event.error_message,
                    ..TransitionUpdate::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn happy_path_delivers_on_first_attempt() {
        let stores = memory_stores();
        let endpoint = MockEndpoint::start().await;
        let (_, event) = seed(&stores, &endpoint.url).await;
        let server = tokio::spawn(async move { endpoint.respond_once(202, "accepted").await });

        let worker = DeliveryWorker::new(stores.clone());
        let summary = worker.process().await.unwrap();
        server.await.unwrap();

        assert_eq!(summary, ProcessSummary { processed: 1, delivered: 1, failed: 0 });

        let event = stores.events.get(&event.id).await.unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Delivered);
        assert_eq!(event.attempts_count, 1);
        assert!(event.delivered_at.is_some());
        assert!(event.next_retry_at.is_none());
        assert!(event.error_message.is_none());

        let attempts = stores.events.attempts(&event.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].attempt_number, 1);
        assert_eq!(attempts[0].status_code, Some(202));
    }

    #[tokio::test]
    async fn retry_then_success() {
        let stores = memory_stores();
        let endpoint = MockEndpoint::start().await;
        let (_, event) = seed(&stores, &endpoint.url).await;
        let server = tokio::spawn(async move {
            endpoint
                .respond_sequence(vec![
                    (500, "err".to_owned()),
                    (500, "err".to_owned()),
                    (200, "ok".to_owned()),
                ])
                .await;
        });

        let worker = DeliveryWorker::new(stores.clone());

        worker.process().await.unwrap();
        let after_first = stores.events.get(&event.id).await.unwrap().unwrap();
        assert_eq!(after_first.status, EventStatus::Failed);
        assert_eq!(after_first.error_message.as_deref(), Some("HTTP 500"));
        // First backoff is one minute.
        let gap = after_first.next_retry_at.unwrap() - after_first.failed_at.unwrap();
        assert_eq!(gap.num_seconds(), 60);

        make_ready(&stores, &event.id).await;
        worker.process().await.unwrap();
        make_ready(&stores, &event.id).await;
        let summary = worker.process().await.unwrap();
        server.await.unwrap();

        assert_eq!(summary.delivered, 1);
        let event = stores.events.get(&event.id).await.unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Delivered);
        assert_eq!(event.attempts_count, 3);

        let attempts = stores.events.attempts(&event.id).await.unwrap();
        let codes: Vec<_> = attempts.iter().map(|a| a.status_code).collect();
        assert_eq!(codes, vec![Some(500), Some(500), Some(200)]);
        assert!(attempts.iter().all(|a| a.attempt_number >= 1));
    }

    #[tokio::test]
    async fn exhausted_attempts_dead_letter() {
        let stores = memory_stores();
        let endpoint = MockEndpoint::start().await;
        let (_, event) = seed(&stores, &endpoint.url).await;
        let server = tokio::spawn(async move {
            endpoint
                .respond_sequence((0..5).map(|_| (500, "err".to_owned())).collect())
                .await;
        });

        let worker = DeliveryWorker::new(stores.clone());
        for _ in 0..5 {
            worker.process().await.unwrap();
            let current = stores.events.get(&event.id).await.unwrap().unwrap();
            if current.status == EventStatus::Failed {
                make_ready(&stores, &event.id).await;
            }
        }
        server.await.unwrap();

        let event = stores.events.get(&event.id).await.unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Dlq);
        assert_eq!(event.attempts_count, 5);
        assert!(event.next_retry_at.is_none());
        assert_eq!(stores.events.attempts(&event.id).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn resend_from_dlq_grants_one_extra_attempt() {
        let stores = memory_stores();
        let endpoint = MockEndpoint::start().await;
        let (_, event) = seed(&stores, &endpoint.url).await;
        let server = tokio::spawn(async move {
            endpoint
                .respond_sequence((0..6).map(|_| (500, "err".to_owned())).collect())
                .await;
        });

        let worker = DeliveryWorker::new(stores.clone());
        for _ in 0..5 {
            worker.process().await.unwrap();
            let current = stores.events.get(&event.id).await.unwrap().unwrap();
            if current.status == EventStatus::Failed {
                make_ready(&stores, &event.id).await;
            }
        }
        assert_eq!(
            stores.events.get(&event.id).await.unwrap().unwrap().status,
            EventStatus::Dlq
        );

        let outcome = worker.resend(&event.id).await.unwrap();
        server.await.unwrap();
        assert!(!outcome.success);

        let event = stores.events.get(&event.id).await.unwrap().unwrap();
        // The extra cycle was consumed and the event is dead again.
        assert_eq!(event.status, EventStatus::Dlq);
        assert_eq!(event.attempts_count, 6);
        assert_eq!(event.max_attempts, 6);
        assert!(event.next_retry_at.is_none());
    }

    #[tokio::test]
    async fn resend_requires_failed_or_dlq() {
        let stores = memory_stores();
        let endpoint = MockEndpoint::start().await;
        let (_, event) = seed(&stores, &endpoint.url).await;
        drop(endpoint);

        let worker = DeliveryWorker::new(stores.clone());
        let err = worker.resend(&event.id).await.unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidState(_)));
    }

    #[tokio::test]
    async fn inactive_destination_cancels_event() {
        let stores = memory_stores();
        let endpoint = MockEndpoint::start().await;
        let (destination, event) = seed(&stores, &endpoint.url).await;
        drop(endpoint);
        stores.destinations.soft_delete(&destination.id).await.unwrap();

        let worker = DeliveryWorker::new(stores.clone());
        worker.process().await.unwrap();

        let event = stores.events.get(&event.id).await.unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Cancelled);
        assert_eq!(event.error_message.as_deref(), Some("Destination inactive"));
        // The returned claim keeps the count equal to the attempt rows.
        assert_eq!(event.attempts_count, 0);
        assert!(stores.events.attempts(&event.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduled_retry_is_not_claimed_early() {
        let stores = memory_stores();
        let endpoint = MockEndpoint::start().await;
        let (_, event) = seed(&stores, &endpoint.url).await;
        let server = tokio::spawn(async move { endpoint.respond_once(503, "down").await });

        let worker = DeliveryWorker::new(stores.clone());
        worker.process().await.unwrap();
        server.await.unwrap();

        // next_retry_at is a minute out; an immediate second cycle must
        // not touch the event.
        let summary = worker.process().await.unwrap();
        assert_eq!(summary.processed, 0);
        let event = stores.events.get(&event.id).await.unwrap().unwrap();
        assert_eq!(event.attempts_count, 1);
    }

    #[tokio::test]
    async fn test_endpoint_does_not_persist() {
        let stores = memory_stores();
        let endpoint = MockEndpoint::start().await;
        let destination = Destination::new("ws-1", "hook", &endpoint.url).with_timeout_ms(5_000);
        stores.destinations.create(destination.clone()).await.unwrap();
        let server = tokio::spawn(async move { endpoint.respond_once(204, "").await });

        let worker = DeliveryWorker::new(stores.clone());
        let result = worker.test(&destination.id).await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(result.status_code, Some(204));
        assert!(result.is_success());
        // The canned payload announces itself.
        assert!(String::from_utf8_lossy(&request).contains("MetaHub delivery test"));

        let events = stores
            .events
            .list_by_tenant(&metahub_core::TenantId::new("ws-1"), None, 10)
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn delivery_writes_log_rows() {
        let stores = memory_stores();
        let endpoint = MockEndpoint::start().await;
        seed(&stores, &endpoint.url).await;
        let server = tokio::spawn(async move { endpoint.respond_once(200, "ok").await });

        DeliveryWorker::new(stores.clone()).process().await.unwrap();
        server.await.unwrap();

        let logs = stores
            .logs
            .query(&metahub_store::LogQuery {
                tenant: Some(metahub_core::TenantId::new("ws-1")),
                category: Some(LogCategory::Delivery),
                ..metahub_store::LogQuery::default()
            })
            .await
            .unwrap();
        assert!(logs.iter().any(|l| l.action == "delivery.succeeded"));
    }

    #[test]
    fn attempt_error_prefers_message() {
        let result = AttemptResult {
            status_code: Some(500),
            response_body: None,
            error_message: Some("Timeout after 10ms".into()),
            duration_ms: 10,
        };
        assert_eq!(attempt_error(&result), "Timeout after 10ms");
        let result = AttemptResult {
            status_code: Some(500),
            response_body: None,
            error_message: None,
            duration_ms: 10,
        };
        assert_eq!(attempt_error(&result), "HTTP 500");
    }

    #[allow(dead_code)]
    fn assert_worker_is_send_sync(worker: DeliveryWorker) -> Arc<DeliveryWorker> {
        Arc::new(worker)
    }
}
