use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metahub_core::{DeliveryAttempt, DeliveryEvent, DestinationId, EventId, EventStatus, TenantId};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Field updates applied together with a status transition.
///
/// `next_retry_at` and `error_message` are always overwritten (a `None`
/// clears them); the timestamps are only set when present. This mirrors how
/// the worker uses transitions: every edge either schedules or clears the
/// retry axis.
#[derive(Debug, Clone, Default)]
pub struct TransitionUpdate {
    /// New value of `next_retry_at`. `None` clears it.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// New value of `error_message`. `None` clears it.
    pub error_message: Option<String>,
    /// Set `delivered_at` when present.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Set `failed_at` when present.
    pub failed_at: Option<DateTime<Utc>>,
    /// Signed adjustment to `attempts_count`, saturating at zero. Claim
    /// edges pass `1`; the destination-inactive cancel edge passes `-1` to
    /// hand back a claim that never produced an attempt, keeping
    /// `attempts_count` equal to the number of attempt rows.
    pub attempts_delta: i32,
    /// Increment `max_attempts` by one (resend edges).
    pub bump_max_attempts: bool,
}

/// Aggregate event statistics over a trailing window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventWindowStats {
    /// Events created inside the window.
    pub total: u64,
    /// Of those, how many are currently delivered.
    pub delivered: u64,
    /// Currently failed (awaiting retry).
    pub failed: u64,
    /// Currently dead-lettered.
    pub dlq: u64,
    /// Currently pending or processing.
    pub in_flight: u64,
    /// Currently cancelled.
    pub cancelled: u64,
    /// Average `delivered_at - created_at` over delivered events in the
    /// window, in milliseconds.
    pub avg_latency_ms: Option<f64>,
}

/// One finished attempt projected with its destination, newest first.
/// Used by the consecutive-failure alert condition.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    /// Destination the attempt targeted.
    pub destination_id: DestinationId,
    /// Whether the attempt got an HTTP 2xx.
    pub success: bool,
    /// When the attempt was made.
    pub attempted_at: DateTime<Utc>,
}

/// Durable record of delivery events and their attempts.
///
/// All state changes go through [`transition`](EventStore::transition),
/// whose conditional update on the expected `from` status is the only
/// concurrency-control primitive the pipeline needs.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a freshly created event.
    async fn create(&self, event: DeliveryEvent) -> Result<(), StoreError>;

    /// Fetch an event by id.
    async fn get(&self, id: &EventId) -> Result<Option<DeliveryEvent>, StoreError>;

    /// Conditionally move an event from `from` to `update`'s target status.
    ///
    /// Fails with [`StoreError::Conflict`] when the row is no longer in
    /// `from`, and with [`StoreError::InvalidTransition`] when the edge is
    /// not part of the state machine. Returns the updated event.
    async fn transition(
        &self,
        id: &EventId,
        from: EventStatus,
        to: EventStatus,
        update: TransitionUpdate,
    ) -> Result<DeliveryEvent, StoreError>;

    /// Append an attempt row. Numbers must be dense starting at 1 and never
    /// exceed the event's `max_attempts`.
    async fn append_attempt(&self, attempt: DeliveryAttempt) -> Result<(), StoreError>;

    /// Attempts of an event, ordered by `attempt_number`.
    async fn attempts(&self, id: &EventId) -> Result<Vec<DeliveryAttempt>, StoreError>;

    /// Oldest events in any of `statuses` whose `next_retry_at` is null or
    /// at/before `ready_before`, up to `limit`.
    async fn query_ready(
        &self,
        statuses: &[EventStatus],
        ready_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeliveryEvent>, StoreError>;

    /// Recent events of a tenant, newest first.
    async fn list_by_tenant(
        &self,
        tenant: &TenantId,
        status: Option<EventStatus>,
        limit: usize,
    ) -> Result<Vec<DeliveryEvent>, StoreError>;

    /// Aggregate statistics over events created at or after `since`.
    async fn stats_since(
        &self,
        tenant: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<EventWindowStats, StoreError>;

    /// Aggregate statistics over events created in the last `hours` hours.
    async fn stats_window(
        &self,
        tenant: &TenantId,
        hours: u32,
    ) -> Result<EventWindowStats, StoreError> {
        let since = Utc::now() - chrono::Duration::hours(i64::from(hours));
        self.stats_since(tenant, since).await
    }

    /// Number of events currently in the DLQ for a tenant.
    async fn count_dlq(&self, tenant: &TenantId) -> Result<u64, StoreError>;

    /// Number of events created at or after `since` for a tenant.
    async fn count_created_since(
        &self,
        tenant: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// The most recent finished attempts of a tenant joined with their
    /// destination, newest first, up to `limit`.
    async fn recent_attempt_outcomes(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<AttemptOutcome>, StoreError>;
}
