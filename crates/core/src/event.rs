use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DestinationId, EventId, RouteId, SourceType, TenantId};

/// Default number of delivery attempts before an event is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Lifecycle state of a delivery event.
///
/// ```text
/// pending -> processing -> delivered
///                       -> failed -> (retry) processing
///                       -> dlq
/// failed|dlq -> (resend) pending
/// pending|processing|failed -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
    Dlq,
    Cancelled,
}

impl EventStatus {
    /// Returns the status as a snake_case string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Dlq => "dlq",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states never carry a `next_retry_at`. `dlq` is terminal
    /// until a manual resend.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Dlq | Self::Cancelled)
    }

    /// Whether a transition from `self` to `to` is part of the state
    /// machine. Store implementations refuse everything else.
    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Processing | Self::Cancelled)
                | (
                    Self::Processing,
                    Self::Delivered | Self::Failed | Self::Dlq | Self::Cancelled,
                )
                | (Self::Failed, Self::Processing | Self::Pending | Self::Cancelled)
                | (Self::Dlq, Self::Pending)
        )
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of forwardable payload and its delivery lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DeliveryEvent {
    /// Unique event identifier.
    pub id: EventId,

    /// Tenant that owns this event.
    pub tenant: TenantId,

    /// Route that matched the inbound payload.
    pub route_id: RouteId,

    /// Destination the payload is forwarded to.
    pub destination_id: DestinationId,

    /// Kind of inbound source.
    pub source_type: SourceType,

    /// Provider-side event identifier (wamid, leadgen id). Observability
    /// only; no uniqueness is enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,

    /// Original inbound payload.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub payload: serde_json::Value,

    /// Payload after the route's mapping, when one applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub transformed_payload: Option<serde_json::Value>,

    /// Current lifecycle state.
    pub status: EventStatus,

    /// Number of delivery attempts made so far.
    pub attempts_count: u32,

    /// Attempt budget. Raised by one on each manual resend.
    pub max_attempts: u32,

    /// When the event becomes eligible for the next attempt. Always null in
    /// terminal states.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Set exactly when the event reaches `delivered`.
    pub delivered_at: Option<DateTime<Utc>>,

    /// Set when the event last entered `failed` or `dlq`.
    pub failed_at: Option<DateTime<Utc>>,

    /// Error from the most recent failed attempt.
    pub error_message: Option<String>,

    /// Free-form metadata forwarded as idempotency hints.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub metadata: serde_json::Value,

    /// Timestamp when the event was created.
    pub created_at: DateTime<Utc>,
}

impl DeliveryEvent {
    /// Create a `pending` event that is immediately eligible for delivery.
    #[must_use]
    pub fn new(
        tenant: impl Into<TenantId>,
        route_id: RouteId,
        destination_id: DestinationId,
        source_type: SourceType,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EventId::generate(),
            tenant: tenant.into(),
            route_id,
            destination_id,
            source_type,
            source_event_id: None,
            payload,
            transformed_payload: None,
            status: EventStatus::Pending,
            attempts_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            next_retry_at: Some(now),
            delivered_at: None,
            failed_at: None,
            error_message: None,
            metadata: serde_json::Value::Null,
            created_at: now,
        }
    }

    /// Set the provider-side event identifier.
    #[must_use]
    pub fn with_source_event_id(mut self, id: impl Into<String>) -> Self {
        self.source_event_id = Some(id.into());
        self
    }

    /// Set the transformed payload.
    #[must_use]
    pub fn with_transformed_payload(mut self, payload: serde_json::Value) -> Self {
        self.transformed_payload = Some(payload);
        self
    }

    /// Set the free-form metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// The payload an attempt actually sends: the transformed payload when
    /// present, the original otherwise.
    pub fn delivery_payload(&self) -> &serde_json::Value {
        self.transformed_payload.as_ref().unwrap_or(&self.payload)
    }

    /// Whether another attempt fits inside the attempt budget.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts_count < self.max_attempts
    }
}

/// One HTTP call recorded against an event. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DeliveryAttempt {
    /// Event this attempt belongs to.
    pub event_id: EventId,

    /// 1-based attempt number, dense within the event.
    pub attempt_number: u32,

    /// Request URL at the time of the call.
    pub request_url: String,

    /// Request method at the time of the call.
    pub request_method: String,

    /// HTTP status code; absent on network error or timeout.
    pub status_code: Option<u16>,

    /// First 2000 bytes of the response body.
    pub response_body: Option<String>,

    /// Network or timeout error message.
    pub error_message: Option<String>,

    /// Wall-clock duration of the call in milliseconds.
    pub duration_ms: u64,

    /// When the attempt was made.
    pub attempted_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// Whether the attempt succeeded (HTTP 2xx).
    pub fn is_success(&self) -> bool {
        self.status_code.is_some_and(|s| (200..300).contains(&s))
    }
}
