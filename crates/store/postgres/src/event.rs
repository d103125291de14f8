use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use metahub_core::{DeliveryAttempt, DeliveryEvent, EventId, EventStatus, TenantId};
use metahub_store::event::{AttemptOutcome, EventWindowStats, TransitionUpdate};
use metahub_store::{EventStore, StoreError};

use crate::rows::{db_err, enum_str, parse_enum};

/// Postgres-backed [`EventStore`].
///
/// The conditional `UPDATE ... WHERE id = $1 AND status = $2` carries the
/// whole optimistic-concurrency story; zero affected rows is resolved into
/// `NotFound` or `Conflict` with a follow-up read.
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    tenant: String,
    route_id: String,
    destination_id: String,
    source_type: String,
    source_event_id: Option<String>,
    payload: serde_json::Value,
    transformed_payload: Option<serde_json::Value>,
    status: String,
    attempts_count: i32,
    max_attempts: i32,
    next_retry_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for DeliveryEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: EventId::new(row.id),
            tenant: TenantId::new(row.tenant),
            route_id: row.route_id.into(),
            destination_id: row.destination_id.into(),
            source_type: parse_enum(&row.source_type)?,
            source_event_id: row.source_event_id,
            payload: row.payload,
            transformed_payload: row.transformed_payload,
            status: parse_enum(&row.status)?,
            attempts_count: u32::try_from(row.attempts_count.max(0)).unwrap_or(0),
            max_attempts: u32::try_from(row.max_attempts.max(0)).unwrap_or(0),
            next_retry_at: row.next_retry_at,
            delivered_at: row.delivered_at,
            failed_at: row.failed_at,
            error_message: row.error_message,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

const EVENT_COLUMNS: &str = "id, tenant, route_id, destination_id, source_type, source_event_id, \
     payload, transformed_payload, status, attempts_count, max_attempts, next_retry_at, \
     delivered_at, failed_at, error_message, metadata, created_at";

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn create(&self, event: DeliveryEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mh_events (id, tenant, route_id, destination_id, source_type, \
             source_event_id, payload, transformed_payload, status, attempts_count, \
             max_attempts, next_retry_at, delivered_at, failed_at, error_message, metadata, \
             created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(event.id.as_str())
        .bind(event.tenant.as_str())
        .bind(event.route_id.as_str())
        .bind(event.destination_id.as_str())
        .bind(enum_str(&event.source_type)?)
        .bind(&event.source_event_id)
        .bind(&event.payload)
        .bind(&event.transformed_payload)
        .bind(enum_str(&event.status)?)
        .bind(i32::try_from(event.attempts_count).unwrap_or(i32::MAX))
        .bind(i32::try_from(event.max_attempts).unwrap_or(i32::MAX))
        .bind(event.next_retry_at)
        .bind(event.delivered_at)
        .bind(event.failed_at)
        .bind(&event.error_message)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: &EventId) -> Result<Option<DeliveryEvent>, StoreError> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM mh_events WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(DeliveryEvent::try_from).transpose()
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
        // Terminal states never carry a retry schedule.
        let next_retry_at = if to.is_terminal() { None } else { update.next_retry_at };

        let row: Option<EventRow> = sqlx::query_as(&format!(
            "UPDATE mh_events SET \
                 status = $3, \
                 next_retry_at = $4, \
                 error_message = $5, \
                 delivered_at = COALESCE($6, delivered_at), \
                 failed_at = COALESCE($7, failed_at), \
                 attempts_count = GREATEST(attempts_count + $8, 0), \
                 max_attempts = max_attempts + $9 \
             WHERE id = $1 AND status = $2 \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(id.as_str())
        .bind(enum_str(&from)?)
        .bind(enum_str(&to)?)
        .bind(next_retry_at)
        .bind(&update.error_message)
        .bind(update.delivered_at)
        .bind(update.failed_at)
        .bind(update.attempts_delta)
        .bind(i32::from(update.bump_max_attempts))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => row.try_into(),
            None => {
                // Someone else moved the event, or it never existed.
                let found: Option<(String,)> =
                    sqlx::query_as("SELECT status FROM mh_events WHERE id = $1")
                        .bind(id.as_str())
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(db_err)?;
                match found {
                    Some((status,)) => Err(StoreError::Conflict {
                        expected: from.to_string(),
                        found: status,
                    }),
                    None => Err(StoreError::NotFound(format!("event {id}"))),
                }
            }
        }
    }

    async fn append_attempt(&self, attempt: DeliveryAttempt) -> Result<(), StoreError> {
        let budget: Option<(i32, i64)> = sqlx::query_as(
            "SELECT max_attempts, \
                 (SELECT COUNT(*) FROM mh_attempts WHERE event_id = $1) \
             FROM mh_events WHERE id = $1",
        )
        .bind(attempt.event_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some((max_attempts, existing)) = budget else {
            return Err(StoreError::NotFound(format!("event {}", attempt.event_id)));
        };
        let expected = u32::try_from(existing).unwrap_or(u32::MAX) + 1;
        if attempt.attempt_number != expected {
            return Err(StoreError::InvalidAppend(format!(
                "attempt number {} but expected {expected}",
                attempt.attempt_number
            )));
        }
        if i64::from(attempt.attempt_number) > i64::from(max_attempts) {
            return Err(StoreError::InvalidAppend(format!(
                "attempt number {} exceeds budget {max_attempts}",
                attempt.attempt_number
            )));
        }

        sqlx::query(
            "INSERT INTO mh_attempts (event_id, attempt_number, request_url, request_method, \
             status_code, response_body, error_message, duration_ms, attempted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(attempt.event_id.as_str())
        .bind(i32::try_from(attempt.attempt_number).unwrap_or(i32::MAX))
        .bind(&attempt.request_url)
        .bind(&attempt.request_method)
        .bind(attempt.status_code.map(i32::from))
        .bind(&attempt.response_body)
        .bind(&attempt.error_message)
        .bind(i64::try_from(attempt.duration_ms).unwrap_or(i64::MAX))
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn attempts(&self, id: &EventId) -> Result<Vec<DeliveryAttempt>, StoreError> {
        let rows: Vec<(i32, String, String, Option<i32>, Option<String>, Option<String>, i64, DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT attempt_number, request_url, request_method, status_code, response_body, \
                 error_message, duration_ms, attempted_at \
                 FROM mh_attempts WHERE event_id = $1 ORDER BY attempt_number ASC",
            )
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(number, url, method, status, body, error, duration, at)| DeliveryAttempt {
                event_id: id.clone(),
                attempt_number: u32::try_from(number.max(0)).unwrap_or(0),
                request_url: url,
                request_method: method,
                status_code: status.and_then(|s| u16::try_from(s).ok()),
                response_body: body,
                error_message: error,
                duration_ms: u64::try_from(duration.max(0)).unwrap_or(0),
                attempted_at: at,
            })
            .collect())
    }

    async fn query_ready(
        &self,
        statuses: &[EventStatus],
        ready_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeliveryEvent>, StoreError> {
        let status_names: Vec<String> =
            statuses.iter().map(enum_str).collect::<Result<_, _>>()?;
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM mh_events \
             WHERE status = ANY($1) AND (next_retry_at IS NULL OR next_retry_at <= $2) \
             ORDER BY created_at ASC LIMIT $3"
        ))
        .bind(&status_names)
        .bind(ready_before)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(DeliveryEvent::try_from).collect()
    }

    async fn list_by_tenant(
        &self,
        tenant: &TenantId,
        status: Option<EventStatus>,
        limit: usize,
    ) -> Result<Vec<DeliveryEvent>, StoreError> {
        let status_name = status.as_ref().map(enum_str).transpose()?;
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM mh_events \
             WHERE tenant = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC LIMIT $3"
        ))
        .bind(tenant.as_str())
        .bind(status_name)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(DeliveryEvent::try_from).collect()
    }

    async fn stats_since(
        &self,
        tenant: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<EventWindowStats, StoreError> {
        let row: (i64, i64, i64, i64, i64, i64, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*), \
                 COUNT(*) FILTER (WHERE status = 'delivered'), \
                 COUNT(*) FILTER (WHERE status = 'failed'), \
                 COUNT(*) FILTER (WHERE status = 'dlq'), \
                 COUNT(*) FILTER (WHERE status IN ('pending', 'processing')), \
                 COUNT(*) FILTER (WHERE status = 'cancelled'), \
                 CAST(AVG(EXTRACT(EPOCH FROM (delivered_at - created_at)) * 1000.0) \
                      FILTER (WHERE status = 'delivered' AND delivered_at IS NOT NULL) \
                      AS DOUBLE PRECISION) \
             FROM mh_events WHERE tenant = $1 AND created_at >= $2",
        )
        .bind(tenant.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(EventWindowStats {
            total: u64::try_from(row.0).unwrap_or(0),
            delivered: u64::try_from(row.1).unwrap_or(0),
            failed: u64::try_from(row.2).unwrap_or(0),
            dlq: u64::try_from(row.3).unwrap_or(0),
            in_flight: u64::try_from(row.4).unwrap_or(0),
            cancelled: u64::try_from(row.5).unwrap_or(0),
            avg_latency_ms: row.6,
        })
    }

    async fn count_dlq(&self, tenant: &TenantId) -> Result<u64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM mh_events WHERE tenant = $1 AND status = 'dlq'")
                .bind(tenant.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn count_created_since(
        &self,
        tenant: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM mh_events WHERE tenant = $1 AND created_at >= $2")
                .bind(tenant.as_str())
                .bind(since)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn recent_attempt_outcomes(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<AttemptOutcome>, StoreError> {
        let rows: Vec<(String, Option<i32>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT e.destination_id, a.status_code, a.attempted_at \
             FROM mh_attempts a JOIN mh_events e ON e.id = a.event_id \
             WHERE e.tenant = $1 \
             ORDER BY a.attempted_at DESC LIMIT $2",
        )
        .bind(tenant.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(destination_id, status, attempted_at)| AttemptOutcome {
                destination_id: destination_id.into(),
                success: status.is_some_and(|s| (200..300).contains(&s)),
                attempted_at,
            })
            .collect())
    }
}
