use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;

use metahub_core::{EventId, EventStatus, HubError, TenantId};
use metahub_store::{DestinationStore, EventStore};

use super::AppState;
use crate::auth::{authenticate, require_member};
use crate::error::ApiError;

/// `POST /delivery/process` -- run one worker cycle over ready events.
#[utoipa::path(
    post,
    path = "/delivery/process",
    tag = "Delivery",
    summary = "Run a delivery cycle",
    responses(
        (status = 200, description = "Cycle counters"),
        (status = 401, description = "Missing session")
    )
)]
pub async fn process(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    authenticate(state.sessions.as_ref(), &headers).await?;
    let summary = state.worker.process().await?;
    Ok(Json(serde_json::json!({
        "processed": summary.processed,
        "delivered": summary.delivered,
        "failed": summary.failed,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub event_id: EventId,
}

/// `POST /delivery/resend` -- user-initiated resend of a failed or
/// dead-lettered event.
#[utoipa::path(
    post,
    path = "/delivery/resend",
    tag = "Delivery",
    summary = "Resend a failed event",
    responses(
        (status = 200, description = "Resend outcome"),
        (status = 403, description = "Caller is not a member of the event tenant"),
        (status = 404, description = "Unknown event")
    )
)]
pub async fn resend(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ResendRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = authenticate(state.sessions.as_ref(), &headers).await?;
    let event = state
        .stores
        .events
        .get(&request.event_id)
        .await?
        .ok_or_else(|| ApiError::Hub(HubError::not_found("event", &request.event_id)))?;
    require_member(&caller, &event.tenant)?;

    let outcome = state.worker.resend(&request.event_id).await?;
    Ok(Json(serde_json::json!({
        "success": outcome.success,
        "error": outcome.error,
    })))
}

#[derive(Debug, Deserialize)]
pub struct TestRequest {
    pub destination_id: metahub_core::DestinationId,
}

/// `POST /delivery/test` -- dry-run a destination with a sample payload.
#[utoipa::path(
    post,
    path = "/delivery/test",
    tag = "Delivery",
    summary = "Test a destination",
    responses(
        (status = 200, description = "Attempt result"),
        (status = 403, description = "Caller is not a member of the destination tenant"),
        (status = 404, description = "Unknown destination")
    )
)]
pub async fn test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TestRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = authenticate(state.sessions.as_ref(), &headers).await?;
    let destination = state
        .stores
        .destinations
        .get(&request.destination_id)
        .await?
        .ok_or_else(|| ApiError::Hub(HubError::not_found("destination", &request.destination_id)))?;
    require_member(&caller, &destination.tenant)?;

    let result = state.worker.test(&request.destination_id).await?;
    Ok(Json(serde_json::json!({
        "success": result.is_success(),
        "status_code": result.status_code,
        "response_body": result.response_body,
        "duration_ms": result.duration_ms,
        "error": result.error_message,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub tenant_id: TenantId,
    #[serde(default = "default_stats_hours")]
    pub hours: u32,
}

fn default_stats_hours() -> u32 {
    24
}

/// `GET /delivery/stats` -- aggregate event statistics for a tenant.
#[utoipa::path(
    get,
    path = "/delivery/stats",
    tag = "Delivery",
    summary = "Event statistics",
    responses((status = 200, description = "Window aggregates"))
)]
pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StatsQuery>,
) -> Result<Json<metahub_store::EventWindowStats>, ApiError> {
    let caller = authenticate(state.sessions.as_ref(), &headers).await?;
    require_member(&caller, &query.tenant_id)?;
    let stats = state
        .stores
        .events
        .stats_window(&query.tenant_id, query.hours)
        .await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub tenant_id: TenantId,
    pub status: Option<EventStatus>,
    #[serde(default = "default_events_limit")]
    pub limit: u32,
}

fn default_events_limit() -> u32 {
    50
}

/// `GET /delivery/events` -- recent events of a tenant, newest first.
#[utoipa::path(
    get,
    path = "/delivery/events",
    tag = "Delivery",
    summary = "List delivery events",
    responses((status = 200, description = "Events, newest first"))
)]
pub async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<metahub_core::DeliveryEvent>>, ApiError> {
    let caller = authenticate(state.sessions.as_ref(), &headers).await?;
    require_member(&caller, &query.tenant_id)?;
    let limit = query.limit.clamp(1, 500) as usize;
    let events = state
        .stores
        .events
        .list_by_tenant(&query.tenant_id, query.status, limit)
        .await?;
    Ok(Json(events))
}
