use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use metahub_core::MetaEnvelope;

use super::AppState;
use crate::error::ApiError;

/// Query parameters of Meta's subscription challenge.
#[derive(Debug, Deserialize)]
pub struct ChallengeQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// `GET /webhook/meta` -- answer the subscription challenge.
///
/// Returns the raw challenge with 200 iff the verify token matches the
/// configured one, 403 otherwise.
#[utoipa::path(
    get,
    path = "/webhook/meta",
    tag = "Webhook",
    summary = "Subscription challenge",
    responses(
        (status = 200, description = "Challenge echoed"),
        (status = 403, description = "Verify token mismatch")
    )
)]
pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<ChallengeQuery>,
) -> impl IntoResponse {
    match state.receiver.verify_challenge(
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
    ) {
        Some(challenge) => (StatusCode::OK, challenge),
        None => (StatusCode::FORBIDDEN, String::new()),
    }
}

/// `POST /webhook/meta` -- ingest a Meta envelope.
///
/// Always 200 for parseable bodies (Meta must not retry malformed
/// payloads); 500 only when the enqueue itself fails so Meta retries.
#[utoipa::path(
    post,
    path = "/webhook/meta",
    tag = "Webhook",
    summary = "Ingest Meta envelope",
    responses(
        (status = 200, description = "Envelope processed or ignored"),
        (status = 500, description = "Enqueue failed, Meta will retry")
    )
)]
pub async fn receive(
    State(state): State<AppState>,
    Json(envelope): Json<MetaEnvelope>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.receiver.process(&envelope).await?;
    Ok(Json(serde_json::json!({
        "status": outcome.status,
        "processed": outcome.processed,
    })))
}
