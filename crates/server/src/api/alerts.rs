use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use metahub_core::AlertId;

use super::AppState;
use crate::auth::authenticate;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AlertActionRequest {
    pub alert_id: AlertId,
}

/// `POST /alerts/acknowledge` -- mark a triggered alert as seen.
#[utoipa::path(
    post,
    path = "/alerts/acknowledge",
    tag = "Alerts",
    summary = "Acknowledge an alert",
    responses(
        (status = 204, description = "Acknowledged"),
        (status = 403, description = "Caller is not a member of the alert tenant"),
        (status = 404, description = "Unknown alert")
    )
)]
pub async fn acknowledge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AlertActionRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = authenticate(state.sessions.as_ref(), &headers).await?;
    state
        .evaluator
        .acknowledge(&caller, &request.alert_id)
        .await
        .map_err(ApiError::Hub)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /alerts/resolve` -- close out an alert.
#[utoipa::path(
    post,
    path = "/alerts/resolve",
    tag = "Alerts",
    summary = "Resolve an alert",
    responses(
        (status = 204, description = "Resolved"),
        (status = 403, description = "Caller is not a member of the alert tenant"),
        (status = 404, description = "Unknown alert")
    )
)]
pub async fn resolve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AlertActionRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = authenticate(state.sessions.as_ref(), &headers).await?;
    state
        .evaluator
        .resolve(&caller, &request.alert_id)
        .await
        .map_err(ApiError::Hub)?;
    Ok(StatusCode::NO_CONTENT)
}
