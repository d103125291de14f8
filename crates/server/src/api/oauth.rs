use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use metahub_core::{Integration, IntegrationId, LogCategory, LogEntry, LogLevel, TenantId};
use metahub_store::{IntegrationStore, LogStore};

use super::AppState;
use crate::auth::{authenticate, require_member};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub workspace_id: TenantId,
}

/// `POST /oauth/meta/start` -- begin the Meta consent dance.
///
/// Returns the consent URL and the HMAC-signed state parameter the
/// callback will verify.
#[utoipa::path(
    post,
    path = "/oauth/meta/start",
    tag = "OAuth",
    summary = "Start Meta OAuth",
    responses(
        (status = 200, description = "Consent URL and signed state"),
        (status = 403, description = "Caller is not a member of the workspace")
    )
)]
pub async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<StartRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = authenticate(state.sessions.as_ref(), &headers).await?;
    require_member(&caller, &request.workspace_id)?;

    let signed = state.oauth.sign(&request.workspace_id, &caller.user);
    let url = state.oauth.authorize_url(&signed);

    let entry = LogEntry::new(
        request.workspace_id.clone(),
        LogLevel::Info,
        LogCategory::Oauth,
        "oauth.started",
        "Meta OAuth consent started",
    );
    let _ = state.stores.logs.append(entry).await;

    Ok(Json(serde_json::json!({ "url": url, "state": signed })))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

/// `GET /oauth/meta/callback` -- complete the consent dance.
///
/// Verifies the signed state (rejecting tampering and anything older than
/// ten minutes), exchanges the code for a token, stores the integration
/// and bounces the browser back to the UI.
#[utoipa::path(
    get,
    path = "/oauth/meta/callback",
    tag = "OAuth",
    summary = "Meta OAuth callback",
    responses(
        (status = 302, description = "Redirect back to the UI"),
        (status = 400, description = "Invalid or expired state")
    )
)]
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let payload = state.oauth.verify(&query.state)?;

    let token = state
        .graph
        .exchange_code(
            &state.config.meta_app_id,
            &state.config.meta_app_secret,
            &state.config.oauth_redirect_uri(),
            &query.code,
        )
        .await
        .map_err(|e| {
            warn!(error = %e, "oauth code exchange failed");
            ApiError::from(e)
        })?;

    let integration = Integration {
        id: IntegrationId::generate(),
        tenant: payload.wid.clone(),
        access_token: token.access_token,
        scopes: Vec::new(),
        resources: Vec::new(),
        last_synced_at: Some(Utc::now()),
        created_at: Utc::now(),
    };
    state.stores.integrations.upsert(integration).await?;

    let entry = LogEntry::new(
        payload.wid.clone(),
        LogLevel::Info,
        LogCategory::Oauth,
        "oauth.connected",
        "Meta integration connected",
    );
    let _ = state.stores.logs.append(entry).await;
    info!(tenant = %payload.wid, "meta integration stored");

    let location = format!("{}/integrations?connected=meta", state.config.app_url);
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}
