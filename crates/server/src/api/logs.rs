use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;

use metahub_core::{LogCategory, LogEntry, LogLevel, TenantId};
use metahub_store::{LogQuery, LogStore};

use super::AppState;
use crate::auth::{authenticate, require_member};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub tenant_id: TenantId,
    pub level: Option<LogLevel>,
    pub category: Option<LogCategory>,
    pub search: Option<String>,
    pub limit: Option<u32>,
}

/// `GET /logs` -- read the tenant's structured log sink, newest first.
#[utoipa::path(
    get,
    path = "/logs",
    tag = "Logs",
    summary = "Query event logs",
    responses(
        (status = 200, description = "Matching log rows, newest first"),
        (status = 403, description = "Caller is not a member of the tenant")
    )
)]
pub async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let caller = authenticate(state.sessions.as_ref(), &headers).await?;
    require_member(&caller, &query.tenant_id)?;

    let rows = state
        .stores
        .logs
        .query(&LogQuery {
            tenant: Some(query.tenant_id),
            level: query.level,
            category: query.category,
            search: query.search,
            limit: query.limit,
        })
        .await?;
    Ok(Json(rows))
}
