use std::collections::HashMap;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Deserialize;

use metahub_core::{Mapping, MappingMode, MappingRule};

use super::AppState;
use crate::auth::authenticate;
use crate::error::ApiError;

/// Body of the mapping preview endpoint: an ephemeral mapping plus the
/// payload to run it against.
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub mode: MappingMode,
    #[serde(default)]
    pub rules: Vec<MappingRule>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub static_fields: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub pass_through: bool,
    pub payload: serde_json::Value,
}

/// `POST /transform/preview` -- dry-run a mapping for the editor.
///
/// Pure computation; nothing is stored. Data problems come back as a
/// successful response with warnings, only structurally invalid mappings
/// produce `success = false`.
#[utoipa::path(
    post,
    path = "/transform/preview",
    tag = "Transform",
    summary = "Preview a mapping",
    responses(
        (status = 200, description = "Preview result"),
        (status = 401, description = "Missing session")
    )
)]
pub async fn preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authenticate(state.sessions.as_ref(), &headers).await?;

    let mut mapping = Mapping::new("preview", "preview");
    mapping.mode = request.mode;
    mapping.rules = request.rules;
    mapping.template = request.template;
    mapping.static_fields = request.static_fields;
    mapping.pass_through = request.pass_through;

    let started = Instant::now();
    let response = match metahub_mapping::apply(&mapping, &request.payload) {
        Ok(output) => serde_json::json!({
            "success": true,
            "output": output.output,
            "warnings": output.warnings,
            "duration_ms": started.elapsed().as_millis() as u64,
        }),
        Err(e) => serde_json::json!({
            "success": false,
            "error": e.to_string(),
            "duration_ms": started.elapsed().as_millis() as u64,
        }),
    };
    Ok(Json(response))
}
