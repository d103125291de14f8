use axum::Json;

/// `GET /health` -- liveness probe, no auth.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    summary = "Liveness probe",
    responses((status = 200, description = "Server is up"))
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
