pub mod alerts;
pub mod delivery;
pub mod health;
pub mod logs;
pub mod oauth;
pub mod openapi;
pub mod transform;
pub mod webhook;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use metahub_alerts::Evaluator;
use metahub_delivery::DeliveryWorker;
use metahub_ingest::WebhookReceiver;
use metahub_meta::{GraphClient, OauthState};
use metahub_store::Stores;

use crate::auth::SessionResolver;
use crate::config::HubConfig;

use self::openapi::ApiDoc;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository bundle.
    pub stores: Stores,
    /// Webhook receiver.
    pub receiver: Arc<WebhookReceiver>,
    /// Delivery worker (process / resend / test).
    pub worker: Arc<DeliveryWorker>,
    /// Alert evaluator (lifecycle actions).
    pub evaluator: Arc<Evaluator>,
    /// OAuth state signer.
    pub oauth: Arc<OauthState>,
    /// Meta Graph client.
    pub graph: Arc<GraphClient>,
    /// Session resolution, provided by the external auth collaborator.
    pub sessions: Arc<dyn SessionResolver>,
    /// Resolved environment configuration.
    pub config: HubConfig,
}

/// Build the Axum router with all API routes, middleware and Swagger UI.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Public surface: health, Meta webhooks, OAuth callback.
        .route("/health", get(health::health))
        .route("/webhook/meta", get(webhook::verify).post(webhook::receive))
        .route("/oauth/meta/callback", get(oauth::callback))
        // Session-scoped surface.
        .route("/delivery/process", post(delivery::process))
        .route("/delivery/resend", post(delivery::resend))
        .route("/delivery/test", post(delivery::test))
        .route("/delivery/stats", get(delivery::stats))
        .route("/delivery/events", get(delivery::events))
        .route("/transform/preview", post(transform::preview))
        .route("/alerts/acknowledge", post(alerts::acknowledge))
        .route("/alerts/resolve", post(alerts::resolve))
        .route("/oauth/meta/start", post(oauth::start))
        .route("/logs", get(logs::query))
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
