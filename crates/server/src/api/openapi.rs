use utoipa::OpenApi;

/// OpenAPI document for the hub API, served under `/docs`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "MetaHub API",
        description = "Event ingestion, routing and delivery pipeline for Meta webhooks."
    ),
    paths(
        super::health::health,
        super::webhook::verify,
        super::webhook::receive,
        super::delivery::process,
        super::delivery::resend,
        super::delivery::test,
        super::delivery::stats,
        super::delivery::events,
        super::transform::preview,
        super::alerts::acknowledge,
        super::alerts::resolve,
        super::oauth::start,
        super::oauth::callback,
        super::logs::query,
    ),
    tags(
        (name = "Webhook", description = "Meta inbound webhooks"),
        (name = "Delivery", description = "Delivery worker and event inspection"),
        (name = "Transform", description = "Mapping preview"),
        (name = "Alerts", description = "Alert lifecycle"),
        (name = "OAuth", description = "Meta OAuth"),
        (name = "Logs", description = "Structured event logs"),
        (name = "Health", description = "Liveness"),
    )
)]
pub struct ApiDoc;
