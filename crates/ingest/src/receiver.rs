//! The Meta webhook receiver.
//!
//! Meta must get its 200 fast: the receiver only parses, resolves,
//! persists and enqueues. Delivery happens on the shared tenant task pool,
//! and its outcome never influences the acknowledgement.

use std::collections::BTreeMap;
use std::sync::Arc;

use metahub_core::{
    DeliveryEvent, FIELD_LEADGEN, LogCategory, LogEntry, LogLevel, MetaChange, MetaEnvelope,
    OBJECT_PAGE, OBJECT_WHATSAPP, Route, SourceType, TenantId,
};
use metahub_delivery::{DeliveryWorker, TenantTaskPool};
use metahub_meta::GraphClient;
use metahub_store::{EventStore, IntegrationStore, LogStore, MappingStore, Stores};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::IngestError;
use crate::resolver::RouteResolver;

/// Log rows for traffic that never bound to a tenant (unprocessable or
/// unmatched envelopes) land under this reserved tenant.
const SYSTEM_TENANT: &str = "system";

/// Outcome of one webhook POST, acknowledged to Meta.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `processed` or `ignored`.
    pub status: String,
    /// Delivery events created.
    pub processed: u64,
}

impl ProcessOutcome {
    fn ignored() -> Self {
        Self {
            status: "ignored".to_owned(),
            processed: 0,
        }
    }
}

/// Handles the `/webhook/meta` entry points.
pub struct WebhookReceiver {
    stores: Stores,
    resolver: RouteResolver,
    worker: Arc<DeliveryWorker>,
    pool: TenantTaskPool,
    graph: Arc<GraphClient>,
    verify_token: String,
}

impl WebhookReceiver {
    /// Create a receiver wired to the shared stores, worker and pool.
    #[must_use]
    pub fn new(
        stores: Stores,
        worker: Arc<DeliveryWorker>,
        pool: TenantTaskPool,
        graph: Arc<GraphClient>,
        verify_token: impl Into<String>,
    ) -> Self {
        let resolver = RouteResolver::new(Arc::clone(&stores.routes));
        Self {
            stores,
            resolver,
            worker,
            pool,
            graph,
            verify_token: verify_token.into(),
        }
    }

    /// Answer Meta's subscription challenge. Returns the raw challenge to
    /// echo with a 200 iff the token matches; `None` means 403.
    pub fn verify_challenge(
        &self,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<&str>,
    ) -> Option<String> {
        if mode == Some("subscribe") && token == Some(self.verify_token.as_str()) {
            challenge.map(str::to_owned)
        } else {
            None
        }
    }

    /// Process one envelope. Malformed bodies are acknowledged as ignored;
    /// only an enqueue failure bubbles up (Meta retries on 500).
    #[instrument(skip(self, envelope))]
    pub async fn process(&self, envelope: &MetaEnvelope) -> Result<ProcessOutcome, IngestError> {
        if !envelope.is_processable() {
            debug!("unprocessable envelope acknowledged as ignored");
            self.log_ignored("Envelope missing object or entries").await;
            return Ok(ProcessOutcome::ignored());
        }
        let object = envelope.object.as_deref().unwrap_or_default();

        let mut processed = 0;
        for entry in &envelope.entry {
            for change in &entry.changes {
                processed += match object {
                    OBJECT_WHATSAPP => self.process_whatsapp_change(change).await?,
                    OBJECT_PAGE if change.field.as_deref() == Some(FIELD_LEADGEN) => {
                        self.process_leadgen_change(change).await?
                    }
                    _ => 0,
                };
            }
        }

        let status = if processed > 0 {
            "processed"
        } else {
            self.log_ignored("No delivery event created for the envelope").await;
            "ignored"
        };
        Ok(ProcessOutcome {
            status: status.to_owned(),
            processed,
        })
    }

    async fn process_whatsapp_change(&self, change: &MetaChange) -> Result<u64, IngestError> {
        let source_id = change.phone_number_id();
        let event_type = change.whatsapp_event_type();
        let routes = self
            .resolver
            .resolve_global(SourceType::Whatsapp, source_id)
            .await?;
        self.log_routes_matched(&routes, SourceType::Whatsapp, source_id)
            .await;

        let mut created = 0;
        for route in routes {
            if !route.accepts_event(event_type) {
                debug!(route_id = %route.id, "route filter suppressed event");
                continue;
            }
            self.log_received(&route, SourceType::Whatsapp, source_id).await;
            self.create_and_dispatch(&route, SourceType::Whatsapp, change.value.clone(), change.wamid())
                .await?;
            created += 1;
        }
        Ok(created)
    }

    async fn process_leadgen_change(&self, change: &MetaChange) -> Result<u64, IngestError> {
        let source_id = change.form_id();
        let routes = self
            .resolver
            .resolve_global(SourceType::Forms, source_id)
            .await?;
        self.log_routes_matched(&routes, SourceType::Forms, source_id)
            .await;

        let mut created = 0;
        for route in routes {
            self.log_received(&route, SourceType::Forms, source_id).await;
            // Enrichment uses the route tenant's integration token and is
            // strictly best-effort.
            let payload = self.enrich_lead(&route, change).await;
            self.create_and_dispatch(&route, SourceType::Forms, payload, change.leadgen_id())
                .await?;
            created += 1;
        }
        Ok(created)
    }

    /// Fetch the full lead and attach it to the change payload. Failure
    /// leaves the raw payload untouched.
    async fn enrich_lead(&self, route: &Route, change: &MetaChange) -> serde_json::Value {
        let mut payload = change.value.clone();
        let Some(lead_id) = change.leadgen_id() else {
            return payload;
        };
        let integration = match self.stores.integrations.get_by_tenant(&route.tenant).await {
            Ok(Some(integration)) => integration,
            Ok(None) => {
                debug!(tenant = %route.tenant, "no integration token, skipping enrichment");
                return payload;
            }
            Err(e) => {
                warn!(error = %e, "integration lookup failed, skipping enrichment");
                return payload;
            }
        };

        let token = route
            .source_id
            .as_deref()
            .map_or(integration.access_token.as_str(), |sid| {
                integration.enrichment_token(sid)
            });
        match self.graph.fetch_lead(lead_id, token).await {
            Ok(lead) => {
                if let Some(object) = payload.as_object_mut() {
                    object.insert("lead".to_owned(), lead);
                }
            }
            Err(e) => {
                warn!(error = %e, lead_id, "lead enrichment failed");
                let entry = LogEntry::new(
                    route.tenant.clone(),
                    LogLevel::Warn,
                    LogCategory::Webhook,
                    "webhook.enrichment_failed",
                    format!("Lead enrichment failed: {e}"),
                );
                let _ = self.stores.logs.append(entry).await;
            }
        }
        payload
    }

    /// Create the pending event, log it and hand the first attempt to the
    /// tenant pool.
    async fn create_and_dispatch(
        &self,
        route: &Route,
        source_type: SourceType,
        payload: serde_json::Value,
        source_event_id: Option<&str>,
    ) -> Result<(), IngestError> {
        let transformed = self.apply_route_mapping(route, &payload).await;

        let mut event = DeliveryEvent::new(
            route.tenant.clone(),
            route.id.clone(),
            route.destination_id.clone(),
            source_type,
            payload,
        );
        if let Some(id) = source_event_id {
            event = event.with_source_event_id(id);
            event = event.with_metadata(serde_json::json!({ "idempotency_hint": id }));
        }
        if let Some(transformed) = transformed {
            event = event.with_transformed_payload(transformed);
        }
        let event_id = event.id.clone();

        // Enqueue failure must surface as a 500 so Meta retries.
        self.stores.events.create(event).await?;

        let entry = LogEntry::new(
            route.tenant.clone(),
            LogLevel::Info,
            LogCategory::Webhook,
            "webhook.event_created",
            format!("Delivery event created for route {}", route.id),
        )
        .with_resource(event_id.to_string());
        let _ = self.stores.logs.append(entry).await;

        // First attempt, off the acceptor task. A failure here still
        // leaves the scheduled retry path intact.
        let worker = Arc::clone(&self.worker);
        self.pool.spawn(&route.tenant, async move {
            if let Err(e) = worker.deliver_now(&event_id).await {
                warn!(event_id = %event_id, error = %e, "inline first delivery failed");
            }
        });

        info!(route_id = %route.id, "event enqueued");
        Ok(())
    }

    async fn apply_route_mapping(
        &self,
        route: &Route,
        payload: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        let mapping_id = route.mapping_id.as_ref()?;
        let mapping = match self.stores.mappings.get(mapping_id).await {
            Ok(Some(mapping)) => mapping,
            // A detached or deleted mapping degrades to pass-through.
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "mapping lookup failed, forwarding raw payload");
                return None;
            }
        };
        match metahub_mapping::apply(&mapping, payload) {
            Ok(output) => {
                if !output.warnings.is_empty() {
                    let entry = LogEntry::new(
                        route.tenant.clone(),
                        LogLevel::Warn,
                        LogCategory::Mapping,
                        "mapping.warnings",
                        output.warnings.join("; "),
                    );
                    let _ = self.stores.logs.append(entry).await;
                }
                Some(output.output)
            }
            Err(e) => {
                warn!(error = %e, mapping_id = %mapping_id, "structurally invalid mapping ignored");
                let entry = LogEntry::new(
                    route.tenant.clone(),
                    LogLevel::Error,
                    LogCategory::Mapping,
                    "mapping.invalid",
                    e.to_string(),
                );
                let _ = self.stores.logs.append(entry).await;
                None
            }
        }
    }

    /// One `webhook.routes_matched` row per tenant whose routes matched,
    /// carrying that tenant's match count.
    async fn log_routes_matched(
        &self,
        routes: &[Route],
        source_type: SourceType,
        source_id: Option<&str>,
    ) {
        let mut counts: BTreeMap<&TenantId, u64> = BTreeMap::new();
        for route in routes {
            *counts.entry(&route.tenant).or_default() += 1;
        }
        for (tenant, count) in counts {
            let entry = LogEntry::new(
                tenant.clone(),
                LogLevel::Info,
                LogCategory::Webhook,
                "webhook.routes_matched",
                format!(
                    "{count} route(s) matched inbound {source_type} event for {}",
                    source_id.unwrap_or("catch-all")
                ),
            )
            .with_metadata(serde_json::json!({ "count": count, "source_id": source_id }));
            let _ = self.stores.logs.append(entry).await;
        }
    }

    /// Acknowledged-but-ignored traffic has no tenant to charge the row
    /// to, so it lands under the reserved system tenant.
    async fn log_ignored(&self, message: &str) {
        let entry = LogEntry::new(
            SYSTEM_TENANT,
            LogLevel::Info,
            LogCategory::Webhook,
            "webhook.ignored",
            message,
        );
        let _ = self.stores.logs.append(entry).await;
    }

    async fn log_received(&self, route: &Route, source_type: SourceType, source_id: Option<&str>) {
        let entry = LogEntry::new(
            route.tenant.clone(),
            LogLevel::Info,
            LogCategory::Webhook,
            "webhook.received",
            format!(
                "Inbound {source_type} event for {}",
                source_id.unwrap_or("catch-all")
            ),
        )
        .with_metadata(serde_json::json!({ "route_id": route.id.as_str() }));
        let _ = self.stores.logs.append(entry).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_requires_subscribe_mode_and_token() {
        let stores = metahub_store_memory::memory_stores();
        let worker = Arc::new(DeliveryWorker::new(stores.clone()));
        let receiver = WebhookReceiver::new(
            stores,
            worker,
            TenantTaskPool::new(),
            Arc::new(GraphClient::new()),
            "verify-me",
        );

        assert_eq!(
            receiver.verify_challenge(Some("subscribe"), Some("verify-me"), Some("12345")),
            Some("12345".to_owned())
        );
        assert_eq!(
            receiver.verify_challenge(Some("subscribe"), Some("wrong"), Some("12345")),
            None
        );
        assert_eq!(receiver.verify_challenge(None, Some("verify-me"), Some("12345")), None);
        assert_eq!(
            receiver.verify_challenge(Some("unsubscribe"), Some("verify-me"), Some("12345")),
            None
        );
    }
}
