use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DestinationId, MappingId, RouteId, SourceType, TenantId};

/// WhatsApp event kinds a route filter may restrict to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum WhatsappEventType {
    Messages,
    StatusSent,
    StatusDelivered,
    StatusRead,
    StatusFailed,
}

/// Pre-enqueue predicates on the inbound event.
///
/// `event_types` is the only defined filter today. An absent or empty list
/// accepts every event; the empty form exists only because legacy rows
/// stored `[]`, and it is normalized to accept-all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FilterRules {
    /// Restrict WhatsApp routes to a subset of event kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_types: Option<Vec<WhatsappEventType>>,
}

impl FilterRules {
    /// Whether an event of the given kind passes this filter.
    pub fn accepts(&self, event_type: Option<WhatsappEventType>) -> bool {
        match (&self.event_types, event_type) {
            (None, _) => true,
            (Some(allowed), _) if allowed.is_empty() => true,
            (Some(allowed), Some(et)) => allowed.contains(&et),
            // A typed filter cannot match an event whose kind is unknown.
            (Some(_), None) => false,
        }
    }
}

/// Binding of an inbound source to exactly one destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Route {
    /// Unique route identifier.
    pub id: RouteId,

    /// Tenant that owns this route.
    pub tenant: TenantId,

    /// Kind of inbound source this route matches.
    pub source_type: SourceType,

    /// Channel-specific identifier (Meta phone-number id, lead form id).
    /// Absent means catch-all for the source type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    /// Destination events are forwarded to.
    pub destination_id: DestinationId,

    /// Optional transformation applied before forwarding. Detached routes
    /// forward the payload as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_id: Option<MappingId>,

    /// Pre-enqueue filter. `None` accepts all events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_rules: Option<FilterRules>,

    /// Match priority within [0, 100]; higher wins.
    pub priority: u8,

    /// Inactive routes never match.
    pub is_active: bool,

    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,

    /// Timestamp when the route was created, used as the ordering
    /// tie-breaker after priority.
    pub created_at: DateTime<Utc>,
}

impl Route {
    /// Create an active catch-all route with priority 0 and no mapping.
    #[must_use]
    pub fn new(
        tenant: impl Into<TenantId>,
        source_type: SourceType,
        destination_id: DestinationId,
    ) -> Self {
        Self {
            id: RouteId::generate(),
            tenant: tenant.into(),
            source_type,
            source_id: None,
            destination_id,
            mapping_id: None,
            filter_rules: None,
            priority: 0,
            is_active: true,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    /// Bind the route to a specific channel identifier.
    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Attach a mapping.
    #[must_use]
    pub fn with_mapping(mut self, mapping_id: MappingId) -> Self {
        self.mapping_id = Some(mapping_id);
        self
    }

    /// Set the filter rules.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterRules) -> Self {
        self.filter_rules = Some(filter);
        self
    }

    /// Set the priority (clamped to 100).
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(100);
        self
    }

    /// Whether the route can match at all (active and not soft-deleted).
    pub fn is_matchable(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }

    /// Whether this route accepts an event of the given WhatsApp kind.
    pub fn accepts_event(&self, event_type: Option<WhatsappEventType>) -> bool {
        self.filter_rules
            .as_ref()
            .is_none_or(|f| f.accepts(event_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Route {
        Route::new("ws-1", SourceType::Whatsapp, DestinationId::generate())
    }

    #[test]
    fn absent_filter_accepts_everything() {
        let r = route();
        assert!(r.accepts_event(Some(WhatsappEventType::Messages)));
        assert!(r.accepts_event(Some(WhatsappEventType::StatusRead)));
        assert!(r.accepts_event(None));
    }

    #[test]
    fn empty_filter_list_accepts_everything() {
        let r = route().with_filter(FilterRules {
            event_types: Some(vec![]),
        });
        assert!(r.accepts_event(Some(WhatsappEventType::StatusFailed)));
        assert!(r.accepts_event(None));
    }

    #[test]
    fn filter_restricts_to_listed_kinds() {
        let r = route().with_filter(FilterRules {
            event_types: Some(vec![WhatsappEventType::Messages]),
        });
        assert!(r.accepts_event(Some(WhatsappEventType::Messages)));
        assert!(!r.accepts_event(Some(WhatsappEventType::StatusRead)));
        assert!(!r.accepts_event(None));
    }

    #[test]
    fn priority_is_clamped() {
        let r = route().with_priority(200);
        assert_eq!(r.priority, 100);
    }

    #[test]
    fn event_type_snake_case() {
        let json = serde_json::to_string(&WhatsappEventType::StatusDelivered).unwrap();
        assert_eq!(json, "\"status_delivered\"");
    }
}
