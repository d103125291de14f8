use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{IntegrationId, TenantId};

/// Kind of Meta asset enumerated from the provider after OAuth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MetaResourceKind {
    WhatsappNumber,
    AdAccount,
    LeadForm,
    Page,
}

/// One Meta asset (phone number, ad account, lead form, page) owned by an
/// integration. Routes pick their `source_id` values from this inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MetaResource {
    /// Provider-side identifier (phone-number id, form id, ...).
    pub resource_id: String,

    /// Asset kind.
    pub kind: MetaResourceKind,

    /// Display name reported by the provider.
    pub name: Option<String>,

    /// Page access token, when the provider grants one for this asset.
    /// Preferred over the user token for lead enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// Stored result of the Meta OAuth dance for one tenant.
///
/// The core uses it only as the source of routable `source_id` values and
/// as the token source for lead enrichment. Encryption at rest is a
/// deployment concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Integration {
    /// Unique integration identifier.
    pub id: IntegrationId,

    /// Tenant that owns this integration.
    pub tenant: TenantId,

    /// Long-lived user access token.
    pub access_token: String,

    /// Scopes granted during consent.
    pub scopes: Vec<String>,

    /// Inventory enumerated from the provider.
    #[serde(default)]
    pub resources: Vec<MetaResource>,

    /// When the inventory was last refreshed.
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Timestamp when the integration was stored.
    pub created_at: DateTime<Utc>,
}

impl Integration {
    /// The token to use for enrichment calls touching `resource_id`:
    /// the asset's page token when present, the user token otherwise.
    pub fn enrichment_token(&self, resource_id: &str) -> &str {
        self.resources
            .iter()
            .find(|r| r.resource_id == resource_id)
            .and_then(|r| r.access_token.as_deref())
            .unwrap_or(&self.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrichment_token_prefers_page_token() {
        let integration = Integration {
            id: IntegrationId::generate(),
            tenant: TenantId::new("ws-1"),
            access_token: "user-token".into(),
            scopes: vec!["leads_retrieval".into()],
            resources: vec![MetaResource {
                resource_id: "form-1".into(),
                kind: MetaResourceKind::LeadForm,
                name: None,
                access_token: Some("page-token".into()),
            }],
            last_synced_at: None,
            created_at: Utc::now(),
        };
        assert_eq!(integration.enrichment_token("form-1"), "page-token");
        assert_eq!(integration.enrichment_token("form-2"), "user-token");
    }
}
