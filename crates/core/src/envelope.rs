use serde::{Deserialize, Serialize};

use crate::route::WhatsappEventType;

/// Envelope object value Meta sends for WhatsApp Business webhooks.
pub const OBJECT_WHATSAPP: &str = "whatsapp_business_account";
/// Envelope object value Meta sends for Page webhooks (lead-gen lives here).
pub const OBJECT_PAGE: &str = "page";
/// Change field marking a lead-gen payload.
pub const FIELD_LEADGEN: &str = "leadgen";

/// Inbound Meta webhook envelope.
///
/// Parsed defensively: every field is optional so that a malformed body can
/// still be acknowledged with an "ignored" response instead of a parse
/// failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MetaEnvelope {
    /// Subscribed object kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// Per-asset entries.
    #[serde(default)]
    pub entry: Vec<MetaEntry>,
}

impl MetaEnvelope {
    /// Whether the envelope carries anything worth routing.
    pub fn is_processable(&self) -> bool {
        self.object.is_some() && !self.entry.is_empty()
    }
}

/// One entry of a Meta envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MetaEntry {
    /// Asset identifier (WABA id or page id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Changes bundled into this entry.
    #[serde(default)]
    pub changes: Vec<MetaChange>,
}

/// One change within an entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MetaChange {
    /// Changed field, e.g. `messages` or `leadgen`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Channel-specific payload.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub value: serde_json::Value,
}

impl MetaChange {
    /// WhatsApp phone-number id this change belongs to.
    pub fn phone_number_id(&self) -> Option<&str> {
        self.value
            .get("metadata")
            .and_then(|m| m.get("phone_number_id"))
            .and_then(serde_json::Value::as_str)
    }

    /// Lead form id of a lead-gen change.
    pub fn form_id(&self) -> Option<&str> {
        self.value.get("form_id").and_then(serde_json::Value::as_str)
    }

    /// Lead id of a lead-gen change, used for enrichment and as the
    /// source event id.
    pub fn leadgen_id(&self) -> Option<&str> {
        self.value.get("leadgen_id").and_then(serde_json::Value::as_str)
    }

    /// WhatsApp message id (wamid) of the first message or status in the
    /// change, used as the source event id.
    pub fn wamid(&self) -> Option<&str> {
        let first_id = |key: &str| {
            self.value
                .get(key)
                .and_then(serde_json::Value::as_array)
                .and_then(|items| items.first())
                .and_then(|item| item.get("id"))
                .and_then(serde_json::Value::as_str)
        };
        first_id("messages").or_else(|| first_id("statuses"))
    }

    /// Classify the WhatsApp event kind of this change, when recognizable.
    ///
    /// A change carrying `messages` is a message event; a change carrying
    /// `statuses` is classified by the first status value.
    pub fn whatsapp_event_type(&self) -> Option<WhatsappEventType> {
        if self
            .value
            .get("messages")
            .and_then(serde_json::Value::as_array)
            .is_some_and(|m| !m.is_empty())
        {
            return Some(WhatsappEventType::Messages);
        }
        let status = self
            .value
            .get("statuses")
            .and_then(serde_json::Value::as_array)
            .and_then(|items| items.first())
            .and_then(|s| s.get("status"))
            .and_then(serde_json::Value::as_str)?;
        match status {
            "sent" => Some(WhatsappEventType::StatusSent),
            "delivered" => Some(WhatsappEventType::StatusDelivered),
            "read" => Some(WhatsappEventType::StatusRead),
            "failed" => Some(WhatsappEventType::StatusFailed),
            _ => None,
        }
    }
}
