use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_string {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier string.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a fresh random (UUID v4) identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_string!(
    /// Workspace identifier. The tenant is the isolation boundary that owns
    /// every other entity in the hub.
    TenantId
);
id_string!(
    /// Identifier of a user known to the external auth collaborator.
    UserId
);
id_string!(
    /// Identifier of a customer-owned HTTP endpoint.
    DestinationId
);
id_string!(
    /// Identifier of a reusable payload transformation.
    MappingId
);
id_string!(
    /// Identifier of a source-to-destination binding.
    RouteId
);
id_string!(
    /// Identifier of a delivery event.
    EventId
);
id_string!(
    /// Identifier of an alert rule.
    AlertRuleId
);
id_string!(
    /// Identifier of one firing of an alert rule.
    AlertId
);
id_string!(
    /// Identifier of a stored Meta OAuth integration.
    IntegrationId
);

/// The kind of inbound source an event originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Whatsapp,
    Forms,
    Ads,
    Webhook,
    Any,
}

impl SourceType {
    /// Returns the source type as a snake_case string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Forms => "forms",
            Self::Ads => "ads",
            Self::Webhook => "webhook",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = EventId::generate();
        let b = EventId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn id_serializes_transparently() {
        let id = TenantId::new("ws-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ws-1\"");
        let back: TenantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn source_type_snake_case() {
        let json = serde_json::to_string(&SourceType::Whatsapp).unwrap();
        assert_eq!(json, "\"whatsapp\"");
        assert_eq!(SourceType::Forms.as_str(), "forms");
    }
}
