use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HubError;
use crate::types::{DestinationId, TenantId};

/// Minimum accepted request timeout in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 1_000;
/// Maximum accepted request timeout in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 30_000;
/// Timeout applied when a destination does not set one.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// HTTP method used when forwarding to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
}

impl HttpMethod {
    /// Returns the method name as an uppercase string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
        }
    }
}

/// Authentication applied to outbound delivery requests.
///
/// Credentials live inside the variant; `Debug` redacts them so they cannot
/// leak through logs or error chains.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthScheme {
    /// No authentication header.
    None,

    /// HTTP Bearer token (`Authorization: Bearer <token>`).
    Bearer { token: String },

    /// HTTP Basic authentication (`Authorization: Basic <base64>`).
    Basic { username: String, password: String },

    /// API key sent in a custom header.
    ApiKey { header_name: String, api_key: String },

    /// HMAC-SHA256 signature of the request body, sent as
    /// `X-Hub-Signature-256: sha256=<hex>`.
    Hmac { secret: String },
}

impl std::fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"[REDACTED]").finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::ApiKey { header_name, .. } => f
                .debug_struct("ApiKey")
                .field("header_name", header_name)
                .field("api_key", &"[REDACTED]")
                .finish(),
            Self::Hmac { .. } => f.debug_struct("Hmac").field("secret", &"[REDACTED]").finish(),
        }
    }
}

/// A customer-controlled HTTP endpoint events are forwarded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Destination {
    /// Unique destination identifier.
    pub id: DestinationId,

    /// Tenant that owns this destination.
    pub tenant: TenantId,

    /// Human-readable name shown in the dashboard.
    pub name: String,

    /// Target URL. Must parse as an absolute URL.
    pub url: String,

    /// HTTP method (defaults to `POST`).
    pub method: HttpMethod,

    /// User-supplied static headers included in every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Authentication applied to outbound requests.
    pub auth: AuthScheme,

    /// Request timeout in milliseconds, within [1000, 30000].
    pub timeout_ms: u64,

    /// Inactive destinations are skipped by the resolver and cancel
    /// in-flight events at claim time.
    pub is_active: bool,

    /// Soft-delete marker. Deleted destinations behave as absent.
    pub deleted_at: Option<DateTime<Utc>>,

    /// Timestamp when the destination was created.
    pub created_at: DateTime<Utc>,
}

impl Destination {
    /// Create an active destination with defaults (`POST`, 10 s timeout, no
    /// auth). Generates a UUID-v4 id and sets `created_at` to now.
    #[must_use]
    pub fn new(tenant: impl Into<TenantId>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: DestinationId::generate(),
            tenant: tenant.into(),
            name: name.into(),
            url: url.into(),
            method: HttpMethod::Post,
            headers: HashMap::new(),
            auth: AuthScheme::None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            is_active: true,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    /// Set the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the authentication scheme.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    /// Add a static header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the request timeout in milliseconds.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Whether the destination is usable for delivery (active and not
    /// soft-deleted).
    pub fn is_usable(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }

    /// Validate the caller-supplied contract: parseable absolute URL and a
    /// timeout within [1000, 30000] ms.
    pub fn validate(&self) -> Result<(), HubError> {
        url::Url::parse(&self.url)
            .map_err(|e| HubError::Validation(format!("invalid destination url: {e}")))?;
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(HubError::Validation(format!(
                "timeout_ms must be within [{MIN_TIMEOUT_MS}, {MAX_TIMEOUT_MS}], got {}",
                self.timeout_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_destination_defaults() {
        let dest = Destination::new("ws-1", "crm", "https://example.com/hook");
        assert_eq!(dest.method, HttpMethod::Post);
        assert_eq!(dest.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(dest.is_usable());
        assert!(dest.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_url() {
        let dest = Destination::new("ws-1", "bad", "not a url");
        assert!(dest.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_timeout() {
        let dest = Destination::new("ws-1", "slow", "https://example.com").with_timeout_ms(45_000);
        assert!(dest.validate().is_err());
        let dest = Destination::new("ws-1", "fast", "https://example.com").with_timeout_ms(500);
        assert!(dest.validate().is_err());
    }

    #[test]
    fn soft_deleted_is_not_usable() {
        let mut dest = Destination::new("ws-1", "gone", "https://example.com");
        dest.deleted_at = Some(Utc::now());
        assert!(!dest.is_usable());
    }

    #[test]
    fn auth_debug_redacts_secrets() {
        let token = "secret-token-value";
        let auth = AuthScheme::Bearer { token: token.into() };
        let debug = format!("{auth:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(token));

        let secret = "hmac-secret-value";
        let auth = AuthScheme::Hmac { secret: secret.into() };
        let debug = format!("{auth:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(secret));
    }

    #[test]
    fn auth_serde_roundtrip() {
        let auth = AuthScheme::ApiKey {
            header_name: "X-Api-Key".into(),
            api_key: "k".into(),
        };
        let json = serde_json::to_string(&auth).unwrap();
        assert!(json.contains("\"type\":\"api_key\""));
        let back: AuthScheme = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, AuthScheme::ApiKey { .. }));
    }

    #[test]
    fn method_uppercase_serde() {
        assert_eq!(serde_json::to_string(&HttpMethod::Patch).unwrap(), "\"PATCH\"");
        assert_eq!(HttpMethod::Put.as_str(), "PUT");
    }
}
