//! Startup configuration from the environment.
//!
//! The configuration surface is a closed set of variables; anything
//! missing that the server cannot run without is a fatal startup error and
//! the process exits non-zero.

use metahub_core::HubError;

/// Environment variable names, the complete set.
pub const ENV_META_APP_ID: &str = "META_APP_ID";
pub const ENV_META_APP_SECRET: &str = "META_APP_SECRET";
pub const ENV_META_WEBHOOK_VERIFY_TOKEN: &str = "META_WEBHOOK_VERIFY_TOKEN";
pub const ENV_APP_URL: &str = "APP_URL";
pub const ENV_DB_URL: &str = "DB_URL";

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Meta OAuth client id.
    pub meta_app_id: String,
    /// Meta OAuth client secret; also signs the OAuth state parameter.
    pub meta_app_secret: String,
    /// Shared secret for the webhook subscription challenge.
    pub webhook_verify_token: String,
    /// Base URL of the hub, used for OAuth redirects.
    pub app_url: String,
    /// Storage DSN. Absent means the in-memory dev backend.
    pub db_url: Option<String>,
}

impl HubConfig {
    /// Read the closed variable set from the process environment.
    pub fn from_env() -> Result<Self, HubError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through a lookup function (tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HubError> {
        let require = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| HubError::Fatal(format!("missing required environment variable {name}")))
        };
        Ok(Self {
            meta_app_id: require(ENV_META_APP_ID)?,
            meta_app_secret: require(ENV_META_APP_SECRET)?,
            webhook_verify_token: require(ENV_META_WEBHOOK_VERIFY_TOKEN)?,
            app_url: require(ENV_APP_URL)?.trim_end_matches('/').to_owned(),
            db_url: lookup(ENV_DB_URL).filter(|v| !v.is_empty()),
        })
    }

    /// The OAuth callback URL registered with the Meta app.
    #[must_use]
    pub fn oauth_redirect_uri(&self) -> String {
        format!("{}/oauth/meta/callback", self.app_url)
    }
}
