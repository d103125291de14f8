//! HMAC-signed OAuth state and consent URL construction.
//!
//! The `state` parameter round-trips through Meta's consent screen, so it
//! must be tamper-evident: `base64(payload) + "." + hex(hmac_sha256(secret,
//! payload))` over `{"wid":…, "uid":…, "ts":epoch_ms}`. Verification
//! rejects bad signatures and anything older than ten minutes.

use base64::Engine as _;
use hmac::{Hmac, Mac};
use metahub_core::{TenantId, UserId};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::MetaError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a state payload, ten minutes.
pub const STATE_MAX_AGE_MS: i64 = 600_000;

const AUTHORIZE_URL: &str = "https://www.facebook.com/v19.0/dialog/oauth";
const OAUTH_SCOPES: &str =
    "whatsapp_business_management,whatsapp_business_messaging,leads_retrieval,pages_show_list,ads_read";

/// The signed content of the `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePayload {
    /// Workspace the OAuth dance belongs to.
    pub wid: TenantId,
    /// User who initiated it.
    pub uid: UserId,
    /// Issue time, unix epoch milliseconds.
    pub ts: i64,
}

/// Signer/verifier for OAuth state plus consent-URL construction.
pub struct OauthState {
    app_id: String,
    secret: String,
    redirect_uri: String,
}

impl OauthState {
    /// Create a signer. `redirect_uri` is the absolute callback URL
    /// registered with the Meta app.
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            secret: secret.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Sign a state payload issued now.
    pub fn sign(&self, wid: &TenantId, uid: &UserId) -> String {
        self.sign_at(wid, uid, chrono::Utc::now().timestamp_millis())
    }

    /// Sign a state payload with an explicit issue time.
    pub fn sign_at(&self, wid: &TenantId, uid: &UserId, ts: i64) -> String {
        let payload = StatePayload {
            wid: wid.clone(),
            uid: uid.clone(),
            ts,
        };
        let json = serde_json::to_vec(&payload).expect("state payload serializes");
        let signature = self.mac(&json);
        format!(
            "{}.{}",
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&json),
            hex::encode(signature)
        )
    }

    /// Verify a state parameter: signature first (constant-time), then the
    /// ten-minute freshness window.
    pub fn verify(&self, state: &str) -> Result<StatePayload, MetaError> {
        let (encoded, signature_hex) = state
            .split_once('.')
            .ok_or_else(|| MetaError::InvalidState("missing signature separator".to_owned()))?;
        let json = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| MetaError::InvalidState(format!("bad base64: {e}")))?;
        let provided = hex::decode(signature_hex)
            .map_err(|e| MetaError::InvalidState(format!("bad signature hex: {e}")))?;

        let expected = self.mac(&json);
        if expected.ct_eq(&provided).unwrap_u8() != 1 {
            return Err(MetaError::InvalidState("signature mismatch".to_owned()));
        }

        let payload: StatePayload = serde_json::from_slice(&json)
            .map_err(|e| MetaError::InvalidState(format!("bad payload: {e}")))?;
        let age = chrono::Utc::now().timestamp_millis() - payload.ts;
        if age > STATE_MAX_AGE_MS {
            return Err(MetaError::StateExpired);
        }
        Ok(payload)
    }

    /// The consent URL for the given signed state.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{AUTHORIZE_URL}?client_id={}&redirect_uri={}&state={}&scope={}",
            utf8_percent_encode(&self.app_id, NON_ALPHANUMERIC),
            utf8_percent_encode(&self.redirect_uri, NON_ALPHANUMERIC),
            utf8_percent_encode(state, NON_ALPHANUMERIC),
            utf8_percent_encode(OAUTH_SCOPES, NON_ALPHANUMERIC),
        )
    }

    fn mac(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("hmac accepts any key size");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> OauthState {
        OauthState::new("app-1", "app-secret", "https://hub.example.com/oauth/meta/callback")
    }

    #[test]
    fn state_round_trips() {
        let signer = signer();
        let state = signer.sign(&TenantId::new("ws-1"), &UserId::new("u-1"));
        let payload = signer.verify(&state).unwrap();
        assert_eq!(payload.wid, TenantId::new("ws-1"));
        assert_eq!(payload.uid, UserId::new("u-1"));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signer = signer();
        let state = signer.sign(&TenantId::new("ws-1"), &UserId::new("u-1"));
        let (_, signature) = state.split_once('.').unwrap();
        let forged_payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(br#"{"wid":"ws-2","uid":"u-1","ts":9999999999999}"#);
        let forged = format!("{forged_payload}.{signature}");
        assert!(matches!(signer.verify(&forged), Err(MetaError::InvalidState(_))));
    }

    #[test]
    fn different_secret_is_rejected() {
        let state = signer().sign(&TenantId::new("ws-1"), &UserId::new("u-1"));
        let other = OauthState::new("app-1", "other-secret", "https://hub.example.com/cb");
        assert!(matches!(other.verify(&state), Err(MetaError::InvalidState(_))));
    }

    #[test]
    fn stale_state_is_rejected() {
        let signer = signer();
        let stale_ts = chrono::Utc::now().timestamp_millis() - STATE_MAX_AGE_MS - 1_000;
        let state = signer.sign_at(&TenantId::new("ws-1"), &UserId::new("u-1"), stale_ts);
        assert!(matches!(signer.verify(&state), Err(MetaError::StateExpired)));
    }

    #[test]
    fn garbage_states_are_rejected() {
        let signer = signer();
        assert!(signer.verify("no-separator").is_err());
        assert!(signer.verify("notb64!!.abcd").is_err());
        assert!(signer.verify("YWJj.nothex!").is_err());
    }

    #[test]
    fn authorize_url_carries_the_state() {
        let signer = signer();
        let url = signer.authorize_url("abc.def");
        assert!(url.starts_with("https://www.facebook.com/v19.0/dialog/oauth?client_id=app%2D1"));
        assert!(url.contains("state=abc%2Edef"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fhub%2Eexample%2Ecom"));
    }
}
