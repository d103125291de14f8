//! The destination client: one HTTP call with auth, deadline and capture.

use std::time::{Duration, Instant};

use base64::Engine as _;
use hmac::{Hmac, Mac};
use metahub_core::{AuthScheme, DEFAULT_TIMEOUT_MS, Destination, HttpMethod};
use sha2::Sha256;
use tracing::{debug, instrument};

type HmacSha256 = Hmac<Sha256>;

/// Response bodies are captured up to this many bytes.
pub const MAX_RESPONSE_BYTES: usize = 2_000;

const USER_AGENT: &str = concat!("metahub/", env!("CARGO_PKG_VERSION"));

/// Captured outcome of one delivery call. Never an error: timeouts and
/// network failures are data, recorded on the attempt row.
#[derive(Debug, Clone)]
pub struct AttemptResult {
    /// HTTP status code; absent on network error or timeout.
    pub status_code: Option<u16>,
    /// First 2000 bytes of the response body.
    pub response_body: Option<String>,
    /// Network or timeout error message.
    pub error_message: Option<String>,
    /// Wall-clock duration of the call in milliseconds.
    pub duration_ms: u64,
}

impl AttemptResult {
    /// Whether the call got an HTTP 2xx.
    pub fn is_success(&self) -> bool {
        self.status_code.is_some_and(|s| (200..300).contains(&s))
    }
}

/// HTTP client for customer destinations.
///
/// One `reqwest::Client` is shared across all destinations; per-call
/// deadlines come from each destination's `timeout_ms`.
pub struct DestinationClient {
    client: reqwest::Client,
}

impl DestinationClient {
    /// Create a client with the shared connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a destination client over an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Compute the HMAC-SHA256 signature of the request body, hex-encoded.
    fn compute_hmac(secret: &str, body: &[u8]) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(body);
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Apply the destination's auth scheme to the request builder. HMAC
    /// signs the exact serialized body bytes that are sent.
    fn apply_auth(
        destination: &Destination,
        mut request: reqwest::RequestBuilder,
        body_bytes: &[u8],
    ) -> reqwest::RequestBuilder {
        match &destination.auth {
            AuthScheme::None => {}
            AuthScheme::Bearer { token } => {
                request = request.header("Authorization", format!("Bearer {token}"));
            }
            AuthScheme::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                request = request.header("Authorization", format!("Basic {encoded}"));
            }
            AuthScheme::ApiKey { header_name, api_key } => {
                request = request.header(header_name, api_key);
            }
            AuthScheme::Hmac { secret } => {
                if let Some(signature) = Self::compute_hmac(secret, body_bytes) {
                    request = request.header("X-Hub-Signature-256", format!("sha256={signature}"));
                }
            }
        }
        request
    }

    /// Make one delivery call.
    ///
    /// The deadline is the destination's `timeout_ms` (10 s when zero). On
    /// timeout the result carries no status code and an error message of
    /// the form `Timeout after <ms>ms`.
    #[instrument(skip(self, destination, body), fields(url = %destination.url, attempt = attempt_number))]
    pub async fn call(
        &self,
        destination: &Destination,
        event_id: &str,
        attempt_number: u32,
        body: &serde_json::Value,
    ) -> AttemptResult {
        let timeout_ms = if destination.timeout_ms == 0 {
            DEFAULT_TIMEOUT_MS
        } else {
            destination.timeout_ms
        };
        let body_bytes = serde_json::to_vec(body).unwrap_or_default();

        let mut request = match destination.method {
            HttpMethod::Post => self.client.post(&destination.url),
            HttpMethod::Put => self.client.put(&destination.url),
            HttpMethod::Patch => self.client.patch(&destination.url),
        };
        request = request
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .header("X-MetaHub-Event-Id", event_id)
            .header("X-MetaHub-Attempt", attempt_number.to_string());
        for (key, value) in &destination.headers {
            request = request.header(key, value);
        }
        request = Self::apply_auth(destination, request, &body_bytes);
        request = request.body(body_bytes);

        debug!(method = destination.method.as_str(), timeout_ms, "dispatching delivery");

        let started = Instant::now();
        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let bytes = response.bytes().await.unwrap_or_default();
            Ok::<_, reqwest::Error>((status, bytes))
        })
        .await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(Ok((status, bytes))) => AttemptResult {
                status_code: Some(status),
                response_body: Some(truncate_body(&bytes)),
                error_message: None,
                duration_ms,
            },
            Ok(Err(e)) => AttemptResult {
                status_code: None,
                response_body: None,
                error_message: Some(format!("Request failed: {e}")),
                duration_ms,
            },
            Err(_) => AttemptResult {
                status_code: None,
                response_body: None,
                error_message: Some(format!("Timeout after {timeout_ms}ms")),
                duration_ms,
            },
        }
    }
}

impl Default for DestinationClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate a response body to [`MAX_RESPONSE_BYTES`], lossily decoding
/// whatever encoding the endpoint used.
fn truncate_body(bytes: &[u8]) -> String {
    let slice = &bytes[..bytes.len().min(MAX_RESPONSE_BYTES)];
    String::from_utf8_lossy(slice).into_owned()
}

#[cfg(test)]
mod tests {
    use metahub_core::AuthScheme;

    use super::*;
    use crate::testing::MockEndpoint;

    fn destination(url: &str) -> Destination {
        Destination::new("ws-1", "test", url).with_timeout_ms(5_000)
    }

    #[tokio::test]
    async fn captures_status_and_body() {
        let endpoint = MockEndpoint::start().await;
        let dest = destination(&endpoint.url);
        let server = tokio::spawn(async move { endpoint.respond_once(202, r#"{"queued":true}"#).await });

        let client = DestinationClient::new();
        let result = client.call(&dest, "evt-1", 1, &serde_json::json!({"k": "v"})).await;
        let request = server.await.unwrap();

        assert_eq!(result.status_code, Some(202));
        assert!(result.is_success());
        assert_eq!(result.response_body.as_deref(), Some(r#"{"queued":true}"#));
        assert!(result.error_message.is_none());

        let request_text = String::from_utf8_lossy(&request).to_lowercase();
        assert!(request_text.starts_with("post /hook"));
        assert!(request_text.contains("x-metahub-event-id: evt-1"));
        assert!(request_text.contains("x-metahub-attempt: 1"));
        assert!(request_text.contains("content-type: application/json"));
    }

    #[tokio::test]
    async fn server_error_is_not_success() {
        let endpoint = MockEndpoint::start().await;
        let dest = destination(&endpoint.url);
        let server = tokio::spawn(async move { endpoint.respond_once(500, "oops").await });

        let result = DestinationClient::new()
            .call(&dest, "evt-1", 1, &serde_json::json!({}))
            .await;
        server.await.unwrap();

        assert_eq!(result.status_code, Some(500));
        assert!(!result.is_success());
        assert_eq!(result.response_body.as_deref(), Some("oops"));
    }

    #[tokio::test]
    async fn timeout_is_recorded_with_message() {
        let endpoint = MockEndpoint::start().await;
        let dest = destination(&endpoint.url).with_timeout_ms(1_000);
        let server = tokio::spawn(async move { endpoint.accept_and_stall().await });

        let result = DestinationClient::new()
            .call(&dest, "evt-1", 1, &serde_json::json!({}))
            .await;
        server.abort();

        assert_eq!(result.status_code, None);
        assert!(result.error_message.as_deref().unwrap().starts_with("Timeout after 1000ms"));
        assert!(result.duration_ms >= 1_000);
    }

    #[tokio::test]
    async fn connection_refused_is_captured() {
        // Bind and immediately drop to get a dead port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dest = destination(&format!("http://127.0.0.1:{port}/hook"));
        let result = DestinationClient::new()
            .call(&dest, "evt-1", 1, &serde_json::json!({}))
            .await;
        assert_eq!(result.status_code, None);
        assert!(result.error_message.is_some());
    }

    #[tokio::test]
    async fn bearer_and_custom_headers_are_sent() {
        let endpoint = MockEndpoint::start().await;
        let dest = destination(&endpoint.url)
            .with_auth(AuthScheme::Bearer { token: "tok-123".into() })
            .with_header("X-Custom", "val");
        let server = tokio::spawn(async move { endpoint.respond_once(200, "{}").await });

        DestinationClient::new().call(&dest, "evt-1", 1, &serde_json::json!({})).await;
        let request = String::from_utf8_lossy(&server.await.unwrap()).to_lowercase();

        assert!(request.contains("authorization: bearer tok-123"));
        assert!(request.contains("x-custom: val"));
    }

    #[tokio::test]
    async fn basic_auth_is_base64() {
        let endpoint = MockEndpoint::start().await;
        let dest = destination(&endpoint.url).with_auth(AuthScheme::Basic {
            username: "user".into(),
            password: "pass".into(),
        });
        let server = tokio::spawn(async move { endpoint.respond_once(200, "{}").await });

        DestinationClient::new().call(&dest, "evt-1", 1, &serde_json::json!({})).await;
        let request = String::from_utf8_lossy(&server.await.unwrap()).to_lowercase();

        // base64("user:pass")
        assert!(request.contains("authorization: basic dxnlcjpwyxnz"));
    }

    #[tokio::test]
    async fn hmac_signature_matches_body() {
        let endpoint = MockEndpoint::start().await;
        let dest = destination(&endpoint.url).with_auth(AuthScheme::Hmac {
            secret: "webhook-secret".into(),
        });
        let server = tokio::spawn(async move { endpoint.respond_once(200, "{}").await });

        let body = serde_json::json!({"event": "signed"});
        DestinationClient::new().call(&dest, "evt-1", 1, &body).await;
        let request = String::from_utf8_lossy(&server.await.unwrap()).into_owned();

        let expected =
            DestinationClient::compute_hmac("webhook-secret", &serde_json::to_vec(&body).unwrap())
                .unwrap();
        assert!(request.contains(&format!("sha256={expected}")));
    }

    #[test]
    fn body_truncation_is_bounded() {
        let long = vec![b'a'; 5_000];
        let truncated = truncate_body(&long);
        assert_eq!(truncated.len(), MAX_RESPONSE_BYTES);
    }

    #[test]
    fn hmac_is_deterministic_hex() {
        let one = DestinationClient::compute_hmac("s", b"data").unwrap();
        let two = DestinationClient::compute_hmac("s", b"data").unwrap();
        assert_eq!(one, two);
        assert_eq!(one.len(), 64);
        assert!(one.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
