//! Minimal Meta Graph API client.
//!
//! The core only talks to Graph for two things: exchanging an OAuth code
//! for a long-lived token, and fetching the full record of a lead before
//! forwarding (enrichment). Everything else about the provider lives
//! outside the core.

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::MetaError;

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0";

/// Result of an OAuth code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The granted access token.
    pub access_token: String,
    /// Token lifetime in seconds, when the provider reports one.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// HTTP client for the Graph API.
pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    /// Create a client against the production Graph endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client against an explicit base URL (tests, proxies).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Exchange an OAuth authorization code for an access token.
    #[instrument(skip(self, app_secret, code))]
    pub async fn exchange_code(
        &self,
        app_id: &str,
        app_secret: &str,
        redirect_uri: &str,
        code: &str,
    ) -> Result<TokenResponse, MetaError> {
        let response = self
            .client
            .get(format!("{}/oauth/access_token", self.base_url))
            .query(&[
                ("client_id", app_id),
                ("client_secret", app_secret),
                ("redirect_uri", redirect_uri),
                ("code", code),
            ])
            .send()
            .await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(MetaError::Upstream { status, body });
        }
        Ok(response.json().await?)
    }

    /// Fetch the full lead record for enrichment.
    ///
    /// Callers treat failures as non-fatal: the raw change payload is
    /// forwarded when the fetch does not succeed.
    #[instrument(skip(self, access_token))]
    pub async fn fetch_lead(
        &self,
        lead_id: &str,
        access_token: &str,
    ) -> Result<serde_json::Value, MetaError> {
        debug!("fetching lead for enrichment");
        let response = self
            .client
            .get(format!("{}/{lead_id}", self.base_url))
            .query(&[("access_token", access_token)])
            .send()
            .await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(MetaError::Upstream { status, body });
        }
        Ok(response.json().await?)
    }
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    async fn one_shot_server(status: u16, body: &'static str) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = stream.read(&mut buf).await.unwrap();
            buf.truncate(n);
            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            buf
        });
        (format!("http://127.0.0.1:{port}"), handle)
    }

    #[tokio::test]
    async fn fetch_lead_returns_json() {
        let (base, server) =
            one_shot_server(200, r#"{"id":"L1","field_data":[{"name":"email","values":["a@b.c"]}]}"#)
                .await;
        let client = GraphClient::with_base_url(base);
        let lead = client.fetch_lead("L1", "token").await.unwrap();
        let request = String::from_utf8_lossy(&server.await.unwrap()).into_owned();

        assert_eq!(lead["id"], "L1");
        assert!(request.starts_with("GET /L1?access_token=token"));
    }

    #[tokio::test]
    async fn fetch_lead_non_2xx_is_upstream_error() {
        let (base, server) = one_shot_server(403, r#"{"error":"denied"}"#).await;
        let client = GraphClient::with_base_url(base);
        let err = client.fetch_lead("L1", "bad-token").await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, MetaError::Upstream { status: 403, .. }));
    }

    #[tokio::test]
    async fn exchange_code_parses_token() {
        let (base, server) =
            one_shot_server(200, r#"{"access_token":"tok","expires_in":5184000}"#).await;
        let client = GraphClient::with_base_url(base);
        let token = client
            .exchange_code("app", "secret", "https://cb", "code-1")
            .await
            .unwrap();
        server.await.unwrap();
        assert_eq!(token.access_token, "tok");
        assert_eq!(token.expires_in, Some(5_184_000));
    }
}
