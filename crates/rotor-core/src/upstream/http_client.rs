use super::{endpoint::RpcTransport, errors::UpstreamError};
use crate::types::{JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Maximum number of body bytes kept in an [`UpstreamError::HttpError`].
const MAX_ERROR_BODY_LEN: usize = 256;

/// Connection and timeout settings shared by every HTTP provider.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Hard ceiling for a whole request in milliseconds; per-attempt timeouts are usually tighter
    pub request_timeout_ms: u64,
    /// Seconds an idle pooled connection is kept open
    pub pool_idle_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 45_000,
            pool_idle_timeout_secs: 30,
            pool_max_idle_per_host: 100,
            user_agent: concat!("rotor/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Thin wrapper over a pooled `reqwest` client.
///
/// Cloning is cheap; clones share the connection pool. The client never
/// retries on its own: a failed attempt goes back to the dispatcher, which
/// decides whether to rotate.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, UpstreamError> {
        Self::with_config(&HttpClientConfig::default())
    }

    /// Creates a new HTTP client with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_config(config: &HttpClientConfig) -> Result<Self, UpstreamError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(config.user_agent.as_str())
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                UpstreamError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self { client })
    }

    /// Sanitizes network errors to prevent information disclosure.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "connection timed out".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else if error.is_redirect() {
            "unexpected redirect".to_string()
        } else {
            "network error".to_string()
        }
    }

    fn truncate_body(raw: String) -> String {
        if raw.len() <= MAX_ERROR_BODY_LEN {
            return raw;
        }
        let mut end = MAX_ERROR_BODY_LEN;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &raw[..end])
    }

    /// Posts a JSON body and returns the raw response bytes.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::Timeout`] if the request times out
    /// - [`UpstreamError::HttpError`] for non-success HTTP status codes
    /// - [`UpstreamError::ConnectionFailed`] for other network failures
    pub async fn post_json(
        &self,
        url: &str,
        body: bytes::Bytes,
    ) -> Result<bytes::Bytes, UpstreamError> {
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::trace!(url = url, error = %e, "http request error");
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::ConnectionFailed(Self::sanitize_network_error(&e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let raw_text = response.text().await.unwrap_or_default();
            tracing::trace!(url = url, status = status.as_u16(), "http request failed");
            return Err(UpstreamError::HttpError(status.as_u16(), Self::truncate_body(raw_text)));
        }

        response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Network(e)
            }
        })
    }
}

/// [`RpcTransport`] that posts JSON-RPC envelopes to one HTTP(S) URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    url: String,
}

impl HttpTransport {
    #[must_use]
    pub fn new(client: HttpClient, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, UpstreamError> {
        let body = serde_json::to_vec(request).map_err(|e| {
            UpstreamError::InvalidRequest(format!("failed to encode request: {e}"))
        })?;

        let response_bytes = self.client.post_json(&self.url, bytes::Bytes::from(body)).await?;

        serde_json::from_slice::<JsonRpcResponse>(&response_bytes).map_err(|e| {
            tracing::debug!(url = %self.url, error = %e, "provider returned invalid json-rpc body");
            UpstreamError::InvalidResponse(format!("Invalid JSON: {e}"))
        })
    }
}
