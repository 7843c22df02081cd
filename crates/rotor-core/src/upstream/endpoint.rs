use super::{
    errors::UpstreamError,
    rate_tracker::{RateLimits, RateTracker, WindowCounts},
};
use crate::types::{JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// Static description of one provider: where it lives and how hard it may be used.
///
/// Limits of `None` or `0` are unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_per_minute: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_per_hour: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_per_day: Option<u64>,
}

impl EndpointConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), limit_per_minute: None, limit_per_hour: None, limit_per_day: None }
    }

    #[must_use]
    pub fn per_minute(mut self, limit: u64) -> Self {
        self.limit_per_minute = Some(limit);
        self
    }

    #[must_use]
    pub fn per_hour(mut self, limit: u64) -> Self {
        self.limit_per_hour = Some(limit);
        self
    }

    #[must_use]
    pub fn per_day(mut self, limit: u64) -> Self {
        self.limit_per_day = Some(limit);
        self
    }

    #[must_use]
    pub fn limits(&self) -> RateLimits {
        RateLimits::new(self.limit_per_minute, self.limit_per_hour, self.limit_per_day)
    }
}

impl From<&str> for EndpointConfig {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for EndpointConfig {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

/// Sends one JSON-RPC request to one provider.
///
/// Implementations return `Ok` for any well-formed JSON-RPC envelope, including
/// envelopes that carry an `error`; deciding what that error means is the
/// dispatcher's job. Transport failures map to [`UpstreamError`].
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, UpstreamError>;
}

/// Observable state of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStats {
    pub url: String,
    pub requests: WindowCounts,
    pub limits: RateLimits,
}

/// A provider in the pool: its configuration, its transport and its rate tracker.
pub struct ProviderEndpoint {
    config: EndpointConfig,
    transport: Arc<dyn RpcTransport>,
    tracker: RateTracker,
}

impl ProviderEndpoint {
    #[must_use]
    pub fn new(config: EndpointConfig, transport: Arc<dyn RpcTransport>) -> Self {
        let tracker = RateTracker::new(config.limits());
        Self { config, transport, tracker }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    #[must_use]
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    #[must_use]
    pub fn tracker(&self) -> &RateTracker {
        &self.tracker
    }

    /// Sends `request` through this endpoint's transport, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Timeout`] if the transport does not answer in time,
    /// otherwise whatever the transport reports.
    pub async fn send(
        &self,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, UpstreamError> {
        if let Ok(outcome) = tokio::time::timeout(timeout, self.transport.send(request)).await {
            outcome
        } else {
            tracing::debug!(
                url = %self.config.url,
                timeout = ?timeout,
                "provider attempt timed out"
            );
            Err(UpstreamError::Timeout)
        }
    }

    #[must_use]
    pub fn stats(&self) -> EndpointStats {
        EndpointStats {
            url: self.config.url.clone(),
            requests: self.tracker.counts(),
            limits: self.tracker.limits(),
        }
    }
}

impl std::fmt::Debug for ProviderEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEndpoint")
            .field("config", &self.config)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}
