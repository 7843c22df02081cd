//! Builder pattern for constructing a [`RequestDispatcher`].

use super::{
    dispatcher::{RequestDispatcher, DEFAULT_ATTEMPT_TIMEOUT},
    endpoint::{EndpointConfig, ProviderEndpoint, RpcTransport},
    errors::UpstreamError,
    http_client::{HttpClient, HttpClientConfig, HttpTransport},
    pool::{ProviderPool, MAX_FALLBACK_ATTEMPTS},
    rotation::{RotationPolicy, RotationStateMachine},
    state_registry::{RouterSnapshot, RouterStateHandle, StateRegistry},
};
use crate::{config::RotorConfig, metrics::MetricsCollector};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

/// Creates the transport for one endpoint.
pub type TransportFactory =
    Arc<dyn Fn(&EndpointConfig) -> Result<Arc<dyn RpcTransport>, UpstreamError> + Send + Sync>;

/// Errors that can occur during dispatcher construction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuilderError {
    /// Starting index does not name a preferred provider
    #[error("Starting preferred index {index} is out of range for {len} preferred provider(s)")]
    InvalidStartingIndex { index: usize, len: usize },

    /// Cooldown length or failure threshold is zero
    #[error("Invalid rotation policy: {0}")]
    InvalidPolicy(String),

    /// A transport could not be created
    #[error("Failed to create transport for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: UpstreamError,
    },
}

/// Builder for a [`RequestDispatcher`].
///
/// Endpoints are HTTP by default; tests and embedders swap in their own
/// transports with [`transport_factory`](Self::transport_factory).
///
/// # Examples
///
/// ```no_run
/// # use rotor_core::upstream::{RequestDispatcherBuilder, EndpointConfig, StateRegistry};
/// # use std::sync::Arc;
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Arc::new(StateRegistry::new());
///
/// let dispatcher = RequestDispatcherBuilder::new()
///     .preferred([
///         EndpointConfig::new("https://polygon.drpc.org/").per_minute(100),
///         EndpointConfig::new("https://polygon-rpc.com"),
///     ])
///     .fallback(["https://polygon.api.onfinality.io/public"])
///     .registry(registry)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RequestDispatcherBuilder {
    preferred: Vec<EndpointConfig>,
    fallback: Vec<EndpointConfig>,
    policy: RotationPolicy,
    max_fallback_attempts: usize,
    attempt_timeout: Duration,
    starting_preferred_index: Option<usize>,
    registry: Option<Arc<StateRegistry>>,
    transport_factory: Option<TransportFactory>,
    http_client_config: HttpClientConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RequestDispatcherBuilder {
    /// Creates a new builder with default settings and no providers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            preferred: Vec::new(),
            fallback: Vec::new(),
            policy: RotationPolicy::default(),
            max_fallback_attempts: MAX_FALLBACK_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            starting_preferred_index: None,
            registry: None,
            transport_factory: None,
            http_client_config: HttpClientConfig::default(),
            metrics: None,
        }
    }

    /// Starts from a loaded [`RotorConfig`]: providers, policy and attempt bounds.
    #[must_use]
    pub fn from_config(config: &RotorConfig) -> Self {
        let rotation = &config.rotation;
        Self::new()
            .preferred(config.providers.preferred_configs())
            .fallback(config.providers.fallback_configs())
            .policy(rotation.policy())
            .max_fallback_attempts(rotation.max_fallback_attempts)
            .attempt_timeout(rotation.attempt_timeout())
            .starting_preferred_index(rotation.starting_preferred_index)
    }

    #[must_use]
    pub fn preferred<I, E>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<EndpointConfig>,
    {
        self.preferred = endpoints.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn fallback<I, E>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<EndpointConfig>,
    {
        self.fallback = endpoints.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: RotationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the cap on fallback providers tried within one call (default: 4).
    #[must_use]
    pub fn max_fallback_attempts(mut self, attempts: usize) -> Self {
        self.max_fallback_attempts = attempts;
        self
    }

    /// Sets the bound on a single attempt (default: 30s).
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    #[must_use]
    pub fn starting_preferred_index(mut self, index: usize) -> Self {
        self.starting_preferred_index = Some(index);
        self
    }

    /// Registers the router's snapshots with `registry`.
    #[must_use]
    pub fn registry(mut self, registry: Arc<StateRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn transport_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&EndpointConfig) -> Result<Arc<dyn RpcTransport>, UpstreamError>
            + Send
            + Sync
            + 'static,
    {
        self.transport_factory = Some(Arc::new(factory));
        self
    }

    /// Settings for the default HTTP transport. Ignored with a custom factory.
    #[must_use]
    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.http_client_config = config;
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the dispatcher.
    ///
    /// An empty pool is accepted; every call on it fails with
    /// [`RotationError::Configuration`](super::errors::RotationError::Configuration).
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::InvalidPolicy`] for a zero cooldown or failure threshold,
    /// [`BuilderError::InvalidStartingIndex`] if the starting index is out of range
    /// for a non-empty preferred tier,
    /// and [`BuilderError::Transport`] if a transport cannot be created.
    pub fn build(self) -> Result<RequestDispatcher, BuilderError> {
        if self.policy.fallback_cooldown_calls == 0 {
            return Err(BuilderError::InvalidPolicy(
                "fallback cooldown calls must be greater than 0".to_string(),
            ));
        }
        if self.policy.max_consecutive_failures == 0 {
            return Err(BuilderError::InvalidPolicy(
                "max consecutive failures must be greater than 0".to_string(),
            ));
        }

        // Without preferred providers the router starts in fallback cooldown
        // and the starting index has nothing to name.
        let starting_index = self.starting_preferred_index.unwrap_or(0);
        if !self.preferred.is_empty() && starting_index >= self.preferred.len() {
            return Err(BuilderError::InvalidStartingIndex {
                index: starting_index,
                len: self.preferred.len(),
            });
        }

        let factory = match self.transport_factory {
            Some(factory) => factory,
            None => Self::http_factory(&self.http_client_config)?,
        };
        let preferred = Self::endpoints(&self.preferred, &factory)?;
        let fallback = Self::endpoints(&self.fallback, &factory)?;

        let pool = ProviderPool::new(preferred, fallback);
        let machine = RotationStateMachine::starting_at(
            self.policy,
            self.preferred.len(),
            self.fallback.len(),
            starting_index,
        );
        let max_attempts = pool.max_attempts(self.max_fallback_attempts);

        let initial = RouterSnapshot::new(machine.state(), pool.stats());
        let state = match &self.registry {
            Some(registry) => registry.register(initial),
            None => Arc::new(RouterStateHandle::new(0, initial)),
        };

        tracing::info!(
            preferred = self.preferred.len(),
            fallback = self.fallback.len(),
            max_attempts,
            attempt_timeout = ?self.attempt_timeout,
            "rotation router ready"
        );

        Ok(RequestDispatcher::from_parts(
            pool,
            machine,
            max_attempts,
            self.attempt_timeout,
            state,
            self.metrics,
        ))
    }

    fn http_factory(config: &HttpClientConfig) -> Result<TransportFactory, BuilderError> {
        let client = HttpClient::with_config(config)
            .map_err(|source| BuilderError::Transport { url: String::new(), source })?;

        Ok(Arc::new(move |endpoint: &EndpointConfig| {
            let transport: Arc<dyn RpcTransport> =
                Arc::new(HttpTransport::new(client.clone(), endpoint.url.clone()));
            Ok(transport)
        }))
    }

    fn endpoints(
        configs: &[EndpointConfig],
        factory: &TransportFactory,
    ) -> Result<Vec<Arc<ProviderEndpoint>>, BuilderError> {
        configs
            .iter()
            .map(|config| {
                let transport = factory(config).map_err(|source| BuilderError::Transport {
                    url: config.url.clone(),
                    source,
                })?;
                Ok(Arc::new(ProviderEndpoint::new(config.clone(), transport)))
            })
            .collect()
    }
}

impl Default for RequestDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
