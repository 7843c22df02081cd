//! One logical call, many attempts.
//!
//! [`RequestDispatcher`] normalizes the request, sends it to the provider the
//! rotation state currently points at, classifies the outcome and either
//! returns, or advances the state and tries again. Attempts are strictly
//! sequential. When every allowed attempt fails the rotation state is put back
//! where the call found it.

use super::{
    builder::RequestDispatcherBuilder,
    endpoint::ProviderEndpoint,
    errors::{RotationError, UpstreamError},
    pool::{ProviderPool, Tier},
    protocol::{classify, normalize, Classification},
    rotation::{Advance, AdvanceCause, Position, RotationState, RotationStateMachine},
    state_registry::{RouterSnapshot, RouterStateHandle},
};
use crate::{
    metrics::MetricsCollector,
    types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse},
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};

/// Default bound on a single attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// What the answering provider said.
enum Answer {
    Accepted(JsonRpcResponse),
    Rejected { error: JsonRpcError, response: JsonRpcResponse },
}

struct DispatcherInner {
    pool: ProviderPool,
    machine: Mutex<RotationStateMachine>,
    max_attempts: usize,
    attempt_timeout: Duration,
    state: Arc<RouterStateHandle>,
    metrics: Option<Arc<MetricsCollector>>,
}

/// Routes JSON-RPC calls across a two-tier provider pool.
///
/// Cloning is cheap and clones share the pool, the rotation state and the
/// published snapshot.
#[derive(Clone)]
pub struct RequestDispatcher {
    inner: Arc<DispatcherInner>,
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("pool", &self.inner.pool)
            .field("state", &self.state())
            .field("max_attempts", &self.inner.max_attempts)
            .field("attempt_timeout", &self.inner.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl RequestDispatcher {
    #[must_use]
    pub fn builder() -> RequestDispatcherBuilder {
        RequestDispatcherBuilder::new()
    }

    pub(crate) fn from_parts(
        pool: ProviderPool,
        machine: RotationStateMachine,
        max_attempts: usize,
        attempt_timeout: Duration,
        state: Arc<RouterStateHandle>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                pool,
                machine: Mutex::new(machine),
                max_attempts,
                attempt_timeout,
                state,
                metrics,
            }),
        }
    }

    /// Sends `request` and returns the answering provider's envelope.
    ///
    /// # Errors
    ///
    /// - [`RotationError::Configuration`] if the pool is empty
    /// - [`RotationError::Semantic`] if the provider rejected the request
    /// - [`RotationError::Exhausted`] if every allowed attempt failed
    pub async fn dispatch(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, RotationError> {
        match self.execute(request, None).await? {
            Answer::Accepted(response) => Ok(response),
            Answer::Rejected { error, .. } => Err(RotationError::Semantic(error)),
        }
    }

    /// Like [`dispatch`](Self::dispatch), but gives up once `deadline` passes.
    ///
    /// Each attempt is bounded by whichever comes first, the per-attempt
    /// timeout or the deadline.
    ///
    /// # Errors
    ///
    /// As [`dispatch`](Self::dispatch); a passed deadline surfaces as
    /// [`RotationError::Exhausted`] carrying [`UpstreamError::Timeout`].
    pub async fn dispatch_with_deadline(
        &self,
        request: JsonRpcRequest,
        deadline: Instant,
    ) -> Result<JsonRpcResponse, RotationError> {
        match self.execute(request, Some(deadline)).await? {
            Answer::Accepted(response) => Ok(response),
            Answer::Rejected { error, .. } => Err(RotationError::Semantic(error)),
        }
    }

    /// Sends a JSON payload and resolves with the `result` member only.
    ///
    /// # Errors
    ///
    /// [`RotationError::InvalidPayload`] if `payload` is not a request object,
    /// otherwise as [`dispatch`](Self::dispatch).
    pub async fn request(&self, payload: Value) -> Result<Value, RotationError> {
        let request = Self::parse_payload(payload)?;
        self.dispatch(request).await.map(JsonRpcResponse::into_result)
    }

    /// Sends a JSON payload and returns the full envelope, `error` included.
    ///
    /// A provider-side JSON-RPC error is an `Ok` envelope here; `Err` is
    /// reserved for calls that never got an answer.
    ///
    /// # Errors
    ///
    /// [`RotationError::InvalidPayload`], [`RotationError::Configuration`] or
    /// [`RotationError::Exhausted`].
    pub async fn send(&self, payload: Value) -> Result<JsonRpcResponse, RotationError> {
        let request = Self::parse_payload(payload)?;
        match self.execute(request, None).await? {
            Answer::Accepted(response) | Answer::Rejected { response, .. } => Ok(response),
        }
    }

    /// Runs [`send`](Self::send) on the runtime and hands the outcome to `callback`.
    pub fn send_async<F>(&self, payload: Value, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<JsonRpcResponse, RotationError>) + Send + 'static,
    {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            callback(dispatcher.send(payload).await);
        })
    }

    /// Latest published snapshot of this router.
    #[must_use]
    pub fn stats(&self) -> Arc<RouterSnapshot> {
        self.inner.state.load()
    }

    /// Handle this router publishes its snapshots to.
    #[must_use]
    pub fn state_handle(&self) -> &Arc<RouterStateHandle> {
        &self.inner.state
    }

    #[must_use]
    pub fn state(&self) -> RotationState {
        self.inner.machine.lock().state()
    }

    /// URL of the provider the next attempt would go to.
    #[must_use]
    pub fn current_url(&self) -> Option<String> {
        let position = self.inner.machine.lock().position();
        self.inner.pool.get(position.tier, position.index).map(|endpoint| endpoint.url().to_string())
    }

    /// Returns `true` if the current position names a provider.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.machine.lock().has_provider()
    }

    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.inner.max_attempts
    }

    #[must_use]
    pub fn pool(&self) -> &ProviderPool {
        &self.inner.pool
    }

    /// Returns to the first preferred provider and clears cooldown state.
    pub fn reset(&self) {
        self.transition(RotationStateMachine::reset);
    }

    fn parse_payload(payload: Value) -> Result<JsonRpcRequest, RotationError> {
        JsonRpcRequest::from_value(payload).map_err(|e| RotationError::InvalidPayload(e.to_string()))
    }

    async fn execute(
        &self,
        request: JsonRpcRequest,
        deadline: Option<Instant>,
    ) -> Result<Answer, RotationError> {
        let request = normalize(request);
        let max_attempts = self.inner.max_attempts;

        if max_attempts == 0 {
            let error = RotationError::Configuration("no providers configured".to_string());
            self.record_call(&request.method, Err(&error), 0);
            return Err(error);
        }

        let start = self.state();
        let mut attempts = 0;
        let mut last_error = UpstreamError::Timeout;

        while attempts < max_attempts {
            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        tracing::debug!(attempts, "call deadline passed");
                        last_error = UpstreamError::Timeout;
                        break;
                    }
                    self.inner.attempt_timeout.min(deadline - now)
                }
                None => self.inner.attempt_timeout,
            };

            let is_last = attempts + 1 == max_attempts;
            let (position, endpoint) = match self.select_endpoint(is_last) {
                Ok(selected) => selected,
                Err(error) => {
                    self.record_call(&request.method, Err(&error), attempts);
                    return Err(error);
                }
            };
            attempts += 1;

            tracing::trace!(
                attempt = attempts,
                max_attempts,
                tier = %position.tier,
                index = position.index,
                url = endpoint.url(),
                method = %request.method,
                "sending attempt"
            );

            let started = Instant::now();
            let classification = classify(endpoint.send(&request, timeout).await, &request);
            if let Some(metrics) = &self.inner.metrics {
                metrics.record_attempt(
                    position.tier,
                    endpoint.url(),
                    &request.method,
                    classification.as_str(),
                    started.elapsed(),
                );
            }

            match classification {
                Classification::Success(response) => {
                    tracing::debug!(url = endpoint.url(), attempt = attempts, "attempt succeeded");
                    self.transition(RotationStateMachine::on_success);
                    self.record_call(&request.method, Ok(()), attempts);
                    return Ok(Answer::Accepted(response));
                }
                Classification::Semantic { error, response } => {
                    tracing::debug!(
                        url = endpoint.url(),
                        code = error.code,
                        message = %error.message,
                        "provider rejected request, not retrying"
                    );
                    if let Some(metrics) = &self.inner.metrics {
                        metrics.record_semantic_error(endpoint.url(), error.code);
                    }
                    self.record_call(
                        &request.method,
                        Err(&RotationError::Semantic(error.clone())),
                        attempts,
                    );
                    return Ok(Answer::Rejected { error, response });
                }
                Classification::Transient { error, reason } => {
                    tracing::debug!(
                        url = endpoint.url(),
                        reason = reason.as_str(),
                        error = %error,
                        "transient provider failure, rotating"
                    );
                    if let Some(metrics) = &self.inner.metrics {
                        metrics.record_transient(endpoint.url(), reason, &error);
                    }
                    last_error = error;

                    if self.transition(|machine| machine.advance(AdvanceCause::Failure))
                        == Advance::NoMoreProviders
                    {
                        break;
                    }
                }
            }
        }

        self.transition(|machine| machine.restore(start));
        tracing::warn!(
            attempts,
            method = %request.method,
            error = %last_error,
            "all providers failed, rotation state restored"
        );

        let error = RotationError::Exhausted { attempts, last: last_error };
        self.record_call(&request.method, Err(&error), attempts);
        Err(error)
    }

    /// Picks the provider for the next attempt and charges it one request.
    ///
    /// A provider that goes over its rate limit is skipped without being
    /// blamed, unless this is the last attempt the call is allowed.
    fn select_endpoint(
        &self,
        is_last: bool,
    ) -> Result<(Position, Arc<ProviderEndpoint>), RotationError> {
        let position = self.inner.machine.lock().position();
        let endpoint = self.endpoint_at(position)?;

        if !endpoint.tracker().record_request() || is_last {
            self.publish_current();
            return Ok((position, endpoint));
        }

        tracing::warn!(
            url = endpoint.url(),
            requests = ?endpoint.tracker().counts(),
            "provider over its rate limit, rotating pre-emptively"
        );
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_preemptive_rotation(endpoint.url());
        }

        let position = self.transition(|machine| {
            machine.advance(AdvanceCause::Preemptive);
            machine.position()
        });
        Ok((position, self.endpoint_at(position)?))
    }

    fn endpoint_at(&self, position: Position) -> Result<Arc<ProviderEndpoint>, RotationError> {
        self.inner.pool.get(position.tier, position.index).cloned().ok_or_else(|| {
            RotationError::Configuration(format!(
                "no {} provider at index {}",
                position.tier, position.index
            ))
        })
    }

    /// Applies one state transition under the lock and republishes the snapshot.
    fn transition<R>(&self, apply: impl FnOnce(&mut RotationStateMachine) -> R) -> R {
        let mut machine = self.inner.machine.lock();
        let before = machine.state();
        let result = apply(&mut machine);
        let after = machine.state();

        if before != after {
            tracing::debug!(from = ?before.phase(), to = ?after.phase(), "rotation state changed");
        }
        if before.tier != after.tier {
            if let Some(metrics) = &self.inner.metrics {
                metrics.record_tier_switch(before.tier, after.tier);
            }
            match after.tier {
                Tier::Preferred => {
                    tracing::info!(url = self.url_at(after.position()), "back on preferred tier");
                }
                Tier::Fallback => tracing::info!(
                    url = self.url_at(after.position()),
                    cooldown_calls = after.fallback_calls_remaining,
                    "switched to fallback tier"
                ),
            }
        }

        self.inner.state.publish(RouterSnapshot::new(after, self.inner.pool.stats()));
        result
    }

    fn publish_current(&self) {
        let machine = self.inner.machine.lock();
        self.inner.state.publish(RouterSnapshot::new(machine.state(), self.inner.pool.stats()));
    }

    fn url_at(&self, position: Position) -> &str {
        self.inner.pool.get(position.tier, position.index).map_or("", |endpoint| endpoint.url())
    }

    fn record_call(&self, method: &str, result: Result<(), &RotationError>, attempts: usize) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_call(method, result, attempts);
        }
    }
}
