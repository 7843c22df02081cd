//! # Metrics
//!
//! Prometheus counters and histograms for rotation decisions.
//!
//! Every attempt, classification, pre-emptive rotation, tier switch and
//! exhausted call is recorded through the `metrics` facade. The Prometheus
//! recorder is installed once per process and rendered on demand.
//!
//! Endpoint URLs and method names are used as labels. URLs come from a fixed
//! pool, so interning them into `&'static str` is a bounded leak. Methods
//! outside a known set are recorded as `"other"`.

use crate::upstream::{
    errors::{RotationError, UpstreamError},
    pool::Tier,
    protocol::TransientReason,
};
use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{
    borrow::Cow,
    sync::OnceLock,
    time::Duration,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static ENDPOINT_LABEL_POOL: OnceLock<DashMap<String, &'static str>> = OnceLock::new();

#[inline]
fn endpoint_to_static(url: &str) -> Cow<'static, str> {
    let pool = ENDPOINT_LABEL_POOL.get_or_init(DashMap::new);

    if let Some(interned) = pool.get(url) {
        return Cow::Borrowed(*interned);
    }

    let owned = url.to_string();
    let leaked: &'static str = Box::leak(owned.clone().into_boxed_str());
    pool.insert(owned, leaked);
    Cow::Borrowed(leaked)
}

/// Method label; unknown methods collapse to `"other"`.
#[inline]
fn method_to_static(method: &str) -> &'static str {
    match method {
        "net_version" => "net_version",
        "eth_blockNumber" => "eth_blockNumber",
        "eth_chainId" => "eth_chainId",
        "eth_gasPrice" => "eth_gasPrice",
        "eth_getBalance" => "eth_getBalance",
        "eth_getBlockByNumber" => "eth_getBlockByNumber",
        "eth_getLogs" => "eth_getLogs",
        "eth_getTransactionReceipt" => "eth_getTransactionReceipt",
        "eth_call" => "eth_call",
        "eth_estimateGas" => "eth_estimateGas",
        "eth_getTransactionCount" => "eth_getTransactionCount",
        "eth_sendRawTransaction" => "eth_sendRawTransaction",
        _ => "other",
    }
}

/// Stable label for error types.
pub trait MetricsState {
    fn as_metric_str(&self) -> &'static str;
}

impl MetricsState for UpstreamError {
    fn as_metric_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::HttpError(_, _) => "http_error",
            Self::RpcError(_, _) => "rpc_error",
            Self::Network(_) => "network_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::EmptyCallResult => "empty_call_result",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl MetricsState for RotationError {
    fn as_metric_str(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Semantic(_) => "semantic",
            Self::Exhausted { .. } => "exhausted",
            Self::InvalidPayload(_) => "invalid_payload",
        }
    }
}

fn try_init_prometheus_recorder(
) -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match try_init_prometheus_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "failed to install primary prometheus recorder, attempting fallback"
                );
                let recorder = PrometheusBuilder::new().build_recorder();
                tracing::warn!(
                    "using fallback prometheus recorder (install error: {e}), metrics may not be globally visible"
                );
                recorder.handle()
            }
        })
        .clone()
}

/// Records rotation metrics and renders them in Prometheus text format.
#[derive(Clone)]
pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish_non_exhaustive()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { prometheus_handle: init_prometheus_recorder() }
    }

    /// Record one attempt against one endpoint.
    pub fn record_attempt(
        &self,
        tier: Tier,
        endpoint: &str,
        method: &str,
        outcome: &'static str,
        latency: Duration,
    ) {
        let endpoint = endpoint_to_static(endpoint);
        let method = method_to_static(method);

        counter!(
            "rotor_attempts_total",
            "tier" => tier.as_str(),
            "endpoint" => endpoint.clone(),
            "method" => method,
            "outcome" => outcome
        )
        .increment(1);
        histogram!("rotor_attempt_duration_seconds", "endpoint" => endpoint, "method" => method)
            .record(latency.as_secs_f64());
    }

    /// Record why an attempt was judged transient.
    pub fn record_transient(&self, endpoint: &str, reason: TransientReason, error: &UpstreamError) {
        counter!(
            "rotor_transient_errors_total",
            "endpoint" => endpoint_to_static(endpoint),
            "reason" => reason.as_str(),
            "error_type" => error.as_metric_str()
        )
        .increment(1);
    }

    /// Record a JSON-RPC error passed straight back to the caller.
    pub fn record_semantic_error(&self, endpoint: &str, code: i32) {
        counter!(
            "rotor_semantic_errors_total",
            "endpoint" => endpoint_to_static(endpoint),
            "code" => code.to_string()
        )
        .increment(1);
    }

    /// Record a skip caused by an endpoint's own rate limit.
    pub fn record_preemptive_rotation(&self, endpoint: &str) {
        counter!("rotor_preemptive_rotations_total", "endpoint" => endpoint_to_static(endpoint))
            .increment(1);
    }

    pub fn record_tier_switch(&self, from: Tier, to: Tier) {
        counter!("rotor_tier_switches_total", "from" => from.as_str(), "to" => to.as_str())
            .increment(1);
        gauge!("rotor_current_tier_fallback").set(if to == Tier::Fallback { 1.0 } else { 0.0 });
    }

    /// Record the final outcome of a dispatched call.
    pub fn record_call(&self, method: &str, result: Result<(), &RotationError>, attempts: usize) {
        let outcome = match result {
            Ok(()) => "success",
            Err(error) => error.as_metric_str(),
        };
        let method = method_to_static(method);

        counter!("rotor_calls_total", "method" => method, "outcome" => outcome)
            .increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!("rotor_call_attempts", "method" => method).record(attempts as f64);
    }

    /// Get Prometheus metrics in text format
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus_handle.render()
    }
}
