//! Request normalization and response classification.
//!
//! Classification prefers structured signals (HTTP status, RPC code, transport
//! error kind). Provider error text is only consulted through
//! [`heuristic_transient_reason`], which keeps every phrase match in one place.

use crate::{
    types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION_COW},
    upstream::errors::UpstreamError,
};
use serde_json::{Map, Value};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// HTTP status used by providers to signal throttling.
pub const HTTP_TOO_MANY_REQUESTS: i64 = 429;

/// JSON-RPC "limit exceeded" error code.
pub const RPC_LIMIT_EXCEEDED: i64 = -32005;

const THROTTLE_PHRASES: &[&str] =
    &["rate limit", "too many requests", "throttle", "exceeded your limit"];

// Compatibility carry-over: "execution reverted" and "returned values aren't valid"
// can be genuine contract answers, but public nodes also emit them when they lag.
const FLAKY_NODE_PHRASES: &[&str] = &[
    "invalid json rpc response",
    "execution reverted",
    "returned values aren't valid",
    "did it run out of gas",
    "dialing to the given tcp address",
    "timed out",
];

static LAST_REQUEST_ID: AtomicU64 = AtomicU64::new(0);

/// Why an outcome was judged to be an infrastructure failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientReason {
    /// HTTP 429, RPC -32005 or a throttle phrase.
    RateLimited,
    /// Error text known to come from lagging or overloaded public nodes.
    FlakyNode,
    Timeout,
    Connection,
    /// HTTP 5xx.
    ServerError,
    /// Body was not a JSON-RPC envelope.
    InvalidResponse,
    /// `eth_call` returned `0x` or nothing.
    EmptyCallResult,
}

impl TransientReason {
    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::FlakyNode => "flaky_node",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::EmptyCallResult => "empty_call_result",
        }
    }
}

/// Result of classifying one attempt.
#[derive(Debug)]
pub enum Classification {
    /// Usable answer; return it to the caller.
    Success(JsonRpcResponse),
    /// The provider rejected the request itself. Never retried.
    Semantic { error: JsonRpcError, response: JsonRpcResponse },
    /// Infrastructure failure; rotate and retry.
    Transient { error: UpstreamError, reason: TransientReason },
}

impl Classification {
    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Semantic { .. } => "semantic",
            Self::Transient { .. } => "transient",
        }
    }
}

/// Returns a request id that is unique within this process.
///
/// Ids are derived from the wall clock in milliseconds scaled by 1000, then
/// forced strictly above the previously issued id. They stay below 2^53 so
/// JavaScript clients can round-trip them.
pub fn fresh_id() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX / 1000))
        .unwrap_or_default();
    let candidate = millis.saturating_mul(1000);

    let next = |last: u64| candidate.max(last.saturating_add(1));
    let previous =
        match LAST_REQUEST_ID.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
            Some(next(last))
        }) {
            Ok(previous) | Err(previous) => previous,
        };
    next(previous)
}

/// Completes a request into a JSON-RPC 2.0 envelope.
///
/// A request that already names a `jsonrpc` version is returned unchanged.
/// Otherwise the version is injected, an absent id is replaced by
/// [`fresh_id`], and any members other than `method` and `params` are dropped.
#[must_use]
pub fn normalize(request: JsonRpcRequest) -> JsonRpcRequest {
    if request.jsonrpc.is_some() {
        return request;
    }

    JsonRpcRequest {
        jsonrpc: Some(JSONRPC_VERSION_COW),
        id: Some(request.id.unwrap_or_else(|| Value::from(fresh_id()))),
        method: request.method,
        params: request.params,
        extra: Map::new(),
    }
}

/// Matches provider error text against known transient phrasings.
///
/// Matching is case-insensitive. Throttle phrases win over flaky-node phrases.
#[must_use]
pub fn heuristic_transient_reason(message: &str) -> Option<TransientReason> {
    let message = message.to_lowercase();
    if THROTTLE_PHRASES.iter().any(|phrase| message.contains(phrase)) {
        Some(TransientReason::RateLimited)
    } else if FLAKY_NODE_PHRASES.iter().any(|phrase| message.contains(phrase)) {
        Some(TransientReason::FlakyNode)
    } else {
        None
    }
}

fn is_rate_limit_code(code: i64) -> bool {
    code == HTTP_TOO_MANY_REQUESTS || code == RPC_LIMIT_EXCEEDED
}

fn is_empty_call_result(result: Option<&Value>) -> bool {
    match result {
        None | Some(Value::Null) => true,
        Some(Value::String(data)) => data.eq_ignore_ascii_case("0x"),
        Some(_) => false,
    }
}

/// Classifies the outcome of sending `request` to one provider.
#[must_use]
pub fn classify(
    outcome: Result<JsonRpcResponse, UpstreamError>,
    request: &JsonRpcRequest,
) -> Classification {
    match outcome {
        Ok(response) => classify_response(response, request),
        Err(error) => classify_transport_error(error, request),
    }
}

fn classify_response(response: JsonRpcResponse, request: &JsonRpcRequest) -> Classification {
    if let Some(error) = response.error.clone() {
        return match rpc_error_reason(error.code, &error.message) {
            Some(reason) => Classification::Transient {
                error: UpstreamError::RpcError(error.code, error.message),
                reason,
            },
            None => Classification::Semantic { error, response },
        };
    }

    if request.is_eth_call() && is_empty_call_result(response.result.as_ref()) {
        return Classification::Transient {
            error: UpstreamError::EmptyCallResult,
            reason: TransientReason::EmptyCallResult,
        };
    }

    Classification::Success(response)
}

fn rpc_error_reason(code: i32, message: &str) -> Option<TransientReason> {
    if is_rate_limit_code(i64::from(code)) {
        Some(TransientReason::RateLimited)
    } else {
        heuristic_transient_reason(message)
    }
}

/// Why a transport-level error counts as transient, or `None` if the provider
/// rejected the request itself.
///
/// This is the single predicate behind both [`classify`] and
/// [`UpstreamError::is_transient`].
#[must_use]
pub fn transport_error_reason(error: &UpstreamError) -> Option<TransientReason> {
    match error {
        UpstreamError::Timeout => Some(TransientReason::Timeout),
        UpstreamError::ConnectionFailed(_) | UpstreamError::Network(_) => {
            Some(TransientReason::Connection)
        }
        UpstreamError::InvalidResponse(_) => Some(TransientReason::InvalidResponse),
        UpstreamError::EmptyCallResult => Some(TransientReason::EmptyCallResult),
        UpstreamError::HttpError(429, _) => Some(TransientReason::RateLimited),
        UpstreamError::HttpError(status, _) if (500..=599).contains(status) => {
            Some(TransientReason::ServerError)
        }
        UpstreamError::HttpError(_, body) => heuristic_transient_reason(body),
        UpstreamError::RpcError(code, message) => rpc_error_reason(*code, message),
        UpstreamError::InvalidRequest(_) => None,
    }
}

fn classify_transport_error(error: UpstreamError, request: &JsonRpcRequest) -> Classification {
    if let Some(reason) = transport_error_reason(&error) {
        return Classification::Transient { error, reason };
    }

    let (code, message) = match error {
        UpstreamError::HttpError(status, body) => (i32::from(status), body),
        UpstreamError::RpcError(code, message) => (code, message),
        other => (-32600, other.to_string()),
    };
    let id = request.id.clone().unwrap_or(Value::Null);
    let response = JsonRpcResponse::error(code, message.clone(), id);
    Classification::Semantic { error: JsonRpcError { code, message, data: None }, response }
}
