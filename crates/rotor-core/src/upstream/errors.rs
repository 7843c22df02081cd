use crate::{types::JsonRpcError, upstream::protocol::transport_error_reason};
use thiserror::Error;

/// Errors that can occur while talking to a single provider endpoint.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Request exceeded the per-attempt timeout or the caller's deadline.
    #[error("Request timeout")]
    Timeout,

    /// Failed to establish a connection to the provider.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// HTTP-level error occurred (non-2xx status code).
    ///
    /// First field is the HTTP status code, second is the (truncated) body.
    #[error("HTTP error {0}: {1}")]
    HttpError(u16, String),

    /// JSON-RPC error that was recognised as an infrastructure failure.
    ///
    /// First field is the RPC error code, second is the error message.
    #[error("RPC error {0}: {1}")]
    RpcError(i32, String),

    /// Network-level error from the underlying HTTP client.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be parsed as a JSON-RPC envelope.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// `eth_call` answered with an empty result.
    #[error("Empty eth_call result")]
    EmptyCallResult,

    /// Request could not be encoded before being sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    /// Returns `true` if the call should move on to another provider.
    ///
    /// Agrees with [`classify`](crate::upstream::protocol::classify): structured
    /// failures are always transient, while HTTP 4xx bodies and RPC errors are
    /// transient only for throttle codes or known throttle and flaky-node text.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        transport_error_reason(self).is_some()
    }
}

/// Errors returned from a dispatched call.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RotationError {
    /// The router cannot make any attempt, typically because no providers are configured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The provider answered with a JSON-RPC error that says nothing about its health.
    ///
    /// Surfaced after exactly one attempt; rotation state is untouched.
    #[error("RPC error: {0}")]
    Semantic(JsonRpcError),

    /// Every allowed attempt failed with a transient error.
    ///
    /// The router's position has been restored to where this call started.
    #[error("All providers failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: usize, last: UpstreamError },

    /// The payload handed to the router is not a JSON-RPC request object.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl RotationError {
    /// Returns the JSON-RPC error if this is a semantic failure.
    #[must_use]
    pub fn rpc_error(&self) -> Option<&JsonRpcError> {
        match self {
            Self::Semantic(error) => Some(error),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}
