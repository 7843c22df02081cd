//! JSON-RPC 2.0 envelope types.
//!
//! Requests are deliberately loose: callers may hand the router a bare
//! `{method, params}` object and let [`crate::upstream::protocol::normalize`]
//! fill in `jsonrpc` and `id`. Unknown request members are kept in `extra` so a
//! complete envelope passes through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Method whose empty result is treated as a flaky node rather than an answer.
pub const ETH_CALL: &str = "eth_call";

/// JSON-RPC request as supplied by a caller.
///
/// `jsonrpc` and `id` are optional on input. A `null` id deserializes to `None`
/// and is therefore treated as absent.
///
/// # Example
///
/// ```
/// use rotor_core::types::JsonRpcRequest;
/// use serde_json::json;
///
/// let request = JsonRpcRequest::call("eth_blockNumber", None);
/// assert!(request.jsonrpc.is_none());
/// assert!(request.id.is_none());
///
/// let request = JsonRpcRequest::new("eth_getBalance", Some(json!(["0x0", "latest"])), json!(7));
/// assert_eq!(request.id, Some(json!(7)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<Cow<'static, str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JsonRpcRequest {
    /// Creates a complete JSON-RPC 2.0 request.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION_COW),
            id: Some(id),
            method: method.into(),
            params,
            extra: Map::new(),
        }
    }

    /// Creates a bare call without `jsonrpc` or `id`; both are filled in on dispatch.
    #[must_use]
    pub fn call(method: impl Into<String>, params: Option<Value>) -> Self {
        Self { jsonrpc: None, id: None, method: method.into(), params, extra: Map::new() }
    }

    /// Parses a request from an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object with a string `method`.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[must_use]
    pub fn is_eth_call(&self) -> bool {
        self.method == ETH_CALL
    }
}

/// JSON-RPC 2.0 response envelope.
///
/// A response carries either a `result` or an `error`. `result` is `None`
/// only when the member is missing; `"result": null` reads as `Some(Null)`
/// and is written back out unchanged. Members beyond the standard four are
/// kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: Cow<'static, str>,
    #[serde(default)]
    pub id: Value,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_version() -> Cow<'static, str> {
    JSONRPC_VERSION_COW
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(result: Value, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            id,
            result: Some(result),
            error: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn error(code: i32, message: impl Into<String>, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            id,
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
            extra: Map::new(),
        }
    }

    /// Consumes the envelope and returns the `result`, or `null` when absent.
    #[must_use]
    pub fn into_result(self) -> Value {
        self.result.unwrap_or(Value::Null)
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}
