//! End-to-end failover over real HTTP against mockito providers.

use crate::mock_infrastructure::RpcMockBuilder;
use rotor_core::upstream::{RequestDispatcher, RotationError, StateRegistry, UpstreamError};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};

fn router(preferred: &[String], fallback: &[String]) -> RequestDispatcher {
    RequestDispatcher::builder()
        .preferred(preferred.iter().cloned())
        .fallback(fallback.iter().cloned())
        .registry(Arc::new(StateRegistry::new()))
        .attempt_timeout(Duration::from_secs(5))
        .build()
        .expect("valid router")
}

/// Healthy second provider that must answer exactly once.
async fn healthy_backup() -> RpcMockBuilder {
    let mut backup = RpcMockBuilder::new().await;
    backup.mock_method_times("eth_blockNumber", &json!("0x2a"), 1);
    backup
}

async fn assert_rotates_past(failing: RpcMockBuilder) {
    let backup = healthy_backup().await;
    let dispatcher = router(&[failing.url(), backup.url()], &[]);

    let result = dispatcher.request(json!({"method": "eth_blockNumber"})).await.unwrap();
    assert_eq!(result, json!("0x2a"));
    assert_eq!(dispatcher.current_url(), Some(backup.url()));
    backup.assert_all().await;
    assert!(failing.verify_all_called().await);
}

#[tokio::test]
async fn test_http_429_rotates() {
    let mut failing = RpcMockBuilder::new().await;
    failing.mock_rate_limited();
    assert_rotates_past(failing).await;
}

#[tokio::test]
async fn test_http_500_rotates() {
    let mut failing = RpcMockBuilder::new().await;
    failing.mock_server_error();
    assert_rotates_past(failing).await;
}

#[tokio::test]
async fn test_non_json_body_rotates() {
    let mut failing = RpcMockBuilder::new().await;
    failing.mock_invalid_json();
    assert_rotates_past(failing).await;
}

#[tokio::test]
async fn test_limit_exceeded_envelope_rotates() {
    let mut failing = RpcMockBuilder::new().await;
    failing.mock_rpc_error("eth_blockNumber", -32005, "daily request count exceeded");
    assert_rotates_past(failing).await;
}

#[tokio::test]
async fn test_rpc_rejection_is_not_retried() {
    let mut rejecting = RpcMockBuilder::new().await;
    rejecting.mock_rpc_error("eth_foo", -32601, "the method eth_foo does not exist");
    let mut backup = RpcMockBuilder::new().await;
    backup.mock_method_times("eth_foo", &json!("0x0"), 0);

    let dispatcher = router(&[rejecting.url(), backup.url()], &[]);
    let error = dispatcher.request(json!({"method": "eth_foo", "params": []})).await.unwrap_err();

    match error {
        RotationError::Semantic(rpc) => {
            assert_eq!(rpc.code, -32601);
            assert!(rpc.message.contains("does not exist"));
        }
        other => panic!("expected a semantic error, got {other:?}"),
    }
    assert_eq!(dispatcher.current_url(), Some(rejecting.url()));
    backup.assert_all().await;
}

#[tokio::test]
async fn test_empty_eth_call_over_http_rotates() {
    let mut empty = RpcMockBuilder::new().await;
    empty.mock_eth_call("0x");
    let mut backup = RpcMockBuilder::new().await;
    backup.mock_eth_call("0x0000000000000000000000000000000000000000000000000000000000000001");

    let dispatcher = router(&[empty.url()], &[backup.url()]);
    let result = dispatcher
        .request(json!({"method": "eth_call", "params": [{"to": "0x0", "data": "0x"}, "latest"]}))
        .await
        .unwrap();

    assert!(result.as_str().is_some_and(|data| data.ends_with('1')));
    assert!(dispatcher.state().in_cooldown());
}

#[tokio::test]
async fn test_unreachable_provider_rotates() {
    let backup = healthy_backup().await;
    let dispatcher = router(&["http://127.0.0.1:1".to_string()], &[backup.url()]);

    let result = dispatcher.request(json!({"method": "eth_blockNumber"})).await.unwrap();
    assert_eq!(result, json!("0x2a"));
    backup.assert_all().await;
}

#[tokio::test]
async fn test_all_http_providers_down() {
    let mut first = RpcMockBuilder::new().await;
    first.mock_server_error();
    let mut second = RpcMockBuilder::new().await;
    second.mock_rate_limited();

    let dispatcher = router(&[first.url(), second.url()], &[]);
    let error = dispatcher.request(json!({"method": "eth_blockNumber"})).await.unwrap_err();

    match error {
        RotationError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(last, UpstreamError::HttpError(429, _)));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(dispatcher.current_url(), Some(first.url()));
}

#[tokio::test]
async fn test_send_keeps_null_result_member() {
    let mut provider = RpcMockBuilder::new().await;
    provider.mock_method("eth_getTransactionReceipt", &Value::Null);

    let dispatcher = router(&[provider.url()], &[]);
    let response = dispatcher
        .send(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getTransactionReceipt",
            "params": ["0x0000000000000000000000000000000000000000000000000000000000000000"]
        }))
        .await
        .unwrap();

    let envelope = serde_json::to_value(&response).unwrap();
    assert_eq!(envelope, json!({"jsonrpc": "2.0", "id": 1, "result": null}));

    let result = dispatcher.request(json!({"method": "eth_getTransactionReceipt"})).await.unwrap();
    assert_eq!(result, Value::Null);
}
