//! Pre-emptive rotation driven by per-endpoint request limits.

use crate::mock_infrastructure::{ScriptedTransport, TestRouter};
use rotor_core::{
    metrics::MetricsCollector,
    types::JsonRpcRequest,
    upstream::{EndpointConfig, RequestDispatcher, RpcTransport, StateRegistry, Tier},
};
use serde_json::json;
use std::sync::Arc;

fn chain_id() -> JsonRpcRequest {
    JsonRpcRequest::call("eth_chainId", None)
}

#[tokio::test]
async fn test_rate_limited_provider_is_skipped() {
    let router = TestRouter::builder()
        .preferred(EndpointConfig::new("mock://a").per_minute(1), ScriptedTransport::healthy())
        .preferred("mock://b", ScriptedTransport::healthy())
        .build();

    router.dispatcher.dispatch(chain_id()).await.unwrap();
    assert_eq!(router.calls("mock://a"), 1);
    assert_eq!(router.calls("mock://b"), 0);

    router.dispatcher.dispatch(chain_id()).await.unwrap();
    assert_eq!(router.calls("mock://a"), 1, "second call must not reach the limited provider");
    assert_eq!(router.calls("mock://b"), 1);
    assert_eq!(router.dispatcher.current_url().as_deref(), Some("mock://b"));

    // The skipped request still counts against the limited provider.
    let snapshot = router.snapshot();
    assert_eq!(snapshot.endpoint("mock://a").unwrap().requests.minute, 2);
    assert_eq!(snapshot.endpoint("mock://b").unwrap().requests.minute, 1);
}

#[tokio::test]
async fn test_limit_is_ignored_on_last_attempt() {
    let router = TestRouter::builder()
        .preferred(EndpointConfig::new("mock://only").per_minute(1), ScriptedTransport::healthy())
        .build();

    for _ in 0..3 {
        router.dispatcher.dispatch(chain_id()).await.unwrap();
    }
    assert_eq!(router.calls("mock://only"), 3);
}

#[tokio::test]
async fn test_zero_limit_means_unlimited() {
    let router = TestRouter::builder()
        .preferred(EndpointConfig::new("mock://a").per_minute(0), ScriptedTransport::healthy())
        .preferred("mock://b", ScriptedTransport::healthy())
        .build();

    for _ in 0..5 {
        router.dispatcher.dispatch(chain_id()).await.unwrap();
    }
    assert_eq!(router.calls("mock://a"), 5);
    assert_eq!(router.calls("mock://b"), 0);
}

#[tokio::test]
async fn test_preemptive_skip_in_cooldown_does_not_count_as_failure() {
    let router = TestRouter::builder()
        .preferred("mock://p0", ScriptedTransport::failing())
        .fallback(EndpointConfig::new("mock://f0").per_minute(1), ScriptedTransport::healthy())
        .fallback("mock://f1", ScriptedTransport::healthy())
        .build();

    router.dispatcher.dispatch(chain_id()).await.unwrap();
    assert_eq!(router.calls("mock://f0"), 1);

    router.dispatcher.dispatch(chain_id()).await.unwrap();
    let state = router.state();
    assert_eq!(state.tier, Tier::Fallback);
    assert_eq!(state.fallback_index, 1);
    assert_eq!(state.consecutive_fallback_failures, 0);
    assert_eq!(router.calls("mock://f1"), 1);
}

#[tokio::test]
async fn test_preemptive_rotation_is_counted_in_metrics() {
    let metrics = Arc::new(MetricsCollector::new());
    let dispatcher = RequestDispatcher::builder()
        .preferred([
            EndpointConfig::new("mock://metrics-a").per_minute(1),
            EndpointConfig::new("mock://metrics-b"),
        ])
        .registry(Arc::new(StateRegistry::new()))
        .metrics(Arc::clone(&metrics))
        .transport_factory(|_: &EndpointConfig| {
            let transport: Arc<dyn RpcTransport> = ScriptedTransport::healthy();
            Ok(transport)
        })
        .build()
        .unwrap();

    dispatcher.request(json!({"method": "eth_chainId"})).await.unwrap();
    dispatcher.request(json!({"method": "eth_chainId"})).await.unwrap();

    let rendered = metrics.render();
    assert!(rendered.contains("rotor_preemptive_rotations_total"), "got:\n{rendered}");
    assert!(rendered.contains("mock://metrics-a"));
    assert!(rendered.contains("rotor_calls_total"));
}
