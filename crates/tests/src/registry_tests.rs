//! Published router snapshots and their JSON shape.

use crate::mock_infrastructure::{ScriptedTransport, TestRouter};
use rotor_core::{
    metrics::MetricsCollector,
    types::JsonRpcRequest,
    upstream::{EndpointConfig, RequestDispatcher, RpcTransport, StateRegistry, Tier},
};
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::test]
async fn test_routers_share_one_registry() {
    let registry = Arc::new(StateRegistry::new());
    let first = TestRouter::builder()
        .preferred("mock://one", ScriptedTransport::healthy())
        .registry(Arc::clone(&registry))
        .build();
    let second = TestRouter::builder()
        .preferred("mock://two-a", ScriptedTransport::failing())
        .preferred("mock://two-b", ScriptedTransport::healthy())
        .registry(Arc::clone(&registry))
        .build();

    assert_eq!(registry.len(), 2);
    assert_eq!(first.dispatcher.state_handle().id(), 0);
    assert_eq!(second.dispatcher.state_handle().id(), 1);

    second.dispatcher.dispatch(JsonRpcRequest::call("eth_chainId", None)).await.unwrap();

    let snapshots = registry.snapshots();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].current_provider.as_deref(), Some("mock://one"));
    assert_eq!(snapshots[1].current_provider.as_deref(), Some("mock://two-b"));
    assert_eq!(snapshots[1].rotation.preferred_index, 1);
}

#[tokio::test]
async fn test_snapshot_serializes_for_diagnostics() {
    let router = TestRouter::builder()
        .preferred(EndpointConfig::new("mock://p0").per_minute(10), ScriptedTransport::failing())
        .fallback("mock://f0", ScriptedTransport::healthy())
        .build();

    router.dispatcher.request(json!({"method": "eth_blockNumber"})).await.unwrap();

    let value = serde_json::to_value(&*router.snapshot()).unwrap();
    assert_eq!(value["current_provider"], "mock://f0");
    assert_eq!(value["tier"], "fallback");
    assert_eq!(value["preferred_index"], 0);
    assert_eq!(value["fallback_index"], 0);
    assert_eq!(value["forced_to_fallback"], true);
    assert_eq!(value["fallback_calls_remaining"], 49);
    assert_eq!(value["phase"]["phase"], "fallback_cooldown");
    assert_eq!(value["phase"]["remaining"], 49);

    let preferred = &value["providers"]["preferred"][0];
    assert_eq!(preferred["url"], "mock://p0");
    assert_eq!(preferred["requests"]["minute"], 1);
    assert_eq!(preferred["limits"]["per_minute"], 10);
    assert_eq!(value["providers"]["fallback"][0]["requests"]["day"], 1);
}

#[tokio::test]
async fn test_snapshot_tracks_every_request() {
    let router = TestRouter::builder()
        .preferred("mock://p0", ScriptedTransport::healthy())
        .build();

    for _ in 0..4 {
        router.dispatcher.dispatch(JsonRpcRequest::call("eth_gasPrice", None)).await.unwrap();
    }

    let stats = router.snapshot();
    let endpoint = stats.endpoint("mock://p0").unwrap();
    assert_eq!(endpoint.requests.minute, 4);
    assert_eq!(endpoint.requests.hour, 4);
    assert_eq!(endpoint.requests.day, 4);
    assert_eq!(stats.tier(), Tier::Preferred);
}

#[tokio::test]
async fn test_stats_without_registry() {
    let dispatcher = RequestDispatcher::builder()
        .preferred(["mock://solo"])
        .transport_factory(|_: &EndpointConfig| {
            let transport: Arc<dyn RpcTransport> = ScriptedTransport::healthy();
            Ok(transport)
        })
        .build()
        .unwrap();

    dispatcher.request(json!({"method": "net_version"})).await.unwrap();

    let stats = dispatcher.stats();
    assert_eq!(stats.current_provider.as_deref(), Some("mock://solo"));
    assert_eq!(stats.endpoint("mock://solo").map(|s| s.requests.minute), Some(1));
    assert!(dispatcher.is_connected());
}

#[tokio::test]
async fn test_metrics_follow_dispatch() {
    let metrics = Arc::new(MetricsCollector::new());
    let transports: Vec<Arc<ScriptedTransport>> =
        vec![ScriptedTransport::failing(), ScriptedTransport::healthy()];
    let lookup = transports.clone();

    let dispatcher = RequestDispatcher::builder()
        .preferred(["mock://metrics-p0"])
        .fallback(["mock://metrics-f0"])
        .metrics(Arc::clone(&metrics))
        .transport_factory(move |config: &EndpointConfig| {
            let index = usize::from(config.url.ends_with("f0"));
            let transport: Arc<dyn RpcTransport> = lookup[index].clone();
            Ok(transport)
        })
        .build()
        .unwrap();

    let result: Value = dispatcher.request(json!({"method": "eth_blockNumber"})).await.unwrap();
    assert_eq!(result, json!("0x1"));

    let rendered = metrics.render();
    for name in [
        "rotor_attempts_total",
        "rotor_transient_errors_total",
        "rotor_tier_switches_total",
        "rotor_calls_total",
        "rotor_current_tier_fallback",
    ] {
        assert!(rendered.contains(name), "missing {name} in:\n{rendered}");
    }
    assert_eq!(transports[0].call_count(), 1);
}
