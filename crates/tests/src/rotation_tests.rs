//! Tier switching, cooldown and exhaustion as seen through the dispatcher.

use crate::mock_infrastructure::{Behavior, ScriptedTransport, TestRouter};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use rotor_core::{
    types::{JsonRpcRequest, JsonRpcResponse},
    upstream::{
        rotation::FALLBACK_COOLDOWN_CALLS, EndpointConfig, RequestDispatcher, RotationError,
        RotationPhase, RotationState, RouterSnapshot, RpcTransport, StateRegistry, Tier,
        UpstreamError,
    },
};
use serde_json::{json, Value};
use std::sync::Arc;

fn block_number() -> JsonRpcRequest {
    JsonRpcRequest::call("eth_blockNumber", None)
}

/// Records the router's published snapshot at the moment it is called.
struct SnapshotRecorder {
    registry: Arc<StateRegistry>,
    seen: Mutex<Vec<Arc<RouterSnapshot>>>,
}

#[async_trait]
impl RpcTransport for SnapshotRecorder {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, UpstreamError> {
        if let Some(snapshot) = self.registry.snapshot(0) {
            self.seen.lock().push(snapshot);
        }
        Ok(JsonRpcResponse::success(json!("0x1"), request.id.clone().unwrap_or(Value::Null)))
    }
}

#[tokio::test]
async fn test_preferred_tier_exhaustion_forces_fallback_cooldown() {
    let registry = Arc::new(StateRegistry::new());
    let recorder = Arc::new(SnapshotRecorder {
        registry: Arc::clone(&registry),
        seen: Mutex::new(Vec::new()),
    });
    let failing = ScriptedTransport::failing();

    let recorder_transport: Arc<dyn RpcTransport> = recorder.clone();
    let failing_transport: Arc<dyn RpcTransport> = failing.clone();
    let dispatcher = RequestDispatcher::builder()
        .preferred(["mock://p0", "mock://p1"])
        .fallback(["mock://f0", "mock://f1"])
        .registry(Arc::clone(&registry))
        .transport_factory(move |config: &EndpointConfig| {
            if config.url.starts_with("mock://p") {
                Ok(Arc::clone(&failing_transport))
            } else {
                Ok(Arc::clone(&recorder_transport))
            }
        })
        .build()
        .unwrap();

    let result = dispatcher.request(json!({"method": "eth_blockNumber"})).await.unwrap();
    assert_eq!(result, json!("0x1"));
    assert_eq!(failing.call_count(), 2, "both preferred providers are attempted first");

    let seen = recorder.seen.lock();
    assert_eq!(seen.len(), 1);
    let at_first_fallback = &seen[0];
    assert_eq!(at_first_fallback.tier(), Tier::Fallback);
    assert!(at_first_fallback.rotation.forced_to_fallback);
    assert_eq!(at_first_fallback.rotation.fallback_calls_remaining, FALLBACK_COOLDOWN_CALLS);
    assert_eq!(at_first_fallback.rotation.fallback_index, 0);
    assert_eq!(at_first_fallback.current_provider.as_deref(), Some("mock://f0"));
}

#[tokio::test]
async fn test_cooldown_decays_back_to_preferred() {
    let router = TestRouter::builder()
        .preferred("mock://p0", ScriptedTransport::scripted([Behavior::TimeOut]))
        .fallback("mock://f0", ScriptedTransport::healthy())
        .policy(3, 4)
        .build();

    router.dispatcher.dispatch(block_number()).await.unwrap();
    let state = router.state();
    assert_eq!(state.tier, Tier::Fallback);
    assert_eq!(state.fallback_calls_remaining, 2);

    router.dispatcher.dispatch(block_number()).await.unwrap();
    assert_eq!(router.state().fallback_calls_remaining, 1);

    router.dispatcher.dispatch(block_number()).await.unwrap();
    let state = router.state();
    assert_eq!(state, RotationState::at_preferred(0));
    assert!(!state.forced_to_fallback);
    assert_eq!(router.calls("mock://f0"), 3);

    router.dispatcher.dispatch(block_number()).await.unwrap();
    assert_eq!(router.calls("mock://p0"), 2);
}

#[tokio::test]
async fn test_consecutive_fallback_failures_abort_cooldown() {
    let router = TestRouter::builder()
        .preferred("mock://p0", ScriptedTransport::scripted([Behavior::TimeOut]))
        .fallback(
            "mock://f0",
            ScriptedTransport::scripted([Behavior::Succeed(json!("0x1")), Behavior::TimeOut]),
        )
        .fallback("mock://f1", ScriptedTransport::failing())
        .fallback("mock://f2", ScriptedTransport::failing())
        .fallback("mock://f3", ScriptedTransport::failing())
        .build();
    assert_eq!(router.dispatcher.max_attempts(), 5);

    router.dispatcher.dispatch(block_number()).await.unwrap();
    assert!(router.state().in_cooldown());

    // f0..f3 fail in turn; the fourth failure sends the router home and p0 answers.
    let response = router.dispatcher.dispatch(block_number()).await.unwrap();
    assert_eq!(response.result, Some(json!("0x1")));
    for url in ["mock://f1", "mock://f2", "mock://f3"] {
        assert_eq!(router.calls(url), 1, "{url} attempted once");
    }
    assert_eq!(router.calls("mock://p0"), 2);
    assert_eq!(router.state(), RotationState::at_preferred(0));
}

#[tokio::test]
async fn test_exhaustion_restores_starting_position() {
    let router = TestRouter::builder()
        .preferred("mock://p0", ScriptedTransport::failing())
        .preferred("mock://p1", ScriptedTransport::failing())
        .fallback("mock://f0", ScriptedTransport::failing())
        .starting_preferred_index(1)
        .build();
    let start = router.state();
    assert_eq!(start, RotationState::at_preferred(1));

    let error = router.dispatcher.dispatch(block_number()).await.unwrap_err();
    match &error {
        RotationError::Exhausted { attempts, last } => {
            assert_eq!(*attempts, router.dispatcher.max_attempts());
            assert!(matches!(last, UpstreamError::Timeout));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert!(error.to_string().contains("All providers failed"));

    assert_eq!(router.state(), start);
    assert_eq!(router.snapshot().rotation, start);
    assert_eq!(router.dispatcher.current_url().as_deref(), Some("mock://p1"));
}

#[tokio::test]
async fn test_exhaustion_without_fallback_tier() {
    let router = TestRouter::builder()
        .preferred("mock://p0", ScriptedTransport::failing())
        .preferred("mock://p1", ScriptedTransport::new(Behavior::ServerError(502)))
        .build();

    let error = router.dispatcher.dispatch(block_number()).await.unwrap_err();
    match error {
        RotationError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(last, UpstreamError::HttpError(502, _)));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(router.total_calls(), 2);
    assert_eq!(router.state(), RotationState::at_preferred(0));
}

#[tokio::test]
async fn test_fallback_attempts_are_capped() {
    let mut builder = TestRouter::builder().preferred("mock://p0", ScriptedTransport::failing());
    for i in 0..6 {
        builder = builder.fallback(format!("mock://f{i}"), ScriptedTransport::failing());
    }
    let router = builder.policy(50, 10).build();

    let error = router.dispatcher.dispatch(block_number()).await.unwrap_err();
    assert!(error.is_exhausted());
    assert_eq!(router.total_calls(), 5);
    assert_eq!(router.calls("mock://f4"), 0);
}

#[tokio::test]
async fn test_fallback_only_pool() {
    let router = TestRouter::builder()
        .fallback("mock://f0", ScriptedTransport::failing())
        .fallback("mock://f1", ScriptedTransport::healthy())
        .build();

    assert!(matches!(router.snapshot().phase, RotationPhase::FallbackCooldown { .. }));
    router.dispatcher.dispatch(block_number()).await.unwrap();
    assert_eq!(router.calls("mock://f0"), 1);
    assert_eq!(router.calls("mock://f1"), 1);
    assert_eq!(router.state().tier, Tier::Fallback);
}

#[tokio::test]
async fn test_concurrent_calls_share_rotation_state() {
    let router = TestRouter::builder()
        .preferred("mock://p0", ScriptedTransport::failing())
        .fallback("mock://f0", ScriptedTransport::healthy())
        .fallback("mock://f1", ScriptedTransport::healthy())
        .build();

    let calls = (0..20).map(|_| router.dispatcher.dispatch(block_number()));
    let results = join_all(calls).await;

    assert!(results.iter().all(Result::is_ok));
    let state = router.state();
    assert_eq!(state.tier, Tier::Fallback);
    assert!(state.fallback_calls_remaining <= FALLBACK_COOLDOWN_CALLS);
    assert_eq!(router.calls("mock://f0") + router.calls("mock://f1"), 20);
}
