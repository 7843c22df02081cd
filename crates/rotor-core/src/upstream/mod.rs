//! Provider rotation.
//!
//! A [`RequestDispatcher`] owns a [`ProviderPool`] of preferred and fallback
//! endpoints and a [`RotationStateMachine`] that says which endpoint the next
//! attempt goes to.
//!
//! # Tier Rotation
//!
//! 1. **Preferred** - Providers are tried in order. A transient failure, or a
//!    provider over its own rate limit, moves the router to the next one.
//!
//! 2. **Fallback cooldown** - Once every preferred provider has failed, the
//!    router commits to the fallback tier for a fixed number of calls. Too many
//!    consecutive fallback failures end the cooldown early.
//!
//! 3. **Back to preferred** - When the cooldown runs out the router returns to
//!    the first preferred provider.
//!
//! Semantic JSON-RPC errors (bad params, reverted calls on a healthy node) are
//! handed straight back and never move the router. See
//! [`protocol::classify`] for the exact rules.

pub mod builder;
pub mod dispatcher;
pub mod endpoint;
pub mod errors;
pub mod http_client;
pub mod pool;
pub mod protocol;
pub mod rate_tracker;
pub mod rotation;
pub mod state_registry;

pub use builder::{BuilderError, RequestDispatcherBuilder, TransportFactory};
pub use dispatcher::RequestDispatcher;
pub use endpoint::{EndpointConfig, EndpointStats, ProviderEndpoint, RpcTransport};
pub use errors::{RotationError, UpstreamError};
pub use http_client::{HttpClient, HttpClientConfig, HttpTransport};
pub use pool::{PoolStats, ProviderPool, Tier};
pub use protocol::{classify, normalize, Classification, TransientReason};
pub use rate_tracker::{RateLimits, RateTracker, WindowCounts};
pub use rotation::{RotationPhase, RotationPolicy, RotationState, RotationStateMachine};
pub use state_registry::{RouterSnapshot, RouterStateHandle, StateRegistry};
