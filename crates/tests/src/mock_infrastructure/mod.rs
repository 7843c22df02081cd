//! Mock Infrastructure for Testing Rotor
//!
//! This module provides reusable mock providers for exercising the router
//! without real network connections.
//!
//! ## Components
//!
//! - `RpcMockBuilder`: Wraps mockito to stand in for an HTTP JSON-RPC provider
//! - `ScriptedTransport`: In-memory transport that replays scripted outcomes
//! - `TestRouter`: A dispatcher wired to scripted transports and a registry
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{ScriptedTransport, TestRouter};
//!
//! let router = TestRouter::builder()
//!     .preferred("mock://a", ScriptedTransport::failing())
//!     .fallback("mock://b", ScriptedTransport::healthy())
//!     .build();
//! ```


pub use rpc_mock::RpcMockBuilder;
pub use scripted_transport::{Behavior, ScriptedTransport};
pub use test_helpers::{TestRouter, TestRouterBuilder};
