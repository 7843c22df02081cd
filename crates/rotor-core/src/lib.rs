//! # Rotor Core
//!
//! Client-side JSON-RPC router that rotates across a two-tier pool of
//! blockchain node providers.
//!
//! This crate provides:
//!
//! - **[`upstream`]**: Provider pool, per-endpoint rate tracking, response
//!   classification, the rotation state machine and the request dispatcher.
//!
//! - **[`config`]**: Layered configuration (defaults, TOML file, environment).
//!
//! - **[`metrics`]**: Prometheus metrics for attempts, classifications and tier switches.
//!
//! - **[`types`]**: JSON-RPC 2.0 envelope types.
//!
//! ## Request Flow
//!
//! ```text
//! Caller payload
//!       │
//!       ▼
//! ┌─────────────┐
//! │  normalize  │  inject jsonrpc / id
//! └──────┬──────┘
//!        ▼
//! ┌─────────────────┐   over limit   ┌──────────────────────┐
//! │ current endpoint│ ─────────────► │ pre-emptive advance  │
//! │  record_request │                └──────────┬───────────┘
//! └──────┬──────────┘                           │
//!        ▼ ◄────────────────────────────────────┘
//! ┌─────────────┐
//! │    send     │
//! └──────┬──────┘
//!        ▼
//! ┌─────────────┐  Success  ──► on_success, return result
//! │  classify   │  Semantic ──► return error, state untouched
//! └──────┬──────┘
//!        │ Transient
//!        ▼
//!   advance(failure) ──► retry until max attempts, then restore and fail
//! ```

pub mod config;
pub mod metrics;
pub mod types;
pub mod upstream;
