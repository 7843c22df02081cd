//! Integration Tests for Rotor
//!
//! This crate contains various test modules:
//!
//! - `rotation_tests`: Tier switching, cooldown and exhaustion through the dispatcher
//! - `rate_limit_tests`: Pre-emptive rotation driven by per-endpoint limits
//! - `classification_tests`: Which provider answers rotate and which are returned
//! - `registry_tests`: Snapshots published to a shared `StateRegistry`
//! - `http_failover_tests`: End-to-end failover through `HttpTransport` against mockito servers
//! - `mock_infrastructure`: Reusable mock providers
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod rotation_tests;

#[cfg(test)]
mod rate_limit_tests;


#[cfg(test)]
mod registry_tests;

#[cfg(test)]
mod http_failover_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
