//! Read-only diagnostics for every router built against a registry.
//!
//! Each dispatcher registers one [`RouterStateHandle`] and republishes a fresh
//! [`RouterSnapshot`] after every state transition. Readers load the latest
//! snapshot lock-free through `ArcSwap`. Nothing in here feeds back into
//! routing decisions.

use super::{
    endpoint::EndpointStats,
    pool::{PoolStats, Tier},
    rotation::{RotationPhase, RotationState},
};
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Point-in-time view of one router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterSnapshot {
    /// URL of the provider the next attempt would use.
    pub current_provider: Option<String>,
    #[serde(flatten)]
    pub rotation: RotationState,
    pub phase: RotationPhase,
    pub providers: PoolStats,
}

impl RouterSnapshot {
    #[must_use]
    pub fn new(rotation: RotationState, providers: PoolStats) -> Self {
        let current = match rotation.tier {
            Tier::Preferred => providers.preferred.get(rotation.preferred_index),
            Tier::Fallback => providers.fallback.get(rotation.fallback_index),
        };
        Self {
            current_provider: current.map(|stats| stats.url.clone()),
            phase: rotation.phase(),
            rotation,
            providers,
        }
    }

    #[must_use]
    pub fn tier(&self) -> Tier {
        self.rotation.tier
    }

    /// Finds an endpoint's stats by URL in either tier.
    #[must_use]
    pub fn endpoint(&self, url: &str) -> Option<&EndpointStats> {
        self.providers.preferred.iter().chain(&self.providers.fallback).find(|s| s.url == url)
    }
}

/// Latest published snapshot for one router.
#[derive(Debug)]
pub struct RouterStateHandle {
    id: usize,
    snapshot: ArcSwap<RouterSnapshot>,
}

impl RouterStateHandle {
    #[must_use]
    pub fn new(id: usize, initial: RouterSnapshot) -> Self {
        Self { id, snapshot: ArcSwap::from_pointee(initial) }
    }

    /// Registration order within the owning registry.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn load(&self) -> Arc<RouterSnapshot> {
        self.snapshot.load_full()
    }

    pub fn publish(&self, snapshot: RouterSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }
}

/// Append-only collection of router handles, indexed by registration order.
#[derive(Debug, Default)]
pub struct StateRegistry {
    handles: RwLock<Vec<Arc<RouterStateHandle>>>,
}

impl StateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a router and returns its handle.
    pub fn register(&self, initial: RouterSnapshot) -> Arc<RouterStateHandle> {
        let mut handles = self.handles.write();
        let handle = Arc::new(RouterStateHandle::new(handles.len(), initial));
        handles.push(Arc::clone(&handle));

        tracing::debug!(router_id = handle.id(), "registered router state");
        handle
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Arc<RouterStateHandle>> {
        self.handles.read().get(index).cloned()
    }

    /// Latest snapshot of the router registered at `index`.
    #[must_use]
    pub fn snapshot(&self, index: usize) -> Option<Arc<RouterSnapshot>> {
        self.get(index).map(|handle| handle.load())
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<Arc<RouterSnapshot>> {
        self.handles.read().iter().map(|handle| handle.load()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}
