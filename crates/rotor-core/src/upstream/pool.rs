use super::endpoint::{EndpointStats, ProviderEndpoint};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default cap on how many fallback providers a single call may try.
pub const MAX_FALLBACK_ATTEMPTS: usize = 4;

/// Which half of the pool a provider belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Preferred,
    Fallback,
}

impl Tier {
    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preferred => "preferred",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stats for every endpoint, in pool order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub preferred: Vec<EndpointStats>,
    pub fallback: Vec<EndpointStats>,
}

/// Two ordered provider lists. Fixed after construction.
#[derive(Debug, Default)]
pub struct ProviderPool {
    preferred: Vec<Arc<ProviderEndpoint>>,
    fallback: Vec<Arc<ProviderEndpoint>>,
}

impl ProviderPool {
    #[must_use]
    pub fn new(preferred: Vec<Arc<ProviderEndpoint>>, fallback: Vec<Arc<ProviderEndpoint>>) -> Self {
        Self { preferred, fallback }
    }

    #[must_use]
    pub fn tier(&self, tier: Tier) -> &[Arc<ProviderEndpoint>] {
        match tier {
            Tier::Preferred => &self.preferred,
            Tier::Fallback => &self.fallback,
        }
    }

    #[must_use]
    pub fn len(&self, tier: Tier) -> usize {
        self.tier(tier).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.preferred.is_empty() && self.fallback.is_empty()
    }

    #[must_use]
    pub fn get(&self, tier: Tier, index: usize) -> Option<&Arc<ProviderEndpoint>> {
        self.tier(tier).get(index)
    }

    /// Upper bound on attempts for one call: every preferred provider plus at
    /// most `max_fallback_attempts` fallback providers.
    #[must_use]
    pub fn max_attempts(&self, max_fallback_attempts: usize) -> usize {
        self.preferred.len() + max_fallback_attempts.min(self.fallback.len())
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            preferred: self.preferred.iter().map(|endpoint| endpoint.stats()).collect(),
            fallback: self.fallback.iter().map(|endpoint| endpoint.stats()).collect(),
        }
    }
}
