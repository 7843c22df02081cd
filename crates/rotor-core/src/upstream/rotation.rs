//! Position tracking across the two provider tiers.
//!
//! # Phases
//!
//! ```text
//! Preferred(i) ──failure, i+1 == len──► FallbackCooldown(0, N, 0, forced)
//!      ▲                                     │        │
//!      │        N successes, or K consecutive│        │ N calls with failures
//!      └──────────────failures───────────────┘        ▼
//!                                             FallbackLoop(j) ──wrap──► FallbackCooldown
//! ```
//!
//! `N` is [`RotationPolicy::fallback_cooldown_calls`] and `K` is
//! [`RotationPolicy::max_consecutive_failures`].
//!
//! The machine itself is plain data; the dispatcher owns it behind a lock and
//! never holds that lock across network I/O.

use super::pool::Tier;
use serde::Serialize;

/// Calls committed to the fallback tier after the preferred tier is exhausted.
pub const FALLBACK_COOLDOWN_CALLS: u32 = 50;

/// Consecutive fallback failures that abort a cooldown early.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 4;

/// Thresholds that drive tier switching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub fallback_cooldown_calls: u32,
    pub max_consecutive_failures: u32,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            fallback_cooldown_calls: FALLBACK_COOLDOWN_CALLS,
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
        }
    }
}

/// The router's current position and cooldown counters.
///
/// Invariants: `forced_to_fallback` implies `tier == Fallback`, and the index
/// of the current tier is always within that tier's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RotationState {
    pub tier: Tier,
    pub preferred_index: usize,
    pub fallback_index: usize,
    pub fallback_calls_remaining: u32,
    pub consecutive_fallback_failures: u32,
    pub forced_to_fallback: bool,
}

impl RotationState {
    #[must_use]
    pub fn at_preferred(index: usize) -> Self {
        Self {
            tier: Tier::Preferred,
            preferred_index: index,
            fallback_index: 0,
            fallback_calls_remaining: 0,
            consecutive_fallback_failures: 0,
            forced_to_fallback: false,
        }
    }

    /// Returns `true` while the router is committed to the fallback tier.
    #[must_use]
    pub fn in_cooldown(&self) -> bool {
        self.tier == Tier::Fallback && self.fallback_calls_remaining > 0
    }

    #[must_use]
    pub fn position(&self) -> Position {
        match self.tier {
            Tier::Preferred => Position { tier: Tier::Preferred, index: self.preferred_index },
            Tier::Fallback => Position { tier: Tier::Fallback, index: self.fallback_index },
        }
    }

    #[must_use]
    pub fn phase(&self) -> RotationPhase {
        match self.tier {
            Tier::Preferred => RotationPhase::Preferred { index: self.preferred_index },
            Tier::Fallback if self.in_cooldown() => RotationPhase::FallbackCooldown {
                index: self.fallback_index,
                remaining: self.fallback_calls_remaining,
                consecutive_failures: self.consecutive_fallback_failures,
                forced: self.forced_to_fallback,
            },
            Tier::Fallback => RotationPhase::FallbackLoop { index: self.fallback_index },
        }
    }
}

/// Tier plus index of the provider that the next attempt goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub tier: Tier,
    pub index: usize,
}

/// Named view of [`RotationState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RotationPhase {
    Preferred { index: usize },
    FallbackCooldown { index: usize, remaining: u32, consecutive_failures: u32, forced: bool },
    FallbackLoop { index: usize },
}

/// Why the router is moving on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceCause {
    /// The current provider failed with a transient error.
    Failure,
    /// The current provider is over its rate limit; skip it without blaming it.
    Preemptive,
}

/// Outcome of [`RotationStateMachine::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved,
    /// Every reachable provider has been tried; the position wrapped.
    NoMoreProviders,
}

/// Two-tier rotation state machine.
#[derive(Debug, Clone)]
pub struct RotationStateMachine {
    state: RotationState,
    policy: RotationPolicy,
    preferred_len: usize,
    fallback_len: usize,
}

impl RotationStateMachine {
    #[must_use]
    pub fn new(policy: RotationPolicy, preferred_len: usize, fallback_len: usize) -> Self {
        Self::starting_at(policy, preferred_len, fallback_len, 0)
    }

    /// Creates a machine positioned on the given preferred provider.
    ///
    /// An out-of-range index falls back to `0`. With no preferred providers
    /// the machine starts in fallback cooldown.
    #[must_use]
    pub fn starting_at(
        policy: RotationPolicy,
        preferred_len: usize,
        fallback_len: usize,
        preferred_index: usize,
    ) -> Self {
        let mut machine = Self {
            state: RotationState::at_preferred(0),
            policy,
            preferred_len,
            fallback_len,
        };
        let index = if preferred_index < preferred_len { preferred_index } else { 0 };
        machine.enter_preferred(index);
        machine
    }

    #[must_use]
    pub fn state(&self) -> RotationState {
        self.state
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.state.position()
    }

    #[must_use]
    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// Returns `true` if the current position names a real provider.
    #[must_use]
    pub fn has_provider(&self) -> bool {
        let Position { tier, index } = self.position();
        match tier {
            Tier::Preferred => index < self.preferred_len,
            Tier::Fallback => index < self.fallback_len,
        }
    }

    /// Moves to the next provider.
    pub fn advance(&mut self, cause: AdvanceCause) -> Advance {
        if self.state.in_cooldown() {
            self.advance_in_cooldown(cause);
            return Advance::Moved;
        }

        match self.state.tier {
            Tier::Preferred => {
                self.state.preferred_index += 1;
                if self.state.preferred_index < self.preferred_len {
                    return Advance::Moved;
                }
                if self.fallback_len > 0 {
                    tracing::info!(
                        cooldown_calls = self.policy.fallback_cooldown_calls,
                        "preferred providers exhausted, switching to fallback tier"
                    );
                    self.enter_cooldown();
                    return Advance::Moved;
                }
                self.state.preferred_index = 0;
                Advance::NoMoreProviders
            }
            Tier::Fallback => {
                self.state.fallback_index += 1;
                if self.state.fallback_index < self.fallback_len {
                    return Advance::Moved;
                }
                if self.state.forced_to_fallback {
                    tracing::debug!("fallback tier wrapped, restarting cooldown");
                    self.enter_cooldown();
                    return Advance::Moved;
                }
                self.state.fallback_index = 0;
                Advance::NoMoreProviders
            }
        }
    }

    fn advance_in_cooldown(&mut self, cause: AdvanceCause) {
        self.state.fallback_calls_remaining -= 1;

        match cause {
            AdvanceCause::Failure => {
                self.state.consecutive_fallback_failures += 1;
                if self.state.consecutive_fallback_failures >= self.policy.max_consecutive_failures
                {
                    tracing::warn!(
                        consecutive_failures = self.state.consecutive_fallback_failures,
                        "fallback providers failing, returning to preferred tier early"
                    );
                    self.reset();
                    return;
                }
            }
            AdvanceCause::Preemptive => self.state.consecutive_fallback_failures = 0,
        }

        self.state.fallback_index = (self.state.fallback_index + 1) % self.fallback_len.max(1);
    }

    /// Records a successful call; completes the cooldown when it runs out.
    pub fn on_success(&mut self) {
        if !self.state.in_cooldown() {
            return;
        }

        self.state.fallback_calls_remaining -= 1;
        self.state.consecutive_fallback_failures = 0;

        if self.state.fallback_calls_remaining == 0 {
            tracing::info!("fallback cooldown complete, returning to preferred tier");
            self.reset();
        }
    }

    /// Returns to the first preferred provider and clears every counter.
    ///
    /// With no preferred providers this re-enters a fresh forced fallback cooldown.
    pub fn reset(&mut self) {
        self.enter_preferred(0);
    }

    /// Overwrites the state with an earlier snapshot.
    pub fn restore(&mut self, state: RotationState) {
        self.state = state;
    }

    fn enter_preferred(&mut self, index: usize) {
        if self.preferred_len == 0 && self.fallback_len > 0 {
            self.enter_cooldown();
        } else {
            self.state = RotationState::at_preferred(index);
        }
    }

    fn enter_cooldown(&mut self) {
        self.state = RotationState {
            tier: Tier::Fallback,
            preferred_index: 0,
            fallback_index: 0,
            fallback_calls_remaining: self.policy.fallback_cooldown_calls,
            consecutive_fallback_failures: 0,
            forced_to_fallback: true,
        };
    }
}
