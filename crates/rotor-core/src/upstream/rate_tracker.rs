//! Sliding-window request counters for a single provider endpoint.
//!
//! Each tracker keeps three fixed windows (minute, hour, day). A window's count
//! grows monotonically until `now - window_start >= window_length`, at which
//! point it resets to zero and the window restarts at `now`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(60 * 60);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-window request caps. `None` (or a configured `0`) means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub per_minute: Option<u64>,
    pub per_hour: Option<u64>,
    pub per_day: Option<u64>,
}

impl RateLimits {
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Builds limits from raw configuration values, mapping `0` to unlimited.
    #[must_use]
    pub fn new(per_minute: Option<u64>, per_hour: Option<u64>, per_day: Option<u64>) -> Self {
        let limit = |value: Option<u64>| value.filter(|v| *v > 0);
        Self { per_minute: limit(per_minute), per_hour: limit(per_hour), per_day: limit(per_day) }
    }

    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.per_minute.is_none() && self.per_hour.is_none() && self.per_day.is_none()
    }
}

/// Request counts for the current minute, hour and day windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowCounts {
    pub minute: u64,
    pub hour: u64,
    pub day: u64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started_at: Instant,
    length: Duration,
    limit: Option<u64>,
}

impl Window {
    fn new(length: Duration, limit: Option<u64>, now: Instant) -> Self {
        Self { count: 0, started_at: now, length, limit }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.length
    }

    fn roll(&mut self, now: Instant) {
        if self.is_expired(now) {
            self.count = 0;
            self.started_at = now;
        }
    }

    fn is_exceeded(&self) -> bool {
        self.limit.is_some_and(|limit| self.count > limit)
    }

    fn count_at(&self, now: Instant) -> u64 {
        if self.is_expired(now) {
            0
        } else {
            self.count
        }
    }
}

#[derive(Debug)]
struct Windows {
    minute: Window,
    hour: Window,
    day: Window,
}

/// Tracks request volume against an endpoint's configured limits.
///
/// All three windows live under one lock so a recorded request updates them
/// together.
#[derive(Debug)]
pub struct RateTracker {
    limits: RateLimits,
    windows: Mutex<Windows>,
}

impl RateTracker {
    #[must_use]
    pub fn new(limits: RateLimits) -> Self {
        Self::starting_at(limits, Instant::now())
    }

    /// Creates a tracker whose windows start at `now`.
    #[must_use]
    pub fn starting_at(limits: RateLimits, now: Instant) -> Self {
        Self {
            limits,
            windows: Mutex::new(Windows {
                minute: Window::new(MINUTE, limits.per_minute, now),
                hour: Window::new(HOUR, limits.per_hour, now),
                day: Window::new(DAY, limits.per_day, now),
            }),
        }
    }

    #[must_use]
    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Records one request and returns `true` if any window is now over its limit.
    ///
    /// Always counts the request, even when the caller then decides to send it
    /// somewhere else.
    pub fn record_request(&self) -> bool {
        self.record_request_at(Instant::now())
    }

    /// Same as [`record_request`](Self::record_request) with an explicit clock reading.
    pub fn record_request_at(&self, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        let Windows { minute, hour, day } = &mut *windows;

        let mut exceeded = false;
        for window in [minute, hour, day] {
            window.roll(now);
            window.count += 1;
            exceeded |= window.is_exceeded();
        }
        exceeded
    }

    /// Returns the counts as they stand at `now`; expired windows read as zero.
    #[must_use]
    pub fn counts(&self) -> WindowCounts {
        self.counts_at(Instant::now())
    }

    #[must_use]
    pub fn counts_at(&self, now: Instant) -> WindowCounts {
        let windows = self.windows.lock();
        WindowCounts {
            minute: windows.minute.count_at(now),
            hour: windows.hour.count_at(now),
            day: windows.day.count_at(now),
        }
    }
}
