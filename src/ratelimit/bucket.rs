//! Per-identifier bucket state.

use std::time::Duration;

use crate::config::Algorithm;

/// Mutable rate limiting state for one identifier.
///
/// Owned exclusively by the [`BucketStore`](super::BucketStore) and mutated
/// only under per-entry exclusion, so no internal synchronization is needed.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketState {
    /// Algorithm-specific counters.
    pub(crate) window: WindowState,
    /// Last time this entry was touched; drives idle eviction.
    pub(crate) last_access: Duration,
    /// Highest timestamp observed so far. Timestamps that appear to move
    /// backwards are clamped to this to prevent permit inflation.
    pub(crate) last_seen: Duration,
}

/// Counters for one accounting strategy.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WindowState {
    TokenBucket {
        /// Current token balance, in fractional permits.
        tokens: f64,
        /// Last time tokens were accrued.
        last_refill: Duration,
    },
    FixedWindow {
        /// Requests admitted in the current window.
        count: u64,
        /// Epoch-aligned index of the current window.
        index: u64,
    },
    SlidingWindow {
        /// Requests admitted in the current window.
        current: u64,
        /// Requests admitted in the immediately preceding window.
        previous: u64,
        /// Epoch-aligned index of the current window.
        index: u64,
    },
}

impl BucketState {
    /// Create state for a previously-unseen identifier: full capacity, with
    /// `now` as the window start / last refill.
    pub(crate) fn new(algorithm: Algorithm, capacity: u64, window: Duration, now: Duration) -> Self {
        let window = match algorithm {
            Algorithm::TokenBucket => WindowState::TokenBucket {
                tokens: capacity as f64,
                last_refill: now,
            },
            Algorithm::FixedWindow => WindowState::FixedWindow {
                count: 0,
                index: window_index(now, window),
            },
            Algorithm::SlidingWindow => WindowState::SlidingWindow {
                current: 0,
                previous: 0,
                index: window_index(now, window),
            },
        };

        Self {
            window,
            last_access: now,
            last_seen: now,
        }
    }

    /// Record an access and return the effective (clamped) timestamp.
    pub(crate) fn touch(&mut self, now: Duration) -> Duration {
        let effective = now.max(self.last_seen);
        self.last_seen = effective;
        self.last_access = effective;
        effective
    }
}

/// Epoch-aligned window index: `floor(now / window)`.
pub(crate) fn window_index(now: Duration, window: Duration) -> u64 {
    (now.as_nanos() / window.as_nanos()) as u64
}
