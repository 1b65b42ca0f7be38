//! Rate limiting decision logic.
//!
//! Pure functions over one identifier's [`BucketState`] and an explicit
//! timestamp. The caller (the store, via the limiter facade) guarantees
//! exclusive access to the state for the duration of a decision, and that
//! `cost <= capacity`.

use std::time::Duration;

use crate::config::LimiterConfig;

use super::bucket::{window_index, BucketState, WindowState};

/// Tolerance for floating-point permit comparisons.
const EPSILON: f64 = 1e-9;

/// The outcome of a single `consume` call.
///
/// A denied request is a normal outcome, not an error: `allowed` is false,
/// `retry_after` says how long until the request could succeed, and no
/// permits are debited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Whether the request was admitted.
    pub allowed: bool,
    /// Permits left for this identifier after the decision.
    pub remaining: u64,
    /// Time until a request of the same cost could succeed; zero if allowed.
    pub retry_after: Duration,
    /// Timestamp (same timebase as the clock) at which the identifier's
    /// budget is fully restored or the current window ends.
    pub reset_at: Duration,
}

/// Evaluate the configured algorithm against `state` at `now`.
///
/// Debits `cost` permits iff the request is admitted. Timestamps that move
/// backwards are clamped to the last observed timestamp before evaluation.
pub(crate) fn decide(
    state: &mut BucketState,
    config: &LimiterConfig,
    now: Duration,
    cost: u64,
) -> Decision {
    let now = state.touch(now);

    match &mut state.window {
        WindowState::TokenBucket { tokens, last_refill } => {
            decide_token_bucket(tokens, last_refill, config, now, cost)
        }
        WindowState::FixedWindow { count, index } => {
            decide_fixed_window(count, index, config, now, cost)
        }
        WindowState::SlidingWindow {
            current,
            previous,
            index,
        } => decide_sliding_window(current, previous, index, config, now, cost),
    }
}

/// Remaining permits at `now` without mutating state.
pub(crate) fn remaining(state: &BucketState, config: &LimiterConfig, now: Duration) -> u64 {
    let now = now.max(state.last_seen);
    let capacity = config.capacity;

    match &state.window {
        WindowState::TokenBucket { tokens, last_refill } => {
            let refilled = refill(*tokens, *last_refill, config, now);
            refilled.floor() as u64
        }
        WindowState::FixedWindow { count, index } => {
            if window_index(now, config.window) != *index {
                capacity
            } else {
                capacity.saturating_sub(*count)
            }
        }
        WindowState::SlidingWindow {
            current,
            previous,
            index,
        } => {
            let (current, previous) = shifted_counts(*current, *previous, *index, config, now);
            let estimate = blended_estimate(current, previous, config, now);
            capacity.saturating_sub(estimate.ceil() as u64)
        }
    }
}

fn refill_rate(config: &LimiterConfig) -> f64 {
    config.capacity as f64 / config.window.as_secs_f64()
}

fn refill(tokens: f64, last_refill: Duration, config: &LimiterConfig, now: Duration) -> f64 {
    let elapsed = now.saturating_sub(last_refill);
    (tokens + elapsed.as_secs_f64() * refill_rate(config)).min(config.capacity as f64)
}

fn decide_token_bucket(
    tokens: &mut f64,
    last_refill: &mut Duration,
    config: &LimiterConfig,
    now: Duration,
    cost: u64,
) -> Decision {
    *tokens = refill(*tokens, *last_refill, config, now);
    *last_refill = now;

    let rate = refill_rate(config);
    let allowed = *tokens + EPSILON >= cost as f64;
    let retry_after = if allowed {
        *tokens -= cost as f64;
        Duration::ZERO
    } else {
        let deficit = cost as f64 - *tokens;
        secs_f64(deficit / rate)
    };

    // Full replenishment time given the post-decision balance.
    let reset_at = now + secs_f64((config.capacity as f64 - *tokens) / rate);

    Decision {
        allowed,
        remaining: tokens.floor().max(0.0) as u64,
        retry_after,
        reset_at,
    }
}

fn decide_fixed_window(
    count: &mut u64,
    index: &mut u64,
    config: &LimiterConfig,
    now: Duration,
    cost: u64,
) -> Decision {
    let idx = window_index(now, config.window);
    if idx != *index {
        *count = 0;
        *index = idx;
    }

    let reset_at = window_end(idx, config.window);
    let allowed = *count + cost <= config.capacity;
    if allowed {
        *count += cost;
    }

    Decision {
        allowed,
        remaining: config.capacity.saturating_sub(*count),
        retry_after: if allowed {
            Duration::ZERO
        } else {
            reset_at.saturating_sub(now)
        },
        reset_at,
    }
}

fn decide_sliding_window(
    current: &mut u64,
    previous: &mut u64,
    index: &mut u64,
    config: &LimiterConfig,
    now: Duration,
    cost: u64,
) -> Decision {
    let idx = window_index(now, config.window);
    if idx != *index {
        // Counters only carry over across one boundary.
        *previous = if idx == *index + 1 { *current } else { 0 };
        *current = 0;
        *index = idx;
    }

    let capacity = config.capacity as f64;
    let estimate = blended_estimate(*current, *previous, config, now);
    let reset_at = window_end(idx, config.window);

    let allowed = estimate + cost as f64 <= capacity + EPSILON;
    if allowed {
        *current += cost;
        return Decision {
            allowed: true,
            remaining: config
                .capacity
                .saturating_sub((estimate + cost as f64).ceil() as u64),
            retry_after: Duration::ZERO,
            reset_at,
        };
    }

    let window = config.window;
    let frac = window_fraction(idx, window, now);
    let retry_after = if *current + cost <= config.capacity {
        // The previous window's weight is the blocker; it decays as the
        // current window elapses.
        let need_weight = (capacity - (*current + cost) as f64) / *previous as f64;
        let target_frac = (1.0 - need_weight).clamp(0.0, 1.0);
        secs_f64((target_frac - frac).max(0.0) * window.as_secs_f64())
    } else {
        // Not satisfiable in this window; wait for the boundary, then for
        // the carried-over counter to decay far enough.
        let into_next = 1.0 - (capacity - cost as f64) / *current as f64;
        reset_at.saturating_sub(now) + secs_f64(into_next.clamp(0.0, 1.0) * window.as_secs_f64())
    };

    Decision {
        allowed: false,
        remaining: config.capacity.saturating_sub(estimate.ceil() as u64),
        retry_after: retry_after.max(Duration::from_nanos(1)),
        reset_at,
    }
}

/// Counters as they would stand at `now`, without mutation.
fn shifted_counts(current: u64, previous: u64, index: u64, config: &LimiterConfig, now: Duration) -> (u64, u64) {
    let idx = window_index(now, config.window);
    if idx == index {
        (current, previous)
    } else if idx == index + 1 {
        (0, current)
    } else {
        (0, 0)
    }
}

/// Weighted blend of the previous and current window counters.
fn blended_estimate(current: u64, previous: u64, config: &LimiterConfig, now: Duration) -> f64 {
    let idx = window_index(now, config.window);
    let weight = 1.0 - window_fraction(idx, config.window, now);
    previous as f64 * weight + current as f64
}

/// Elapsed fraction of window `idx` at `now`, in `[0, 1)`.
fn window_fraction(idx: u64, window: Duration, now: Duration) -> f64 {
    let start = Duration::from_nanos((idx as u128 * window.as_nanos()) as u64);
    now.saturating_sub(start).as_secs_f64() / window.as_secs_f64()
}

/// Timestamp of the end of window `idx`.
fn window_end(idx: u64, window: Duration) -> Duration {
    Duration::from_nanos(((idx as u128 + 1) * window.as_nanos()) as u64)
}

fn secs_f64(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.0))
}
