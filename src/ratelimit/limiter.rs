//! Core rate limiter implementation.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::LimiterConfig;
use crate::error::{ConfigError, Result};

use super::algorithm::{self, Decision};
use super::bucket::BucketState;
use super::identifier::Identifier;
use super::store::BucketStore;

/// An identifier-scoped rate limiter.
///
/// Thread-safe: one instance can be shared across any number of threads.
/// Decisions for a single identifier are linearizable; decisions for
/// distinct identifiers do not serialize against each other.
///
/// Each limiter owns its configuration and its bucket store, so multiple
/// limiters with independent budgets can coexist in one process.
pub struct RateLimiter<C: Clock = SystemClock> {
    config: LimiterConfig,
    store: BucketStore,
    clock: C,
    /// Last opportunistic eviction sweep.
    last_sweep: Mutex<Duration>,
}

impl RateLimiter<SystemClock> {
    /// Create a rate limiter driven by the system clock.
    pub fn new(config: LimiterConfig) -> std::result::Result<Self, ConfigError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter with an injected clock.
    ///
    /// Fails with [`ConfigError::InvalidCapacity`] or
    /// [`ConfigError::InvalidWindow`] when the configuration is unusable.
    pub fn with_clock(config: LimiterConfig, clock: C) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let last_sweep = Mutex::new(clock.now());
        Ok(Self {
            config,
            store: BucketStore::new(),
            clock,
            last_sweep,
        })
    }

    /// Consume one permit for `raw` at the clock's current time.
    pub fn consume(&self, raw: &str) -> Result<Decision> {
        self.consume_at(raw, 1, self.clock.now())
    }

    /// Consume `cost` permits for `raw` at the clock's current time.
    pub fn consume_with_cost(&self, raw: &str, cost: u64) -> Result<Decision> {
        self.consume_at(raw, cost, self.clock.now())
    }

    /// Consume `cost` permits for `raw` at an explicit timestamp.
    ///
    /// Validates the identifier, fetches or creates its bucket state, and
    /// evaluates the configured algorithm, all atomically with respect to
    /// other calls for the same identifier. A denied request is a normal
    /// [`Decision`] with `allowed == false`, never an error.
    pub fn consume_at(&self, raw: &str, cost: u64, now: Duration) -> Result<Decision> {
        let id = Identifier::validate(raw, self.config.max_identifier_len)?;

        // Unsatisfiable regardless of state; reject before touching any.
        if cost > self.config.capacity {
            return Err(ConfigError::CostExceedsCapacity {
                cost,
                capacity: self.config.capacity,
            }
            .into());
        }

        trace!(identifier = %id, cost, "Checking rate limit");

        let decision = self.store.with_state(
            &id,
            || {
                BucketState::new(
                    self.config.algorithm,
                    self.config.capacity,
                    self.config.window,
                    now,
                )
            },
            |state| algorithm::decide(state, &self.config, now, cost),
        );

        if !decision.allowed {
            debug!(
                identifier = %id,
                retry_after_ms = decision.retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
        }

        self.maybe_sweep(now);

        Ok(decision)
    }

    /// Remaining permits for `raw` at the clock's current time, without
    /// mutating any state.
    ///
    /// Returns `Ok(None)` for an identifier that has never consumed.
    pub fn peek(&self, raw: &str) -> Result<Option<u64>> {
        let id = Identifier::validate(raw, self.config.max_identifier_len)?;
        let now = self.clock.now();
        Ok(self
            .store
            .peek_state(&id, |state| algorithm::remaining(state, &self.config, now)))
    }

    /// Drop all rate limit state for `raw`.
    ///
    /// The next `consume` for the identifier starts from a full bucket.
    /// Returns whether any state existed.
    pub fn reset(&self, raw: &str) -> Result<bool> {
        let id = Identifier::validate(raw, self.config.max_identifier_len)?;
        Ok(self.store.remove(&id))
    }

    /// Evict entries idle for longer than the configured TTL.
    ///
    /// Runs opportunistically during `consume`; calling it explicitly is
    /// only needed when a limiter goes quiet while holding many entries.
    pub fn evict_idle(&self) -> usize {
        self.store.evict_idle(self.clock.now(), self.config.idle_ttl)
    }

    /// Number of identifiers currently holding state.
    pub fn tracked_identifiers(&self) -> usize {
        self.store.len()
    }

    /// Drop all state for all identifiers. Primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// The limiter's configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Sweep at most once per idle TTL, piggybacking on the consume path so
    /// memory stays bounded without a background task.
    fn maybe_sweep(&self, now: Duration) {
        let due = {
            let mut last_sweep = self.last_sweep.lock();
            if now.saturating_sub(*last_sweep) >= self.config.idle_ttl {
                *last_sweep = now;
                true
            } else {
                false
            }
        };
        if due {
            self.store.evict_idle(now, self.config.idle_ttl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Algorithm;
    use crate::error::{FloodgateError, ValidationError};
    use std::sync::Arc;

    fn limiter(capacity: u64, window: Duration) -> (RateLimiter<ManualClock>, ManualClock) {
        let clock = ManualClock::new(Duration::from_secs(1_000));
        let limiter =
            RateLimiter::with_clock(LimiterConfig::new(capacity, window), clock.clone()).unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_construction_rejects_invalid_config() {
        assert_eq!(
            RateLimiter::new(LimiterConfig::new(0, Duration::from_secs(1))).err(),
            Some(ConfigError::InvalidCapacity)
        );
        assert_eq!(
            RateLimiter::new(LimiterConfig::new(5, Duration::ZERO)).err(),
            Some(ConfigError::InvalidWindow)
        );
    }

    #[test]
    fn test_five_then_deny_then_replenish() {
        let (limiter, clock) = limiter(5, Duration::from_secs(1));

        for _ in 0..5 {
            assert!(limiter.consume("user-1").unwrap().allowed);
        }

        let denied = limiter.consume("user-1").unwrap();
        assert!(!denied.allowed);
        assert!(denied.retry_after > Duration::ZERO);

        clock.advance(Duration::from_millis(1_100));
        assert!(limiter.consume("user-1").unwrap().allowed);
    }

    #[test]
    fn test_empty_and_whitespace_identifiers_fail_validation() {
        let (limiter, _clock) = limiter(5, Duration::from_secs(1));

        for raw in ["", "   ", "\t\n"] {
            match limiter.consume(raw) {
                Err(FloodgateError::Validation(ValidationError::EmptyIdentifier)) => {}
                other => panic!("expected EmptyIdentifier, got {:?}", other),
            }
        }
        // Validation failures never create state.
        assert_eq!(limiter.tracked_identifiers(), 0);
    }

    #[test]
    fn test_overlong_identifier_fails_validation() {
        let (limiter, _clock) = limiter(5, Duration::from_secs(1));
        let raw = "k".repeat(300);

        match limiter.consume(&raw) {
            Err(FloodgateError::Validation(ValidationError::IdentifierTooLong {
                length: 300,
                max: 256,
            })) => {}
            other => panic!("expected IdentifierTooLong, got {:?}", other),
        }
    }

    #[test]
    fn test_cost_exceeding_capacity_is_an_error() {
        let (limiter, _clock) = limiter(5, Duration::from_secs(1));

        match limiter.consume_with_cost("user-1", 6) {
            Err(FloodgateError::Config(ConfigError::CostExceedsCapacity {
                cost: 6,
                capacity: 5,
            })) => {}
            other => panic!("expected CostExceedsCapacity, got {:?}", other),
        }
        // The error path left no state behind.
        assert_eq!(limiter.tracked_identifiers(), 0);
    }

    #[test]
    fn test_identifiers_have_independent_budgets() {
        let (limiter, _clock) = limiter(2, Duration::from_secs(1));

        assert!(limiter.consume("user-a").unwrap().allowed);
        assert!(limiter.consume("user-a").unwrap().allowed);
        assert!(!limiter.consume("user-a").unwrap().allowed);

        // A different identifier is unaffected.
        assert!(limiter.consume("user-b").unwrap().allowed);
    }

    #[test]
    fn test_peek_reports_without_consuming() {
        let (limiter, _clock) = limiter(5, Duration::from_secs(1));

        assert_eq!(limiter.peek("user-1").unwrap(), None);

        limiter.consume("user-1").unwrap();
        limiter.consume("user-1").unwrap();
        assert_eq!(limiter.peek("user-1").unwrap(), Some(3));
        assert_eq!(limiter.peek("user-1").unwrap(), Some(3));
    }

    #[test]
    fn test_reset_restores_full_capacity() {
        let (limiter, _clock) = limiter(2, Duration::from_secs(60));

        limiter.consume("user-1").unwrap();
        limiter.consume("user-1").unwrap();
        assert!(!limiter.consume("user-1").unwrap().allowed);

        assert!(limiter.reset("user-1").unwrap());
        assert!(limiter.consume("user-1").unwrap().allowed);

        assert!(!limiter.reset("never-seen").unwrap());
    }

    #[test]
    fn test_concurrent_consumers_admit_exactly_capacity() {
        const THREADS: usize = 32;
        const CAPACITY: u64 = 10;

        let clock = ManualClock::new(Duration::from_secs(500));
        let limiter = Arc::new(
            RateLimiter::with_clock(
                LimiterConfig::new(CAPACITY, Duration::from_secs(60)),
                clock,
            )
            .unwrap(),
        );

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.consume("user-2").unwrap().allowed)
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&allowed| allowed)
            .count();

        assert_eq!(admitted as u64, CAPACITY);
        // The creation race left exactly one state entry.
        assert_eq!(limiter.tracked_identifiers(), 1);
    }

    #[test]
    fn test_fixed_window_variant_through_facade() {
        let clock = ManualClock::new(Duration::from_secs(1_000));
        let config = LimiterConfig::new(3, Duration::from_secs(10))
            .with_algorithm(Algorithm::FixedWindow);
        let limiter = RateLimiter::with_clock(config, clock.clone()).unwrap();

        for _ in 0..3 {
            assert!(limiter.consume("ip-10.0.0.1").unwrap().allowed);
        }
        let denied = limiter.consume("ip-10.0.0.1").unwrap();
        assert!(!denied.allowed);
        // 1000s is a window boundary, so the next boundary is 1010s.
        assert_eq!(denied.reset_at, Duration::from_secs(1_010));

        clock.set(Duration::from_secs(1_010));
        assert!(limiter.consume("ip-10.0.0.1").unwrap().allowed);
    }

    #[test]
    fn test_opportunistic_sweep_bounds_tracked_identifiers() {
        let clock = ManualClock::new(Duration::from_secs(0));
        let config = LimiterConfig::new(10, Duration::from_secs(1))
            .with_idle_ttl(Duration::from_secs(30));
        let limiter = RateLimiter::with_clock(config, clock.clone()).unwrap();

        for i in 0..100 {
            limiter.consume(&format!("client-{}", i)).unwrap();
        }
        assert_eq!(limiter.tracked_identifiers(), 100);

        // One idle TTL later a single consume triggers the sweep, clearing
        // everything but the caller itself.
        clock.advance(Duration::from_secs(31));
        limiter.consume("client-new").unwrap();
        assert_eq!(limiter.tracked_identifiers(), 1);
    }

    #[test]
    fn test_explicit_evict_idle() {
        let clock = ManualClock::new(Duration::from_secs(0));
        let config = LimiterConfig::new(10, Duration::from_secs(1))
            .with_idle_ttl(Duration::from_secs(30));
        let limiter = RateLimiter::with_clock(config, clock.clone()).unwrap();

        limiter.consume("old").unwrap();
        clock.advance(Duration::from_secs(10));
        limiter.consume("young").unwrap();

        clock.advance(Duration::from_secs(25));
        let evicted = limiter.evict_idle();
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_identifiers(), 1);
        assert!(limiter.peek("young").unwrap().is_some());
    }
}
