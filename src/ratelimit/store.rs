//! Concurrency-safe bucket storage.

use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::bucket::BucketState;
use super::identifier::Identifier;

/// Sharded map of identifier to [`BucketState`].
///
/// The map guarantees that exactly one state object exists per identifier,
/// even when concurrent callers race on first access, and that a state entry
/// is mutated under per-entry exclusion for the full read-modify-write.
/// Eviction takes the same exclusion, so an entry mid-decision is never
/// removed out from under the decision.
#[derive(Debug, Default)]
pub struct BucketStore {
    buckets: DashMap<Identifier, BucketState>,
}

impl BucketStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Run `f` against the identifier's state, creating it with `init` if
    /// this is the first access.
    ///
    /// The entry lock is held for the whole call, so the read-modify-write
    /// in `f` is atomic with respect to other callers of the same
    /// identifier. Distinct identifiers only contend when they share a map
    /// shard.
    pub fn with_state<R>(
        &self,
        id: &Identifier,
        init: impl FnOnce() -> BucketState,
        f: impl FnOnce(&mut BucketState) -> R,
    ) -> R {
        let mut entry = self.buckets.entry(id.clone()).or_insert_with(|| {
            debug!(identifier = %id, "Creating bucket state");
            init()
        });
        f(entry.value_mut())
    }

    /// Run `f` against the identifier's state without creating it.
    ///
    /// Returns `None` for an identifier with no state.
    pub fn peek_state<R>(&self, id: &Identifier, f: impl FnOnce(&BucketState) -> R) -> Option<R> {
        self.buckets.get(id).map(|entry| f(entry.value()))
    }

    /// Remove entries whose last access precedes `now - ttl`.
    ///
    /// Returns the number of entries removed.
    pub fn evict_idle(&self, now: Duration, ttl: Duration) -> usize {
        let before = self.buckets.len();
        let cutoff = now.saturating_sub(ttl);
        self.buckets.retain(|_, state| state.last_access >= cutoff);

        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.buckets.len(), "Evicted idle bucket state");
        }
        evicted
    }

    /// Remove one identifier's state. Returns whether an entry existed.
    pub fn remove(&self, id: &Identifier) -> bool {
        self.buckets.remove(id).is_some()
    }

    /// Number of tracked identifiers.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the store tracks no identifiers.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop all state. Primarily useful for testing.
    pub fn clear(&self) {
        self.buckets.clear();
    }
}
