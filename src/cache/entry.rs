//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with cost and access time.

use std::sync::Arc;

use chrono::{DateTime, Utc};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// Only the value ever leaves the store; cost and access time stay private
/// to the cache.
#[derive(Debug)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: Arc<V>,
    /// Eviction weight counted against the cost limit
    pub cost: u64,
    /// Last time the entry was set or successfully read
    pub last_access: DateTime<Utc>,
    /// Tie-breaker for entries touched within the same clock tick
    pub(crate) seq: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry accessed at `now`.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `cost` - Weight of the entry against the cost limit
    /// * `now` - Access time to stamp
    /// * `seq` - Monotonic sequence number from the store
    pub fn new(value: Arc<V>, cost: u64, now: DateTime<Utc>, seq: u64) -> Self {
        Self {
            value,
            cost,
            last_access: now,
            seq,
        }
    }

    // == Is Older Than ==
    /// Checks whether the entry was last accessed strictly before `cutoff`.
    ///
    /// An entry accessed exactly at the cutoff is kept.
    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_access < cutoff
    }

    /// Position of this entry in access order.
    pub(crate) fn recency_key(&self) -> (DateTime<Utc>, u64) {
        (self.last_access, self.seq)
    }
}
