//! Eviction Module
//!
//! The three trim passes. Each removal goes through `CacheState::remove_entry`
//! so hooks fire and the cost total stays exact.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cache::{CacheState, MemoryCache};

impl<V> CacheState<V> {
    fn evict(&mut self, cache: &MemoryCache<V>, key: &str) {
        if self.remove_entry(cache, key) {
            self.counters.record_eviction();
        }
    }

    // == Trim To Date ==
    /// Removes every entry last accessed strictly before `cutoff`.
    ///
    /// Walks oldest-first and stops at the first entry at or after the
    /// cutoff. The earliest representable timestamp clears the cache.
    /// Returns the number of entries removed.
    pub fn trim_to_date(&mut self, cache: &MemoryCache<V>, cutoff: DateTime<Utc>) -> usize {
        if cutoff == DateTime::<Utc>::MIN_UTC {
            return self.clear(cache);
        }

        let mut removed = 0;
        while let Some((key, entry)) = self.store.oldest() {
            if !entry.is_older_than(cutoff) {
                break;
            }
            let key = key.to_string();
            self.evict(cache, &key);
            removed += 1;
        }

        debug!(removed, %cutoff, "Trimmed to date");
        removed
    }

    // == Trim To Cost Limit ==
    /// Removes entries cheapest-first until the total cost is within `limit`.
    ///
    /// Among equal costs the older access goes first. Returns the number of
    /// entries removed.
    pub fn trim_to_cost_limit(&mut self, cache: &MemoryCache<V>, limit: u64) -> usize {
        if self.store.total_cost() <= limit {
            return 0;
        }

        let mut removed = 0;
        for key in self.store.keys_by_cost() {
            if self.store.total_cost() <= limit {
                break;
            }
            self.evict(cache, &key);
            removed += 1;
        }

        debug!(removed, limit, total_cost = self.store.total_cost(), "Trimmed to cost limit");
        removed
    }

    // == Trim To Cost Limit By Date ==
    /// Removes entries oldest-access-first until the total cost is within
    /// `limit`. Returns the number of entries removed.
    pub fn trim_to_cost_limit_by_date(&mut self, cache: &MemoryCache<V>, limit: u64) -> usize {
        let mut removed = 0;
        while self.store.total_cost() > limit {
            let Some((key, _)) = self.store.oldest() else {
                break;
            };
            let key = key.to_string();
            self.evict(cache, &key);
            removed += 1;
        }

        if removed > 0 {
            debug!(removed, limit, total_cost = self.store.total_cost(), "Trimmed to cost limit by date");
        }
        removed
    }
}
