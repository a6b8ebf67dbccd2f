//! Cache State Module
//!
//! Everything guarded by the gate: the entry store, the limits, the hooks and
//! the counters. Mutating methods here assume they run inside a write.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::{CacheCounters, CacheStats, Clock, EntryStore, HookKind, Hooks, MemoryCache};

// == Cache State ==
pub struct CacheState<V> {
    pub(crate) store: EntryStore<V>,
    /// 0 disables age eviction and the sweeper
    pub(crate) age_limit: Duration,
    /// 0 means unlimited
    pub(crate) cost_limit: u64,
    pub(crate) hooks: Hooks<V>,
    pub(crate) counters: CacheCounters,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<V> CacheState<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: EntryStore::new(),
            age_limit: Duration::ZERO,
            cost_limit: 0,
            hooks: Hooks::default(),
            counters: CacheCounters::new(),
            clock,
        }
    }

    // == Set ==
    /// Stores `value` under `key`, bracketed by the add hooks.
    ///
    /// With a cost limit configured the store is trimmed oldest-first
    /// afterwards, which may evict the entry just written.
    ///
    /// A cost that would overflow the running total declines the set before
    /// any hook fires. Returns whether the entry was stored.
    pub fn set_entry(
        &mut self,
        cache: &MemoryCache<V>,
        key: &str,
        value: Arc<V>,
        cost: u64,
    ) -> bool {
        if let Err(err) = self.store.total_after_put(key, cost) {
            warn!(%err, key, "Set declined");
            return false;
        }

        self.hooks.fire(HookKind::WillAdd, cache, key, Some(&value));

        let now = self.clock.now();
        if let Err(err) = self.store.put(key.to_string(), Arc::clone(&value), cost, now) {
            warn!(%err, key, "Set declined");
            return false;
        }

        self.hooks.fire(HookKind::DidAdd, cache, key, Some(&value));

        if self.cost_limit > 0 {
            self.trim_to_cost_limit_by_date(cache, self.cost_limit);
        }
        true
    }

    // == Remove ==
    /// Removes `key`, bracketed by the remove hooks. No-op when absent.
    pub fn remove_entry(&mut self, cache: &MemoryCache<V>, key: &str) -> bool {
        let Some(entry) = self.store.get(key) else {
            return false;
        };
        let value = Arc::clone(&entry.value);

        self.hooks.fire(HookKind::WillRemove, cache, key, Some(&value));
        self.store.delete(key);
        self.hooks.fire(HookKind::DidRemove, cache, key, None);

        true
    }

    // == Touch ==
    /// Refreshes the access time after a successful read.
    pub fn touch(&mut self, key: &str) -> bool {
        let now = self.clock.now();
        self.store.touch(key, now)
    }

    // == Clear ==
    /// Removes every entry, firing the remove hooks once per entry.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&mut self, cache: &MemoryCache<V>) -> usize {
        let keys: Vec<String> = self.store.iter_by_recency().map(|(k, _)| k.to_string()).collect();
        for key in &keys {
            self.remove_entry(cache, key);
        }
        keys.len()
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.store.len(), self.store.total_cost())
    }
}
