//! Entry Store Module
//!
//! Plain key to entry storage with incremental cost bookkeeping. Holds no
//! locks of its own; every caller reaches it through the gate.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::{CacheEntry, RecencyIndex};
use crate::error::{CacheError, Result};

// == Entry Store ==
/// Key/value storage with a running total of entry costs.
#[derive(Debug)]
pub struct EntryStore<V> {
    /// Key-entry storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Access-order index over the same keys
    recency: RecencyIndex,
    /// Sum of `cost` over `entries`
    total_cost: u64,
    /// Next access sequence number
    next_seq: u64,
}

impl<V> Default for EntryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> EntryStore<V> {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: RecencyIndex::new(),
            total_cost: 0,
            next_seq: 0,
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // == Get ==
    /// Looks up an entry without touching its access time.
    pub fn get(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    // == Put ==
    /// Total cost the store would hold after storing `cost` under `key`.
    ///
    /// Fails when that total does not fit in a `u64`.
    pub fn total_after_put(&self, key: &str, cost: u64) -> Result<u64> {
        let replaced = self.entries.get(key).map_or(0, |entry| entry.cost);
        (self.total_cost - replaced)
            .checked_add(cost)
            .ok_or(CacheError::CostOverflow(cost))
    }

    /// Inserts or replaces an entry accessed at `now`.
    ///
    /// Replacing swaps value, cost and access time in one step and adjusts
    /// the total by the cost delta. Returns the replaced entry, if any. A
    /// cost that would overflow the total leaves the store untouched.
    pub fn put(
        &mut self,
        key: String,
        value: Arc<V>,
        cost: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry<V>>> {
        let total_cost = self.total_after_put(&key, cost)?;

        let seq = self.bump_seq();
        let entry = CacheEntry::new(value, cost, now, seq);
        let position = entry.recency_key();

        let replaced = self.entries.insert(key.clone(), entry);
        if let Some(old) = &replaced {
            self.recency.remove(old.recency_key());
        }
        self.recency.insert(position, key);
        self.total_cost = total_cost;
        debug_assert_eq!(self.recency.len(), self.entries.len());

        Ok(replaced)
    }

    // == Touch ==
    /// Refreshes the access time of a present entry.
    ///
    /// Returns false if the key is gone, which happens when a removal or trim
    /// ran between the read and the refresh.
    pub fn touch(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        let seq = self.bump_seq();
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        let from = entry.recency_key();
        entry.last_access = now;
        entry.seq = seq;
        self.recency.touch(from, entry.recency_key());
        true
    }

    // == Delete ==
    /// Removes an entry by key, returning it if it was present.
    pub fn delete(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(entry.recency_key());
        debug_assert!(self.total_cost >= entry.cost, "cost bookkeeping underflow");
        self.total_cost -= entry.cost;
        debug_assert_eq!(self.recency.len(), self.entries.len());
        Some(entry)
    }

    // == Total Cost ==
    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    /// Sums entry costs by full scan. Only meant for checking `total_cost`.
    pub fn recomputed_cost(&self) -> u64 {
        self.entries.values().map(|e| e.cost).sum()
    }

    // == Oldest ==
    /// Least recently accessed key and its entry.
    pub fn oldest(&self) -> Option<(&str, &CacheEntry<V>)> {
        let (_, key) = self.recency.oldest()?;
        self.entries.get(key).map(|entry| (key, entry))
    }

    // == Ordered Views ==
    /// Entries from oldest to newest access.
    pub fn iter_by_recency(&self) -> impl Iterator<Item = (&str, &CacheEntry<V>)> {
        self.recency
            .iter()
            .filter_map(|key| self.entries.get(key).map(|entry| (key, entry)))
    }

    /// Keys ordered cheapest first, older access first among equal costs.
    pub fn keys_by_cost(&self) -> Vec<String> {
        let mut keys: Vec<(u64, (DateTime<Utc>, u64), &String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.cost, entry.recency_key(), key))
            .collect();
        keys.sort_unstable();
        keys.into_iter().map(|(_, _, key)| key.clone()).collect()
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn store_with(items: &[(&str, u64, i64)]) -> EntryStore<String> {
        let mut store = EntryStore::new();
        for (key, cost, secs) in items {
            store
                .put(key.to_string(), Arc::new(format!("v-{key}")), *cost, at(*secs))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_store_new() {
        let store: EntryStore<String> = EntryStore::new();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.total_cost(), 0);
    }

    #[test]
    fn test_store_put_and_get() {
        let store = store_with(&[("key1", 3, 10)]);

        let entry = store.get("key1").unwrap();
        assert_eq!(*entry.value, "v-key1");
        assert_eq!(entry.cost, 3);
        assert_eq!(store.total_cost(), 3);
    }

    #[test]
    fn test_store_overwrite_adjusts_cost_by_delta() {
        let mut store = store_with(&[("key1", 10, 10), ("key2", 4, 11)]);

        let replaced = store
            .put("key1".to_string(), Arc::new("new".to_string()), 2, at(12))
            .unwrap();

        assert_eq!(replaced.map(|e| e.cost), Some(10));
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_cost(), 6);
        assert_eq!(*store.get("key1").unwrap().value, "new");
        assert_eq!(store.oldest().map(|(k, _)| k), Some("key2"));
    }

    #[test]
    fn test_store_delete() {
        let mut store = store_with(&[("key1", 5, 10)]);

        let removed = store.delete("key1").unwrap();
        assert_eq!(removed.cost, 5);
        assert!(store.is_empty());
        assert_eq!(store.total_cost(), 0);
        assert!(store.delete("key1").is_none());
    }

    #[test]
    fn test_store_touch_reorders() {
        let mut store = store_with(&[("a", 1, 10), ("b", 1, 20)]);

        assert!(store.touch("a", at(30)));
        assert!(!store.touch("missing", at(30)));

        let order: Vec<&str> = store.iter_by_recency().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(store.get("a").unwrap().last_access, at(30));
    }

    #[test]
    fn test_store_keys_by_cost() {
        let store = store_with(&[("big", 10, 10), ("small", 1, 30), ("mid", 5, 20), ("tie", 1, 5)]);

        assert_eq!(store.keys_by_cost(), vec!["tie", "small", "mid", "big"]);
    }

    #[test]
    fn test_store_oldest_follows_access() {
        let mut store = store_with(&[("a", 1, 10), ("b", 2, 20)]);
        assert_eq!(store.oldest().map(|(k, e)| (k, e.cost)), Some(("a", 1)));

        store.touch("a", at(30));
        assert_eq!(store.oldest().map(|(k, _)| k), Some("b"));

        store.delete("a");
        store.delete("b");
        assert!(store.oldest().is_none());
    }

    #[test]
    fn test_store_rejects_cost_overflow() {
        let mut store = store_with(&[("a", u64::MAX, 10)]);

        let err = store.put("b".to_string(), Arc::new("b".to_string()), 1, at(20));

        assert_eq!(err.unwrap_err(), CacheError::CostOverflow(1));
        assert!(!store.contains_key("b"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_cost(), u64::MAX);
        assert_eq!(store.total_cost(), store.recomputed_cost());
    }

    #[test]
    fn test_store_replacing_max_cost_entry_fits() {
        let mut store = store_with(&[("a", u64::MAX, 10), ("b", 0, 11)]);

        store.put("a".to_string(), Arc::new("a".to_string()), 5, at(20)).unwrap();
        store.put("b".to_string(), Arc::new("b".to_string()), u64::MAX - 5, at(21)).unwrap();

        assert_eq!(store.total_cost(), u64::MAX);
        assert_eq!(store.total_cost(), store.recomputed_cost());
    }

    #[test]
    fn test_store_recomputed_cost_matches() {
        let mut store = store_with(&[("a", 1, 10), ("b", 2, 20), ("c", 3, 30)]);
        store.put("b".to_string(), Arc::new(String::new()), 7, at(40)).unwrap();
        store.delete("a");

        assert_eq!(store.total_cost(), store.recomputed_cost());
        assert_eq!(store.total_cost(), 10);
    }
}
