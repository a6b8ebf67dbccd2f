//! Recency Index Module
//!
//! Orders keys by last access time for the age and by-date eviction passes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

// == Recency Index ==
/// Tracks access order for oldest-first eviction.
///
/// Keys are ordered by `(last_access, seq)` where:
/// - First = Least recently used
/// - Last = Most recently used
#[derive(Debug, Default)]
pub struct RecencyIndex {
    /// Keys by access position
    order: BTreeMap<(DateTime<Utc>, u64), String>,
}

impl RecencyIndex {
    // == Constructor ==
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self {
            order: BTreeMap::new(),
        }
    }

    // == Insert ==
    /// Records `key` at access position `at`.
    pub fn insert(&mut self, at: (DateTime<Utc>, u64), key: String) {
        self.order.insert(at, key);
    }

    // == Remove ==
    /// Forgets the key recorded at position `at`.
    pub fn remove(&mut self, at: (DateTime<Utc>, u64)) -> Option<String> {
        self.order.remove(&at)
    }

    // == Move ==
    /// Moves a key from one access position to another.
    pub fn touch(&mut self, from: (DateTime<Utc>, u64), to: (DateTime<Utc>, u64)) {
        if let Some(key) = self.order.remove(&from) {
            self.order.insert(to, key);
        }
    }

    // == Peek Oldest ==
    /// Returns the least recently used key and its access time.
    pub fn oldest(&self) -> Option<(DateTime<Utc>, &str)> {
        self.order
            .first_key_value()
            .map(|((at, _), key)| (*at, key.as_str()))
    }

    // == Iterate ==
    /// Keys from oldest to newest access.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64, seq: u64) -> (DateTime<Utc>, u64) {
        (DateTime::from_timestamp(secs, 0).unwrap(), seq)
    }

    #[test]
    fn test_recency_new() {
        let index = RecencyIndex::new();
        assert_eq!(index.len(), 0);
        assert!(index.oldest().is_none());
    }

    #[test]
    fn test_oldest_follows_access_time_not_insert_order() {
        let mut index = RecencyIndex::new();

        index.insert(at(30, 0), "c".to_string());
        index.insert(at(10, 1), "a".to_string());
        index.insert(at(20, 2), "b".to_string());

        assert_eq!(index.oldest().map(|(_, k)| k), Some("a"));
        assert_eq!(index.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_same_instant_breaks_ties_by_sequence() {
        let mut index = RecencyIndex::new();

        index.insert(at(10, 2), "second".to_string());
        index.insert(at(10, 1), "first".to_string());

        assert_eq!(index.iter().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[test]
    fn test_touch_moves_to_newest() {
        let mut index = RecencyIndex::new();

        index.insert(at(10, 0), "a".to_string());
        index.insert(at(20, 1), "b".to_string());
        index.touch(at(10, 0), at(30, 2));

        assert_eq!(index.iter().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_touch_unknown_position_is_ignored() {
        let mut index = RecencyIndex::new();

        index.insert(at(10, 0), "a".to_string());
        index.touch(at(99, 9), at(100, 10));

        assert_eq!(index.len(), 1);
        assert_eq!(index.oldest().map(|(_, k)| k), Some("a"));
    }

    #[test]
    fn test_remove() {
        let mut index = RecencyIndex::new();

        index.insert(at(10, 0), "a".to_string());
        index.insert(at(20, 1), "b".to_string());

        assert_eq!(index.remove(at(10, 0)), Some("a".to_string()));
        assert_eq!(index.remove(at(10, 0)), None);
        assert_eq!(index.len(), 1);
        assert_eq!(index.oldest().map(|(_, k)| k), Some("b"));
    }
}
