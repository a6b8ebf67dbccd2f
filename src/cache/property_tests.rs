//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check cost bookkeeping and eviction guarantees over
//! arbitrary operation sequences.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::runtime::Runtime;

use crate::cache::{ManualClock, MemoryCache};

// == Strategies ==
/// Generates cache keys from a small alphabet so operations collide
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-e]{1,2}".prop_map(|s| s)
}

fn cost_strategy() -> impl Strategy<Value = u64> {
    0u64..50
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, cost: u64 },
    Get { key: String },
    Remove { key: String },
    TrimToCostLimit { limit: u64 },
    TrimToCostLimitByDate { limit: u64 },
    Clear,
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        4 => (key_strategy(), cost_strategy()).prop_map(|(key, cost)| CacheOp::Set { key, cost }),
        2 => key_strategy().prop_map(|key| CacheOp::Get { key }),
        2 => key_strategy().prop_map(|key| CacheOp::Remove { key }),
        1 => (0u64..100).prop_map(|limit| CacheOp::TrimToCostLimit { limit }),
        1 => (0u64..100).prop_map(|limit| CacheOp::TrimToCostLimitByDate { limit }),
        1 => Just(CacheOp::Clear),
    ]
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // For any operation sequence, the running cost total equals the sum of
    // the costs of the entries present.
    #[test]
    fn prop_total_cost_matches_entries(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let rt = runtime();
        rt.block_on(async {
            let cache = MemoryCache::<String>::new();

            for op in ops {
                match op {
                    CacheOp::Set { key, cost } => cache.set_with_cost(key.clone(), key, cost).await,
                    CacheOp::Get { key } => { cache.get(key).await; }
                    CacheOp::Remove { key } => { cache.remove(key).await; }
                    CacheOp::TrimToCostLimit { limit } => {
                        cache.trim_to_cost_limit(limit).await;
                        prop_assert!(cache.total_cost().await <= limit);
                    }
                    CacheOp::TrimToCostLimitByDate { limit } => {
                        cache.trim_to_cost_limit_by_date(limit).await;
                        prop_assert!(cache.total_cost().await <= limit);
                    }
                    CacheOp::Clear => {
                        cache.clear().await;
                        prop_assert_eq!(cache.total_cost().await, 0);
                    }
                }
                prop_assert!(cache.verify_total_cost().await, "Running total diverged");
            }
            Ok(())
        })?;
    }

    // Without limits, the cache agrees with a plain map after every
    // set/remove, both on values and on the cost total.
    #[test]
    fn prop_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let rt = runtime();
        rt.block_on(async {
            let cache = MemoryCache::<String>::new();
            let mut model: HashMap<String, (String, u64)> = HashMap::new();

            for op in ops {
                match op {
                    CacheOp::Set { key, cost } => {
                        let value = format!("{key}:{cost}");
                        cache.set_with_cost(key.clone(), value.clone(), cost).await;
                        model.insert(key, (value, cost));
                    }
                    CacheOp::Remove { key } => {
                        let removed = cache.remove(key.clone()).await;
                        prop_assert_eq!(removed, model.remove(&key).is_some());
                    }
                    CacheOp::Get { key } => {
                        let got = cache.get(key.clone()).await.map(|v| v.as_str().to_string());
                        prop_assert_eq!(got, model.get(&key).map(|(v, _)| v.clone()));
                    }
                    CacheOp::Clear => {
                        cache.clear().await;
                        model.clear();
                    }
                    CacheOp::TrimToCostLimit { .. } | CacheOp::TrimToCostLimitByDate { .. } => {}
                }
                let expected: u64 = model.values().map(|(_, cost)| cost).sum();
                prop_assert_eq!(cache.total_cost().await, expected);
            }
            Ok(())
        })?;
    }

    // After lowering the cost limit, the total is within it immediately.
    #[test]
    fn prop_cost_limit_enforced_on_return(
        costs in prop::collection::vec(cost_strategy(), 1..30),
        limit in 1u64..100
    ) {
        let rt = runtime();
        rt.block_on(async {
            let cache = MemoryCache::<u64>::new();
            for (i, cost) in costs.iter().enumerate() {
                cache.set_with_cost(format!("k{i}"), *cost, *cost).await;
            }

            cache.set_cost_limit(limit).await;
            prop_assert!(cache.total_cost().await <= limit);

            // And every later set keeps it there.
            cache.set_with_cost("late", 0, limit / 2 + 1).await;
            prop_assert!(cache.total_cost().await <= limit);
            Ok(())
        })?;
    }

    // An age trim removes exactly the entries accessed before the cutoff and
    // leaves the rest untouched.
    #[test]
    fn prop_trim_to_date_is_exact(
        offsets in prop::collection::vec(0u64..100, 1..20),
        cutoff_secs in 0i64..100
    ) {
        let rt = runtime();
        rt.block_on(async {
            let clock = Arc::new(ManualClock::new(t0()));
            let cache = MemoryCache::<u64>::builder().clock(clock.clone()).build();

            let mut sorted = offsets.clone();
            sorted.sort_unstable();
            for (i, offset) in sorted.iter().enumerate() {
                clock.set(t0() + TimeDelta::seconds(*offset as i64));
                cache.set_with_cost(format!("k{i}"), *offset, 1).await;
            }

            let cutoff = t0() + TimeDelta::seconds(cutoff_secs);
            cache.trim_to_date(cutoff).await;

            for (i, offset) in sorted.iter().enumerate() {
                let present = cache.contains_key(format!("k{i}")).await;
                prop_assert_eq!(present, (*offset as i64) >= cutoff_secs, "k{} at +{}s", i, offset);
            }
            let survivors = sorted.iter().filter(|o| (**o as i64) >= cutoff_secs).count() as u64;
            prop_assert_eq!(cache.total_cost().await, survivors);
            Ok(())
        })?;
    }
}

#[test]
fn test_runtime_shutdown_is_silent() {
    let rt = runtime();
    let cache = rt.block_on(async { MemoryCache::<String>::new() });
    rt.shutdown_timeout(Duration::from_secs(1));

    // Worker pool gone: operations decline instead of panicking.
    cache.set_blocking("key", "value".to_string());
    assert!(cache.get_blocking("key").is_none());
    assert_eq!(cache.total_cost_blocking(), 0);
}
