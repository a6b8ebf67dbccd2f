//! Memory Cache Module
//!
//! Public handle to the cache. Every operation is queued through the gate and
//! comes in three forms:
//! - `op(..).await` resolves once the operation has run
//! - `op_then(.., callback)` returns immediately and runs `callback` on the
//!   worker pool afterwards
//! - `op_blocking(..)` parks the calling thread until the operation has run;
//!   it must be called from outside the runtime
//!
//! Invalid input (an empty key) is declined silently; completion is still
//! signalled.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::gate::{dispatch, Gate, Pending};
use crate::cache::{
    cutoff_for, CacheState, CacheStats, Clock, Hook, HookKind, SystemClock,
};
use crate::config::Config;
use crate::tasks::spawn_age_sweeper;

/// Owned by every handle; dropping the last one tears the cache down.
pub(crate) struct Shared<V> {
    gate: Gate<V>,
    /// Published age limit, watched by the sweeper
    age_limit: watch::Sender<Duration>,
    runtime: Handle,
    sweeper: JoinHandle<()>,
}

impl<V> Drop for Shared<V> {
    fn drop(&mut self) {
        self.sweeper.abort();
        debug!("Cache dropped, sweeper aborted");
    }
}

// == Memory Cache ==
/// Concurrent key/value cache bounded by total cost and entry age.
///
/// Cloning yields another handle to the same cache.
pub struct MemoryCache<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for MemoryCache<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

// == Builder ==
/// Configures and spawns a [`MemoryCache`].
pub struct CacheBuilder<V> {
    age_limit: Duration,
    cost_limit: u64,
    clock: Arc<dyn Clock>,
    runtime: Option<Handle>,
    _values: PhantomData<fn() -> V>,
}

impl<V: Send + Sync + 'static> CacheBuilder<V> {
    fn new() -> Self {
        Self {
            age_limit: Duration::ZERO,
            cost_limit: 0,
            clock: Arc::new(SystemClock),
            runtime: None,
            _values: PhantomData,
        }
    }

    /// Age limit to start with; zero disables age eviction.
    pub fn age_limit(mut self, limit: Duration) -> Self {
        self.age_limit = limit;
        self
    }

    /// Cost limit to start with; zero means unlimited.
    pub fn cost_limit(mut self, limit: u64) -> Self {
        self.cost_limit = limit;
        self
    }

    /// Time source for access stamps and sweep cutoffs.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runtime whose worker pool runs the cache.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Spawns the dispatcher and the age sweeper and returns the handle.
    ///
    /// # Panics
    /// Panics if no runtime was given and this is called outside one.
    pub fn build(self) -> MemoryCache<V> {
        let runtime = self.runtime.unwrap_or_else(Handle::current);

        let mut state = CacheState::new(self.clock);
        state.age_limit = self.age_limit;
        state.cost_limit = self.cost_limit;
        let state = Arc::new(RwLock::new(state));

        let (gate, rx) = Gate::channel();
        let (age_tx, age_rx) = watch::channel(self.age_limit);
        let sweeper = spawn_age_sweeper(&runtime, gate.clone(), age_rx);

        let shared = Arc::new(Shared {
            gate,
            age_limit: age_tx,
            runtime: runtime.clone(),
            sweeper,
        });
        runtime.spawn(dispatch(rx, state, Arc::downgrade(&shared)));

        info!(
            age_limit = ?self.age_limit,
            cost_limit = self.cost_limit,
            "Memory cache started"
        );
        MemoryCache { shared }
    }
}

impl<V: Send + Sync + 'static> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + Sync + 'static> MemoryCache<V> {
    // == Constructors ==
    /// Creates an unbounded cache on the current runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> CacheBuilder<V> {
        CacheBuilder::new()
    }

    /// Creates a cache on the current runtime with limits from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::builder()
            .age_limit(config.age_limit())
            .cost_limit(config.cost_limit)
            .build()
    }

    pub(crate) fn upgrade(shared: &Weak<Shared<V>>) -> Option<Self> {
        shared.upgrade().map(|shared| Self { shared })
    }

    fn gate(&self) -> &Gate<V> {
        &self.shared.gate
    }

    /// Runs `done` on the pool once `pending` resolves.
    fn on_done<R, F>(&self, pending: Pending<R>, done: F)
    where
        R: Send + 'static,
        F: FnOnce(&MemoryCache<V>, Option<R>) + Send + 'static,
    {
        let cache = self.clone();
        self.shared.runtime.spawn(async move {
            let result = pending.outcome().await;
            done(&cache, result);
        });
    }

    // == Get ==
    fn submit_get(&self, key: String) -> Pending<Option<Arc<V>>> {
        if key.is_empty() {
            debug!("Declined get with empty key");
            return Pending::ready("get", None);
        }

        self.gate().read("get", move |cache, state| {
            let Some(entry) = state.store.get(&key) else {
                state.counters.record_miss();
                return None;
            };
            state.counters.record_hit();
            let value = Arc::clone(&entry.value);

            // Refresh queued as its own write so the read never blocks on it.
            let _ = cache.gate().write("touch", move |_, state| state.touch(&key));
            Some(value)
        })
    }

    /// Returns the value stored under `key`, if any.
    ///
    /// A hit also queues a refresh of the entry's access time.
    pub async fn get(&self, key: impl Into<String>) -> Option<Arc<V>> {
        self.submit_get(key.into()).outcome().await.flatten()
    }

    pub fn get_then<F>(&self, key: impl Into<String>, done: F)
    where
        F: FnOnce(&MemoryCache<V>, &str, Option<Arc<V>>) + Send + 'static,
    {
        let key = key.into();
        let pending = self.submit_get(key.clone());
        self.on_done(pending, move |cache, value| done(cache, &key, value.flatten()));
    }

    pub fn get_blocking(&self, key: impl Into<String>) -> Option<Arc<V>> {
        self.submit_get(key.into()).outcome_blocking().flatten()
    }

    // == Set ==
    fn submit_set(&self, key: String, value: Arc<V>, cost: u64) -> Pending<()> {
        if key.is_empty() {
            debug!("Declined set with empty key");
            return Pending::ready("set", ());
        }

        self.gate().write("set", move |cache, state| {
            state.set_entry(cache, &key, value, cost);
        })
    }

    /// Stores `value` under `key` with a cost of zero.
    pub async fn set(&self, key: impl Into<String>, value: impl Into<Arc<V>>) {
        self.set_with_cost(key, value, 0).await;
    }

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// With a cost limit configured, entries are then evicted oldest first
    /// until the total cost fits, which can include this one.
    pub async fn set_with_cost(&self, key: impl Into<String>, value: impl Into<Arc<V>>, cost: u64) {
        self.submit_set(key.into(), value.into(), cost).outcome().await;
    }

    /// Queues a set and runs `done` with the stored value once it has run.
    pub fn set_then<F>(&self, key: impl Into<String>, value: impl Into<Arc<V>>, cost: u64, done: F)
    where
        F: FnOnce(&MemoryCache<V>, &str, Option<Arc<V>>) + Send + 'static,
    {
        let (key, value) = (key.into(), value.into());
        let pending = self.submit_set(key.clone(), Arc::clone(&value), cost);
        self.on_done(pending, move |cache, _| done(cache, &key, Some(value)));
    }

    pub fn set_blocking(&self, key: impl Into<String>, value: impl Into<Arc<V>>) {
        self.set_with_cost_blocking(key, value, 0);
    }

    pub fn set_with_cost_blocking(&self, key: impl Into<String>, value: impl Into<Arc<V>>, cost: u64) {
        self.submit_set(key.into(), value.into(), cost).outcome_blocking();
    }

    // == Remove ==
    fn submit_remove(&self, key: String) -> Pending<bool> {
        if key.is_empty() {
            debug!("Declined remove with empty key");
            return Pending::ready("remove", false);
        }

        self.gate().write("remove", move |cache, state| state.remove_entry(cache, &key))
    }

    /// Removes `key`. Returns whether an entry was present.
    pub async fn remove(&self, key: impl Into<String>) -> bool {
        self.submit_remove(key.into()).outcome().await.unwrap_or(false)
    }

    pub fn remove_then<F>(&self, key: impl Into<String>, done: F)
    where
        F: FnOnce(&MemoryCache<V>, &str, Option<Arc<V>>) + Send + 'static,
    {
        let key = key.into();
        let pending = self.submit_remove(key.clone());
        self.on_done(pending, move |cache, _| done(cache, &key, None));
    }

    pub fn remove_blocking(&self, key: impl Into<String>) -> bool {
        self.submit_remove(key.into()).outcome_blocking().unwrap_or(false)
    }

    // == Trim To Date ==
    fn submit_trim_to_date(&self, cutoff: DateTime<Utc>) -> Pending<usize> {
        self.gate()
            .write("trim_to_date", move |cache, state| state.trim_to_date(cache, cutoff))
    }

    /// Removes every entry last accessed strictly before `cutoff`.
    ///
    /// `DateTime::<Utc>::MIN_UTC` clears the cache. Returns the number of
    /// entries removed.
    pub async fn trim_to_date(&self, cutoff: DateTime<Utc>) -> usize {
        self.submit_trim_to_date(cutoff).outcome().await.unwrap_or(0)
    }

    pub fn trim_to_date_then<F>(&self, cutoff: DateTime<Utc>, done: F)
    where
        F: FnOnce(&MemoryCache<V>) + Send + 'static,
    {
        self.on_done(self.submit_trim_to_date(cutoff), move |cache, _| done(cache));
    }

    pub fn trim_to_date_blocking(&self, cutoff: DateTime<Utc>) -> usize {
        self.submit_trim_to_date(cutoff).outcome_blocking().unwrap_or(0)
    }

    // == Trim To Cost Limit ==
    fn submit_trim_to_cost_limit(&self, limit: u64) -> Pending<usize> {
        self.gate().write("trim_to_cost_limit", move |cache, state| {
            state.trim_to_cost_limit(cache, limit)
        })
    }

    /// Removes entries cheapest first until the total cost is at most
    /// `limit`. Returns the number of entries removed.
    pub async fn trim_to_cost_limit(&self, limit: u64) -> usize {
        self.submit_trim_to_cost_limit(limit).outcome().await.unwrap_or(0)
    }

    pub fn trim_to_cost_limit_then<F>(&self, limit: u64, done: F)
    where
        F: FnOnce(&MemoryCache<V>) + Send + 'static,
    {
        self.on_done(self.submit_trim_to_cost_limit(limit), move |cache, _| done(cache));
    }

    pub fn trim_to_cost_limit_blocking(&self, limit: u64) -> usize {
        self.submit_trim_to_cost_limit(limit).outcome_blocking().unwrap_or(0)
    }

    // == Trim To Cost Limit By Date ==
    fn submit_trim_to_cost_limit_by_date(&self, limit: u64) -> Pending<usize> {
        self.gate().write("trim_to_cost_limit_by_date", move |cache, state| {
            state.trim_to_cost_limit_by_date(cache, limit)
        })
    }

    /// Removes entries least recently accessed first until the total cost is
    /// at most `limit`. Returns the number of entries removed.
    pub async fn trim_to_cost_limit_by_date(&self, limit: u64) -> usize {
        self.submit_trim_to_cost_limit_by_date(limit).outcome().await.unwrap_or(0)
    }

    pub fn trim_to_cost_limit_by_date_then<F>(&self, limit: u64, done: F)
    where
        F: FnOnce(&MemoryCache<V>) + Send + 'static,
    {
        self.on_done(self.submit_trim_to_cost_limit_by_date(limit), move |cache, _| done(cache));
    }

    pub fn trim_to_cost_limit_by_date_blocking(&self, limit: u64) -> usize {
        self.submit_trim_to_cost_limit_by_date(limit)
            .outcome_blocking()
            .unwrap_or(0)
    }

    // == Clear ==
    fn submit_clear(&self) -> Pending<usize> {
        self.gate().write("clear", |cache, state| {
            let removed = state.clear(cache);
            info!("Cache cleared: removed {} entries", removed);
            removed
        })
    }

    /// Removes every entry, firing the remove hooks once per entry.
    ///
    /// This is the entry point for memory-pressure style notifications.
    pub async fn clear(&self) -> usize {
        self.submit_clear().outcome().await.unwrap_or(0)
    }

    pub fn clear_then<F>(&self, done: F)
    where
        F: FnOnce(&MemoryCache<V>) + Send + 'static,
    {
        self.on_done(self.submit_clear(), move |cache, _| done(cache));
    }

    pub fn clear_blocking(&self) -> usize {
        self.submit_clear().outcome_blocking().unwrap_or(0)
    }

    // == Age Limit ==
    fn submit_set_age_limit(&self, limit: Duration) -> Pending<()> {
        self.gate().write("set_age_limit", move |cache, state| {
            state.age_limit = limit;
            if !limit.is_zero() {
                let cutoff = cutoff_for(state.clock.now(), limit);
                state.trim_to_date(cache, cutoff);
            }
            cache.shared.age_limit.send_replace(limit);
            info!(?limit, "Age limit updated");
        })
    }

    pub async fn age_limit(&self) -> Duration {
        self.gate()
            .read("age_limit", |_, state| state.age_limit)
            .outcome()
            .await
            .unwrap_or_default()
    }

    pub fn age_limit_blocking(&self) -> Duration {
        self.gate()
            .read("age_limit", |_, state| state.age_limit)
            .outcome_blocking()
            .unwrap_or_default()
    }

    /// Sets the age limit; zero disables age eviction.
    ///
    /// A positive limit trims stale entries right away and restarts the
    /// sweeper on the new interval.
    pub async fn set_age_limit(&self, limit: Duration) {
        self.submit_set_age_limit(limit).outcome().await;
    }

    pub fn set_age_limit_blocking(&self, limit: Duration) {
        self.submit_set_age_limit(limit).outcome_blocking();
    }

    // == Cost Limit ==
    fn submit_set_cost_limit(&self, limit: u64) -> Pending<()> {
        self.gate().write("set_cost_limit", move |cache, state| {
            state.cost_limit = limit;
            if limit > 0 {
                state.trim_to_cost_limit_by_date(cache, limit);
            }
            info!(limit, "Cost limit updated");
        })
    }

    pub async fn cost_limit(&self) -> u64 {
        self.gate()
            .read("cost_limit", |_, state| state.cost_limit)
            .outcome()
            .await
            .unwrap_or_default()
    }

    pub fn cost_limit_blocking(&self) -> u64 {
        self.gate()
            .read("cost_limit", |_, state| state.cost_limit)
            .outcome_blocking()
            .unwrap_or_default()
    }

    /// Sets the cost limit; zero means unlimited.
    ///
    /// A positive limit is enforced before this returns, evicting least
    /// recently accessed entries first.
    pub async fn set_cost_limit(&self, limit: u64) {
        self.submit_set_cost_limit(limit).outcome().await;
    }

    pub fn set_cost_limit_blocking(&self, limit: u64) {
        self.submit_set_cost_limit(limit).outcome_blocking();
    }

    // == Hooks ==
    fn submit_replace_hook(&self, kind: HookKind, hook: Option<Hook<V>>) -> Pending<()> {
        self.gate()
            .write("set_hook", move |_, state| state.hooks.set(kind, hook))
    }

    /// Returns the hook attached to `kind`, if any.
    pub async fn hook(&self, kind: HookKind) -> Option<Hook<V>> {
        self.gate()
            .read("hook", move |_, state| state.hooks.get(kind))
            .outcome()
            .await
            .flatten()
    }

    pub fn hook_blocking(&self, kind: HookKind) -> Option<Hook<V>> {
        self.gate()
            .read("hook", move |_, state| state.hooks.get(kind))
            .outcome_blocking()
            .flatten()
    }

    /// Attaches `hook` to `kind`, replacing any previous one.
    ///
    /// The hook runs inside the write performing the mutation and must not
    /// call this cache's blocking API.
    pub async fn set_hook<F>(&self, kind: HookKind, hook: F)
    where
        F: Fn(&MemoryCache<V>, &str, Option<&Arc<V>>) + Send + Sync + 'static,
    {
        let hook: Hook<V> = Arc::new(hook);
        self.submit_replace_hook(kind, Some(hook)).outcome().await;
    }

    pub fn set_hook_blocking<F>(&self, kind: HookKind, hook: F)
    where
        F: Fn(&MemoryCache<V>, &str, Option<&Arc<V>>) + Send + Sync + 'static,
    {
        let hook: Hook<V> = Arc::new(hook);
        self.submit_replace_hook(kind, Some(hook)).outcome_blocking();
    }

    pub async fn clear_hook(&self, kind: HookKind) {
        self.submit_replace_hook(kind, None).outcome().await;
    }

    pub fn clear_hook_blocking(&self, kind: HookKind) {
        self.submit_replace_hook(kind, None).outcome_blocking();
    }

    // == Inspection ==
    /// Sum of the costs of all entries.
    pub async fn total_cost(&self) -> u64 {
        self.gate()
            .read("total_cost", |_, state| state.store.total_cost())
            .outcome()
            .await
            .unwrap_or(0)
    }

    pub fn total_cost_blocking(&self) -> u64 {
        self.gate()
            .read("total_cost", |_, state| state.store.total_cost())
            .outcome_blocking()
            .unwrap_or(0)
    }

    pub async fn len(&self) -> usize {
        self.gate()
            .read("len", |_, state| state.store.len())
            .outcome()
            .await
            .unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Checks for `key` without counting a hit or refreshing access time.
    pub async fn contains_key(&self, key: impl Into<String>) -> bool {
        let key = key.into();
        self.gate()
            .read("contains_key", move |_, state| state.store.contains_key(&key))
            .outcome()
            .await
            .unwrap_or(false)
    }

    pub async fn stats(&self) -> CacheStats {
        self.gate()
            .read("stats", |_, state| state.stats())
            .outcome()
            .await
            .unwrap_or_default()
    }

    pub fn stats_blocking(&self) -> CacheStats {
        self.gate()
            .read("stats", |_, state| state.stats())
            .outcome_blocking()
            .unwrap_or_default()
    }

    /// Visits every entry, least recently accessed first, under a read.
    ///
    /// Does not refresh access times.
    pub async fn enumerate<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &Arc<V>) + Send + 'static,
    {
        self.gate()
            .read("enumerate", move |_, state| {
                for (key, entry) in state.store.iter_by_recency() {
                    visit(key, &entry.value);
                }
            })
            .outcome()
            .await;
    }

    /// Recomputes the cost total by full scan and compares it with the
    /// running total. Used by tests to check the bookkeeping.
    pub async fn verify_total_cost(&self) -> bool {
        self.gate()
            .read("verify_total_cost", |_, state| {
                state.store.recomputed_cost() == state.store.total_cost()
            })
            .outcome()
            .await
            .unwrap_or(false)
    }
}
