//! Age Sweeper Task
//!
//! Background task that periodically trims entries past the age limit.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{cutoff_for, Gate};

/// Spawns the age sweeper for one cache.
///
/// The task idles while the published age limit is zero. Once it is positive
/// the task sleeps for one limit's worth, then queues an age trim through the
/// gate, and repeats. A new limit restarts the wait with the new interval.
///
/// The trim re-checks the cache's current limit when it runs and does
/// nothing if the limit moved on while it sat in the queue.
///
/// The task holds no handle to the cache, only a gate sender and the limit
/// receiver. It stops when the limit sender is dropped or the gate closes.
///
/// # Arguments
/// * `runtime` - Runtime to spawn on
/// * `gate` - Submission side of the cache's command queue
/// * `age_limit` - Receiver of the published age limit
///
/// # Returns
/// A JoinHandle for the spawned task, which the cache aborts when dropped.
pub(crate) fn spawn_age_sweeper<V: Send + Sync + 'static>(
    runtime: &Handle,
    gate: Gate<V>,
    mut age_limit: watch::Receiver<Duration>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        debug!("Age sweeper started");

        loop {
            let limit = *age_limit.borrow_and_update();

            if limit.is_zero() {
                if age_limit.changed().await.is_err() {
                    break;
                }
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(limit) => {
                    let sweep = gate.write("age sweep", move |cache, state| {
                        if state.age_limit != limit {
                            return 0;
                        }
                        let cutoff = cutoff_for(state.clock.now(), limit);
                        state.trim_to_date(cache, cutoff)
                    });

                    match sweep.wait().await {
                        Ok(0) => debug!("Age sweep: no stale entries found"),
                        Ok(removed) => info!("Age sweep: removed {} stale entries", removed),
                        Err(err) => {
                            warn!(%err, "Age sweeper stopping");
                            break;
                        }
                    }
                }
                changed = age_limit.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Age sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn test_sweeper_stops_when_limit_sender_dropped() {
        let (gate, _rx) = Gate::<String>::channel();
        let (tx, rx) = watch::channel(Duration::ZERO);

        let handle = spawn_age_sweeper(&Handle::current(), gate, rx);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("Sweeper should stop once the limit sender is gone")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_gate_closed() {
        let (gate, rx) = Gate::<String>::channel();
        drop(rx);
        let (_tx, limits) = watch::channel(Duration::from_millis(20));

        let handle = spawn_age_sweeper(&Handle::current(), gate, limits);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("Sweeper should stop once the gate is closed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_removes_stale_entries() {
        let cache = MemoryCache::<String>::new();
        cache.set("stale", "value".to_string()).await;
        cache.set_age_limit(Duration::from_millis(200)).await;

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert!(cache.get("stale").await.is_none(), "Stale entry should be swept");
    }

    #[tokio::test]
    async fn test_sweeper_preserves_fresh_entries() {
        let cache = MemoryCache::<String>::new();
        cache.set_age_limit(Duration::from_secs(3600)).await;
        cache.set("fresh", "value".to_string()).await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.get("fresh").await.as_deref(), Some(&"value".to_string()));
    }
}
