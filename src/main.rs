//! Mini Cache - Synthetic workload harness
//!
//! Runs a writer and a reader against one cache so the limits, the sweeper
//! and the hooks can be watched in the logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_cache::{Config, HookKind, MemoryCache};

/// Entry point for the workload harness.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache with the configured limits
/// 4. Start writer, reader and stats reporter tasks
/// 5. Clear the cache on SIGUSR1 (memory pressure stand-in)
/// 6. Stop on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mini Cache workload harness");

    let config = Config::from_env();
    info!(
        "Configuration loaded: age_limit={}s, cost_limit={}, report_interval={}s",
        config.age_limit_secs, config.cost_limit, config.report_interval_secs
    );

    let cache: MemoryCache<Vec<u8>> = MemoryCache::from_config(&config);

    let evicted_bytes = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&evicted_bytes);
    cache
        .set_hook(HookKind::WillRemove, move |_, _, value| {
            if let Some(value) = value {
                counter.fetch_add(value.len() as u64, Ordering::Relaxed);
            }
        })
        .await;

    let tasks = vec![
        spawn_writer(cache.clone()),
        spawn_reader(cache.clone()),
        spawn_reporter(cache.clone(), Arc::clone(&evicted_bytes), config.report_interval_secs),
    ];

    wait_for_shutdown(&cache).await?;

    for task in &tasks {
        task.abort();
    }
    warn!("Workload tasks aborted");

    let stats = cache.stats().await;
    info!("Final stats: {}", serde_json::to_string(&stats)?);
    info!("Harness shutdown complete");
    Ok(())
}

/// Writes a payload every few milliseconds; cost is the payload size.
fn spawn_writer(cache: MemoryCache<Vec<u8>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut n: u64 = 0;
        loop {
            let size = 64 + (n % 16) * 64;
            cache
                .set_with_cost(format!("item-{}", n % 1024), vec![0u8; size as usize], size)
                .await;
            n += 1;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}

/// Reads a sliding window of recent keys so some entries stay warm.
fn spawn_reader(cache: MemoryCache<Vec<u8>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut n: u64 = 0;
        loop {
            cache.get(format!("item-{}", n % 64)).await;
            n += 1;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
}

/// Logs a JSON stats report every `interval_secs` seconds.
fn spawn_reporter(
    cache: MemoryCache<Vec<u8>>,
    evicted_bytes: Arc<AtomicU64>,
    interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let stats = cache.stats().await;
            match serde_json::to_string(&stats) {
                Ok(json) => info!(
                    removed_bytes = evicted_bytes.load(Ordering::Relaxed),
                    hit_rate = stats.hit_rate(),
                    "Stats: {}",
                    json
                ),
                Err(err) => warn!(%err, "Failed to encode stats"),
            }
        }
    })
}

/// Waits for Ctrl+C or SIGTERM, clearing the cache on every SIGUSR1.
async fn wait_for_shutdown(cache: &MemoryCache<Vec<u8>>) -> Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal as unix_signal, SignalKind};

        let mut terminate = unix_signal(SignalKind::terminate())?;
        let mut pressure = unix_signal(SignalKind::user_defined1())?;

        loop {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received Ctrl+C, initiating shutdown...");
                    return Ok(());
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM, initiating shutdown...");
                    return Ok(());
                }
                _ = pressure.recv() => {
                    info!("Received SIGUSR1, clearing cache");
                    cache.clear().await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = cache;
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating shutdown...");
        Ok(())
    }
}
