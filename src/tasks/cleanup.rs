//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries and idle
//! access patterns.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::{AdaptiveCache, WeakCache};
use crate::tasks::{ticker, Shutdown};

/// Spawns the expiry sweep loop.
///
/// The first sweep runs one interval after start. Each sweep runs on its own
/// task so a panic only loses that tick. The loop ends when `shutdown` fires
/// or the last cache handle is dropped.
pub fn spawn_cleanup_task<V>(
    cache: WeakCache<V>,
    shutdown: Arc<Shutdown>,
    cleanup_interval_ms: u64,
) -> JoinHandle<()>
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            "Starting expiry sweep task with interval of {}ms",
            cleanup_interval_ms
        );
        let mut interval = ticker(cleanup_interval_ms);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = interval.tick() => {}
            }

            let Some(live) = cache.upgrade() else {
                break;
            };
            match tokio::spawn(sweep(live)).await {
                Ok(()) => {}
                Err(e) => error!("Expiry sweep failed: {}", e),
            }
        }

        info!("Expiry sweep task stopped");
    })
}

async fn sweep<V>(cache: AdaptiveCache<V>)
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    let report = cache.cleanup_expired().await;

    if report.expired_count > 0 {
        info!(
            "Expiry sweep: removed {} entries ({} bytes), {} remaining",
            report.expired_count, report.freed_bytes, report.remaining_entries
        );
        let stats = cache.snapshot().await;
        info!(
            "Cache stats: hit_rate={:.1}%, prefetch_hit_rate={:.1}%, entries={}, memory={:.2}MB, health={:.0}",
            stats.hit_rate * 100.0,
            stats.prefetch_hit_rate * 100.0,
            stats.total_entries,
            stats.memory_usage_mb,
            stats.health_score
        );
    } else {
        debug!("Expiry sweep: no expired entries found");
    }
    if report.stale_patterns > 0 {
        debug!("Dropped {} idle access patterns", report.stale_patterns);
    }
}
