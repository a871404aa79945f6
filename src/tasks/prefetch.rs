//! Prefetch Tasks
//!
//! The drain loop turns due queue items into `prefetch` events. The optional
//! fetcher bridge listens for those events and loads the predicted keys.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{AdaptiveCache, CacheEvent, SetOptions, WeakCache};
use crate::tasks::{ticker, Shutdown};

/// Spawns the prefetch drain loop.
///
/// Every `prefetch_interval_ms` up to `prefetch_batch_size` due items are
/// released. Each drain runs on its own task so a panic only loses that tick.
pub fn spawn_prefetch_task<V>(
    cache: WeakCache<V>,
    shutdown: Arc<Shutdown>,
    prefetch_interval_ms: u64,
) -> JoinHandle<()>
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            "Starting prefetch task with interval of {}ms",
            prefetch_interval_ms
        );
        let mut interval = ticker(prefetch_interval_ms);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = interval.tick() => {}
            }

            let Some(live) = cache.upgrade() else {
                break;
            };
            match tokio::spawn(async move { live.drain_prefetch_queue().await }).await {
                Ok(delivered) if !delivered.is_empty() => {
                    debug!("Emitted {} prefetch intents", delivered.len());
                }
                Ok(_) => {}
                Err(e) => error!("Prefetch drain failed: {}", e),
            }
        }

        info!("Prefetch task stopped");
    })
}

/// Connects an external loader to the cache's prefetch intents.
///
/// `fetch` is called with each predicted key on its own task. `Ok(Some(..))`
/// is stored as a prefetched entry, `Ok(None)` means the source has nothing
/// for the key, and errors are logged and dropped. The bridge stops once the
/// cache is dropped.
pub fn spawn_prefetch_fetcher<V, F, Fut>(cache: &AdaptiveCache<V>, fetch: F) -> JoinHandle<()>
where
    V: Clone + Serialize + Send + Sync + 'static,
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<(V, SetOptions)>>> + Send + 'static,
{
    let mut events = cache.subscribe();
    let cache = cache.downgrade();
    let fetch = Arc::new(fetch);

    tokio::spawn(async move {
        loop {
            let key = match events.recv().await {
                Ok(CacheEvent::Prefetch { key, .. }) => key,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Prefetch fetcher lagged; {} events skipped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let Some(live) = cache.upgrade() else {
                break;
            };
            let fetch = Arc::clone(&fetch);
            tokio::spawn(async move {
                match (*fetch)(key.clone()).await {
                    Ok(Some((value, options))) => {
                        if let Err(e) = live.set(key.as_str(), value, options.prefetched()).await {
                            warn!("Failed to store prefetched {}: {}", key, e);
                        }
                    }
                    Ok(None) => debug!("Nothing to prefetch for {}", key),
                    Err(e) => warn!("Prefetch of {} failed: {:#}", key, e),
                }
            });
        }
        debug!("Prefetch fetcher stopped");
    })
}
