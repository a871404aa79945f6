//! Adaptive Cache Module
//!
//! Thread-safe cache handle combining the entry store, access tracking,
//! dynamic TTLs, score-based eviction and the prefetch queue.
//!
//! # Locking
//! - The entry store sits behind an async `RwLock`. Reads share it; lazy
//!   expiry re-acquires it for writing and re-checks before deleting.
//! - The tracker and the prefetch queue each have their own short-lived
//!   `parking_lot::Mutex`, never held across an `.await`.
//! - Lock order is store → tracker → queue. `set` performs the capacity check,
//!   eviction and insert inside one write-lock section.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::entry::estimate_memory_usage;
use crate::cache::eviction::{capacity_batch, select_for_eviction, EvictionCandidate, EvictionReason};
use crate::cache::events::{CacheEvent, EventBus};
use crate::cache::patterns::{AccessContext, AccessRecord, AccessTracker, TemporalPrediction};
use crate::cache::prefetch::{PrefetchItem, PrefetchQueue};
use crate::cache::stats::{CacheStats, PerformanceReport, ResidentState, StatsSnapshot};
use crate::cache::store::EntryStore;
use crate::cache::ttl::TtlCalculator;
use crate::cache::{CacheEntry, SetOptions, MAX_KEY_LENGTH};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_cleanup_task, spawn_prefetch_task, Shutdown};

/// Expired keys removed per write-lock acquisition during a sweep.
pub const SWEEP_CHUNK_SIZE: usize = 512;

/// Per-key predicate used by [`Invalidation::Predicate`]. An `Err` skips the
/// key without aborting the scan.
pub type EntryPredicate<V> = Box<dyn Fn(&str, &CacheEntry<V>) -> Result<bool> + Send + Sync>;

/// What to invalidate.
pub enum Invalidation<V> {
    /// One exact key
    Key(String),
    /// Every key matching a regular expression
    Pattern(String),
    /// Every entry the predicate accepts
    Predicate(EntryPredicate<V>),
}

impl<V> Invalidation<V> {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str, &CacheEntry<V>) -> Result<bool> + Send + Sync + 'static,
    {
        Invalidation::Predicate(Box::new(f))
    }

    fn describe(&self) -> String {
        match self {
            Invalidation::Key(key) => key.clone(),
            Invalidation::Pattern(pattern) => pattern.clone(),
            Invalidation::Predicate(_) => "<predicate>".to_string(),
        }
    }
}

impl<V> fmt::Debug for Invalidation<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalidation({})", self.describe())
    }
}

/// Result of a successful `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SetOutcome {
    pub ttl_ms: u64,
    pub memory_usage: usize,
    /// Entries evicted to make room
    pub evicted: usize,
}

/// Result of `clear`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub cleared_entries: usize,
    pub freed_bytes: usize,
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub expired_count: usize,
    pub freed_bytes: usize,
    pub remaining_entries: usize,
    /// Access patterns dropped for inactivity
    pub stale_patterns: usize,
}

enum Lookup<V> {
    Hit {
        value: V,
        remaining_ttl_ms: u64,
        prefetch_hit: bool,
    },
    Expired,
    Missing,
}

struct CacheInner<V> {
    config: Config,
    clock: Arc<dyn Clock>,
    ttl: TtlCalculator,
    store: RwLock<EntryStore<V>>,
    tracker: Mutex<AccessTracker>,
    prefetch: Mutex<PrefetchQueue>,
    stats: CacheStats,
    events: EventBus<V>,
    shutdown: Arc<Shutdown>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

// == Adaptive Cache ==
/// Cloneable handle to one cache instance.
pub struct AdaptiveCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for AdaptiveCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for AdaptiveCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveCache")
            .field("max_size", &self.inner.config.max_size)
            .finish_non_exhaustive()
    }
}

/// Non-owning handle held by background tasks so they stop once every
/// [`AdaptiveCache`] clone is gone.
pub struct WeakCache<V> {
    inner: Weak<CacheInner<V>>,
}

impl<V> Clone for WeakCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<V> WeakCache<V> {
    pub fn upgrade(&self) -> Option<AdaptiveCache<V>> {
        self.inner.upgrade().map(|inner| AdaptiveCache { inner })
    }
}

impl<V> AdaptiveCache<V>
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    // == Constructors ==
    /// Builds a cache without background tasks. Call
    /// [`start_background_tasks`](Self::start_background_tasks) to run expiry
    /// sweeps and prefetch drains.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let inner = CacheInner {
            ttl: TtlCalculator::new(config.ttl_policies.clone(), config.default_ttl_ms),
            store: RwLock::new(EntryStore::new()),
            tracker: Mutex::new(AccessTracker::new()),
            prefetch: Mutex::new(PrefetchQueue::new(config.max_pending_prefetches)),
            stats: CacheStats::new(),
            events: EventBus::new(config.event_capacity),
            shutdown: Arc::new(Shutdown::new()),
            tasks: Mutex::new(Vec::new()),
            clock,
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Builds a cache and starts its background tasks. Must be called from
    /// within a Tokio runtime.
    pub fn start(config: Config) -> Result<Self> {
        let cache = Self::new(config)?;
        cache.start_background_tasks();
        Ok(cache)
    }

    /// Spawns the expiry sweep and prefetch drain loops.
    pub fn start_background_tasks(&self) {
        let mut tasks = self.inner.tasks.lock();
        if !tasks.is_empty() {
            return;
        }
        let config = &self.inner.config;
        tasks.push(spawn_cleanup_task(
            self.downgrade(),
            Arc::clone(&self.inner.shutdown),
            config.cleanup_interval_ms,
        ));
        tasks.push(spawn_prefetch_task(
            self.downgrade(),
            Arc::clone(&self.inner.shutdown),
            config.prefetch_interval_ms,
        ));
    }

    /// Stops the background loops and waits for them to finish. Foreground
    /// calls keep working afterwards.
    pub async fn shutdown(&self) {
        self.inner.shutdown.trigger();
        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        info!("Adaptive cache background tasks stopped");
    }

    pub fn downgrade(&self) -> WeakCache<V> {
        WeakCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent<V>> {
        self.inner.events.subscribe()
    }

    fn now(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    // == Get ==
    /// Retrieves a value by key.
    pub async fn get(&self, key: &str) -> Result<V> {
        self.get_with(key, AccessContext::default()).await
    }

    /// Retrieves a value, recording the caller's access context.
    ///
    /// Expired entries are removed on sight and reported as
    /// [`CacheError::Expired`]; absent keys as [`CacheError::NotFound`]. Both
    /// count as misses and may queue prefetches for related keys.
    pub async fn get_with(&self, key: &str, access: AccessContext) -> Result<V> {
        let now = self.now();

        let lookup = {
            let store = self.inner.store.read().await;
            match store.get(key) {
                Some(entry) if !entry.is_expired(now) => Lookup::Hit {
                    value: entry.value.clone(),
                    remaining_ttl_ms: entry.ttl_remaining_ms(now),
                    prefetch_hit: entry.mark_accessed(),
                },
                Some(_) => Lookup::Expired,
                None => Lookup::Missing,
            }
        };

        self.inner.tracker.lock().record_access(key, now, &access);
        self.schedule_temporal_prefetch(key, now);

        match lookup {
            Lookup::Hit {
                value,
                remaining_ttl_ms,
                prefetch_hit,
            } => {
                self.inner.stats.record_hit(prefetch_hit);
                debug!("Cache hit: {} ({}ms left)", key, remaining_ttl_ms);
                if self.inner.events.has_subscribers() {
                    self.inner.events.emit(CacheEvent::Hit {
                        key: key.to_string(),
                        value: value.clone(),
                        remaining_ttl_ms,
                    });
                }
                Ok(value)
            }
            Lookup::Expired => {
                let removed = self.inner.store.write().await.remove_if_expired(key, now);
                if removed.is_some() {
                    self.inner.stats.record_expirations(1);
                }
                self.on_miss(key, access, now).await;
                Err(CacheError::Expired(key.to_string()))
            }
            Lookup::Missing => {
                self.on_miss(key, access, now).await;
                Err(CacheError::NotFound(key.to_string()))
            }
        }
    }

    async fn on_miss(&self, key: &str, access: AccessContext, now: u64) {
        self.inner.stats.record_miss();
        debug!("Cache miss: {}", key);

        let related = self.predict_related(key).await;
        if !related.is_empty() {
            let mut queue = self.inner.prefetch.lock();
            for related_key in related {
                if !queue.push(PrefetchItem::relation(related_key.as_str(), key, now)) {
                    debug!("Prefetch queue full; dropping {}", related_key);
                }
            }
        }

        self.inner.events.emit(CacheEvent::Miss {
            key: key.to_string(),
            access,
        });
    }

    fn schedule_temporal_prefetch(&self, key: &str, now: u64) {
        let Some(prediction) = self.inner.tracker.lock().predict_temporal(key) else {
            return;
        };
        let item = PrefetchItem::temporal(key, prediction.next_access_ms, prediction.consistency, now);
        let scheduled_at = item.scheduled_at;
        if self.inner.prefetch.lock().push(item) {
            debug!(
                "Temporal prefetch for {} scheduled at {} (consistency {:.2})",
                key, scheduled_at, prediction.consistency
            );
        }
    }

    // == Set ==
    /// Stores a value with a TTL derived from `options` and the key's access
    /// history, evicting a batch of low-scoring entries first when a new key
    /// arrives at a full store.
    ///
    /// With a memory budget configured, a write that would push the stored
    /// bytes over it first sheds low-scoring entries down to 80% of the
    /// budget. A single value larger than the whole budget is rejected.
    pub async fn set(&self, key: impl Into<String>, value: V, options: SetOptions) -> Result<SetOutcome> {
        let key = key.into();
        validate_key(&key)?;

        let now = self.now();
        let memory_usage = estimate_memory_usage(&value);
        let record = self.inner.tracker.lock().record(&key).copied();
        let ttl_ms = self.inner.ttl.compute(&options, record.as_ref());
        let entry = CacheEntry::new(value, now, ttl_ms, &options, memory_usage);

        if let Some(budget) = self.inner.config.max_memory_bytes {
            if memory_usage > budget {
                return Err(CacheError::InvalidRequest(format!(
                    "Value of {} bytes exceeds the memory budget of {} bytes",
                    memory_usage, budget
                )));
            }
        }

        let (shed, evicted, total_entries) = {
            let mut store = self.inner.store.write().await;
            let mut shed = Vec::new();
            if let Some(budget) = self.inner.config.max_memory_bytes {
                let replaced = store.get(&key).map_or(0, |e| e.memory_usage);
                if store.bytes_stored().saturating_sub(replaced) + memory_usage > budget {
                    let target = budget - budget / 5;
                    shed = self.shed_memory_locked(&mut store, &key, memory_usage, target, now);
                }
            }
            let mut evicted = Vec::new();
            if !store.contains(&key) && store.len() >= self.inner.config.max_size {
                let batch = capacity_batch(self.inner.config.max_size);
                evicted = self.evict_locked(&mut store, batch, now);
            }
            store.insert(key.clone(), entry);
            (shed, evicted, store.len())
        };

        self.report_evictions(&shed, EvictionReason::Memory);
        self.report_evictions(&evicted, EvictionReason::Capacity);
        debug!(
            "Cache set: {} (category={}, ttl={}ms, size={}B)",
            key, options.category, ttl_ms, memory_usage
        );
        self.inner.events.emit(CacheEvent::Set {
            key,
            ttl_ms,
            category: options.category,
            memory_usage,
            total_entries,
        });

        Ok(SetOutcome {
            ttl_ms,
            memory_usage,
            evicted: shed.len() + evicted.len(),
        })
    }

    fn evict_locked(&self, store: &mut EntryStore<V>, n: usize, now: u64) -> Vec<EvictionCandidate> {
        let victims = {
            let tracker = self.inner.tracker.lock();
            select_for_eviction(store, &tracker, now, n)
        };
        for victim in &victims {
            store.remove(&victim.key);
        }
        victims
    }

    /// Removes the lowest-scoring entries, never `key` itself, until the
    /// store plus the incoming value fits in `target` bytes.
    fn shed_memory_locked(
        &self,
        store: &mut EntryStore<V>,
        key: &str,
        incoming: usize,
        target: usize,
        now: u64,
    ) -> Vec<EvictionCandidate> {
        let ranked = {
            let tracker = self.inner.tracker.lock();
            select_for_eviction(store, &tracker, now, store.len())
        };
        let replaced = store.get(key).map_or(0, |e| e.memory_usage);
        let mut shed = Vec::new();
        for candidate in ranked {
            if store.bytes_stored().saturating_sub(replaced) + incoming <= target {
                break;
            }
            if candidate.key == key {
                continue;
            }
            store.remove(&candidate.key);
            shed.push(candidate);
        }
        shed
    }

    fn report_evictions(&self, evicted: &[EvictionCandidate], reason: EvictionReason) {
        if evicted.is_empty() {
            return;
        }
        self.inner.stats.record_evictions(evicted.len());
        info!("Evicted {} entries ({:?})", evicted.len(), reason);
        for victim in evicted {
            self.inner.events.emit(CacheEvent::Evict {
                key: victim.key.clone(),
                reason,
                score: victim.score,
            });
        }
    }

    /// Evicts the `n` lowest-scoring entries on demand.
    pub async fn evict_lowest(&self, n: usize) -> Vec<EvictionCandidate> {
        let now = self.now();
        let evicted = {
            let mut store = self.inner.store.write().await;
            self.evict_locked(&mut store, n, now)
        };
        self.report_evictions(&evicted, EvictionReason::LruPriority);
        evicted
    }

    // == Invalidation ==
    /// Removes every entry selected by `invalidation` and returns how many
    /// were removed.
    ///
    /// Patterns are regular expressions; one that fails to compile is
    /// rejected before anything is touched. Predicate errors skip only the
    /// offending key.
    pub async fn invalidate(&self, invalidation: Invalidation<V>) -> Result<usize> {
        let description = invalidation.describe();
        let removed = match invalidation {
            Invalidation::Key(key) => {
                usize::from(self.inner.store.write().await.remove(&key).is_some())
            }
            Invalidation::Pattern(pattern) => {
                let regex = Regex::new(&pattern)?;
                let mut store = self.inner.store.write().await;
                let matching: Vec<String> =
                    store.keys().filter(|key| regex.is_match(key)).cloned().collect();
                matching.iter().filter(|key| store.remove(key).is_some()).count()
            }
            Invalidation::Predicate(predicate) => {
                let mut store = self.inner.store.write().await;
                let mut matching = Vec::new();
                for (key, entry) in store.iter() {
                    match predicate(key.as_str(), entry) {
                        Ok(true) => matching.push(key.clone()),
                        Ok(false) => {}
                        Err(e) => warn!("Skipping {} during invalidation: {}", key, e),
                    }
                }
                matching.iter().filter(|key| store.remove(key).is_some()).count()
            }
        };

        if removed > 0 {
            info!("Invalidated {} entries matching {}", removed, description);
        }
        self.inner.events.emit(CacheEvent::Invalidate {
            pattern: description,
            invalidated_count: removed,
        });
        Ok(removed)
    }

    // == Delete ==
    /// Removes a single key.
    pub async fn delete(&self, key: &str) -> Result<()> {
        match self.invalidate(Invalidation::Key(key.to_string())).await? {
            0 => Err(CacheError::NotFound(key.to_string())),
            _ => Ok(()),
        }
    }

    // == Clear ==
    /// Removes every entry. Access history and pending prefetches are kept.
    pub async fn clear(&self) -> ClearReport {
        let (cleared_entries, freed_bytes) = self.inner.store.write().await.clear();
        info!("Cache cleared: {} entries, {} bytes", cleared_entries, freed_bytes);
        self.inner.events.emit(CacheEvent::Clear {
            cleared_entries,
            freed_bytes,
        });
        ClearReport {
            cleared_entries,
            freed_bytes,
        }
    }

    // == Cleanup Expired ==
    /// Removes expired entries in chunks, releasing the write lock between
    /// chunks, then drops access patterns idle for over a day.
    pub async fn cleanup_expired(&self) -> CleanupReport {
        let now = self.now();
        let expired = self.inner.store.read().await.expired_keys(now);

        let mut report = CleanupReport::default();
        for chunk in expired.chunks(SWEEP_CHUNK_SIZE) {
            {
                let mut store = self.inner.store.write().await;
                for key in chunk {
                    if let Some(entry) = store.remove_if_expired(key, now) {
                        report.expired_count += 1;
                        report.freed_bytes += entry.memory_usage;
                    }
                }
            }
            tokio::task::yield_now().await;
        }

        report.remaining_entries = self.inner.store.read().await.len();
        report.stale_patterns = self.inner.tracker.lock().sweep_stale(now);
        self.inner.stats.record_expirations(report.expired_count);

        self.inner.events.emit(CacheEvent::Cleanup {
            expired_count: report.expired_count,
            freed_bytes: report.freed_bytes,
            remaining_entries: report.remaining_entries,
        });
        report
    }

    // == Prefetch ==
    /// Emits intents for up to `prefetch_batch_size` due queue items whose
    /// keys are not resident, and returns the items that were delivered.
    /// Items nobody receives are dropped.
    pub async fn drain_prefetch_queue(&self) -> Vec<PrefetchItem> {
        let now = self.now();
        let due = self
            .inner
            .prefetch
            .lock()
            .pop_due(now, self.inner.config.prefetch_batch_size);
        if due.is_empty() {
            return due;
        }

        let wanted: Vec<PrefetchItem> = {
            let store = self.inner.store.read().await;
            due.into_iter().filter(|item| !store.is_live(&item.key, now)).collect()
        };

        let mut delivered = Vec::with_capacity(wanted.len());
        for item in wanted {
            let sent = self.inner.events.emit(CacheEvent::Prefetch {
                key: item.key.clone(),
                reason: item.reason,
                predicted_by: item.predicted_by.clone(),
            });
            if sent {
                self.inner.stats.record_prefetch_intent();
                delivered.push(item);
            } else {
                warn!("No prefetch fetcher listening; dropping intent for {}", item.key);
            }
        }
        delivered
    }

    /// Related keys of `key` that are neither resident nor already queued.
    pub async fn predict_related(&self, key: &str) -> Vec<String> {
        let related = self.inner.tracker.lock().related_keys(key);
        if related.is_empty() {
            return related;
        }

        let now = self.now();
        let absent: Vec<String> = {
            let store = self.inner.store.read().await;
            related.into_iter().filter(|k| !store.is_live(k, now)).collect()
        };
        let queue = self.inner.prefetch.lock();
        absent.into_iter().filter(|k| !queue.is_pending(k)).collect()
    }

    pub fn predict_temporal(&self, key: &str) -> Option<TemporalPrediction> {
        self.inner.tracker.lock().predict_temporal(key)
    }

    pub fn access_record(&self, key: &str) -> Option<AccessRecord> {
        self.inner.tracker.lock().record(key).copied()
    }

    pub fn pending_prefetches(&self) -> usize {
        self.inner.prefetch.lock().len()
    }

    /// Whether `key` is resident and unexpired. Does not count as an access.
    pub async fn contains(&self, key: &str) -> bool {
        let now = self.now();
        self.inner.store.read().await.is_live(key, now)
    }

    pub async fn len(&self) -> usize {
        self.inner.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.store.read().await.is_empty()
    }

    // == Metrics ==
    pub async fn snapshot(&self) -> StatsSnapshot {
        let (total_entries, bytes_stored) = {
            let store = self.inner.store.read().await;
            (store.len(), store.bytes_stored())
        };
        let resident = ResidentState {
            total_entries,
            bytes_stored,
            tracked_patterns: self.inner.tracker.lock().len(),
            pending_prefetches: self.inner.prefetch.lock().len(),
        };
        StatsSnapshot::new(
            self.inner.stats.counters(),
            resident,
            self.inner.config.hit_rate_target,
        )
    }

    pub async fn recommendations(&self) -> Vec<String> {
        self.snapshot().await.recommendations()
    }

    pub async fn performance_report(&self) -> PerformanceReport {
        let stats = self.snapshot().await;
        let categories = self.inner.store.read().await.category_usage();
        PerformanceReport::new(stats, categories)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::prefetch::PrefetchReason;
    use crate::cache::Priority;
    use std::time::Duration;

    fn cache_with(config: Config) -> (AdaptiveCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = AdaptiveCache::with_clock(config, clock.clone()).unwrap();
        (cache, clock)
    }

    fn test_cache() -> (AdaptiveCache<String>, Arc<ManualClock>) {
        cache_with(Config::default())
    }

    async fn assert_bytes_consistent(cache: &AdaptiveCache<String>) {
        let store = cache.inner.store.read().await;
        let summed: usize = store.iter().map(|(_, e)| e.memory_usage).sum();
        assert_eq!(store.bytes_stored(), summed);
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (cache, _) = test_cache();

        let outcome = cache
            .set("key1", "value1".to_string(), SetOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.ttl_ms, 300_000);
        assert_eq!(outcome.memory_usage, 8);

        assert_eq!(cache.get("key1").await.unwrap(), "value1");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (cache, _) = test_cache();
        let result = cache.get("nonexistent").await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (cache, _) = test_cache();
        cache.set("k", "a".to_string(), SetOptions::default()).await.unwrap();
        cache.set("k", "bbbb".to_string(), SetOptions::default()).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), "bbbb");
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.snapshot().await.bytes_stored, 6);
    }

    #[tokio::test]
    async fn test_lazy_expiry_removes_entry() {
        let (cache, clock) = test_cache();
        let outcome = cache
            .set("BTC", "42000".to_string(), SetOptions::category("market_data"))
            .await
            .unwrap();

        clock.advance(Duration::from_millis(outcome.ttl_ms - 1));
        assert!(cache.get("BTC").await.is_ok());

        clock.advance(Duration::from_millis(1));
        assert!(matches!(cache.get("BTC").await, Err(CacheError::Expired(_))));
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.snapshot().await.bytes_stored, 0);

        let snap = cache.snapshot().await;
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.expirations, 1);
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let (cache, _) = test_cache();
        let empty = cache.set("", "v".to_string(), SetOptions::default()).await;
        assert!(matches!(empty, Err(CacheError::InvalidRequest(_))));

        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);
        let long = cache.set(long_key, "v".to_string(), SetOptions::default()).await;
        assert!(matches!(long, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_capacity_eviction_removes_lowest_scores() {
        let config = Config {
            max_size: 10,
            ..Config::default()
        };
        let (cache, clock) = cache_with(config);

        for i in 0..10 {
            let priority = if i == 3 { Priority::Low } else { Priority::High };
            cache
                .set(
                    format!("k{}", i),
                    "v".to_string(),
                    SetOptions::default().with_priority(priority),
                )
                .await
                .unwrap();
            clock.advance(Duration::from_millis(10));
        }

        let outcome = cache.set("new", "v".to_string(), SetOptions::default()).await.unwrap();
        assert_eq!(outcome.evicted, 1);
        assert_eq!(cache.len().await, 10);
        assert!(!cache.contains("k3").await);
        assert!(cache.contains("new").await);
        assert_eq!(cache.snapshot().await.evictions, 1);
        assert_bytes_consistent(&cache).await;
    }

    fn budget_config(bytes: usize) -> Config {
        Config {
            max_memory_bytes: Some(bytes),
            ..Config::default()
        }
    }

    // "vvvvvvvv" serializes to 10 bytes
    async fn fill_ten(cache: &AdaptiveCache<String>, clock: &ManualClock) {
        for i in 0..10 {
            let priority = if i == 3 { Priority::Low } else { Priority::Normal };
            cache
                .set(
                    format!("k{}", i),
                    "v".repeat(8),
                    SetOptions::default().with_priority(priority),
                )
                .await
                .unwrap();
            clock.advance(Duration::from_millis(10));
        }
    }

    #[tokio::test]
    async fn test_memory_budget_sheds_to_eighty_percent() {
        let (cache, clock) = cache_with(budget_config(100));
        fill_ten(&cache, &clock).await;
        assert_eq!(cache.snapshot().await.bytes_stored, 100);

        let outcome = cache.set("new", "v".repeat(8), SetOptions::default()).await.unwrap();
        assert_eq!(outcome.evicted, 3);

        let stats = cache.snapshot().await;
        assert_eq!(stats.bytes_stored, 80);
        assert_eq!(stats.total_entries, 8);
        assert_eq!(stats.evictions, 3);
        assert!(!cache.contains("k3").await);
        assert!(!cache.contains("k0").await);
        assert!(!cache.contains("k1").await);
        assert!(cache.contains("new").await);
        assert_bytes_consistent(&cache).await;
    }

    #[tokio::test]
    async fn test_memory_budget_overwrite_keeps_its_own_key() {
        let (cache, clock) = cache_with(budget_config(100));
        fill_ten(&cache, &clock).await;
        let mut events = cache.subscribe();

        // 20 bytes replacing 10 pushes the total to 110
        let outcome = cache.set("k0", "v".repeat(18), SetOptions::default()).await.unwrap();
        assert_eq!(outcome.evicted, 3);
        assert_eq!(cache.get("k0").await.unwrap().len(), 18);
        assert_eq!(cache.snapshot().await.bytes_stored, 80);

        let mut memory_evictions = 0;
        while let Ok(event) = events.try_recv() {
            if let CacheEvent::Evict { key, reason, .. } = event {
                assert_eq!(reason, EvictionReason::Memory);
                assert_ne!(key, "k0");
                memory_evictions += 1;
            }
        }
        assert_eq!(memory_evictions, 3);
    }

    #[tokio::test]
    async fn test_no_memory_budget_never_sheds() {
        let (cache, _) = test_cache();
        for i in 0..50 {
            let outcome = cache
                .set(format!("k{}", i), "v".repeat(4_096), SetOptions::default())
                .await
                .unwrap();
            assert_eq!(outcome.evicted, 0);
        }
        assert_eq!(cache.len().await, 50);
        assert_eq!(cache.snapshot().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_value_larger_than_budget_rejected() {
        let (cache, _) = cache_with(budget_config(5));
        let result = cache.set("big", "v".repeat(8), SetOptions::default()).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let config = Config {
            max_size: 2,
            ..Config::default()
        };
        let (cache, _) = cache_with(config);
        cache.set("a", "1".to_string(), SetOptions::default()).await.unwrap();
        cache.set("b", "2".to_string(), SetOptions::default()).await.unwrap();

        let outcome = cache.set("a", "3".to_string(), SetOptions::default()).await.unwrap();
        assert_eq!(outcome.evicted, 0);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_evict_lowest_emits_events() {
        let (cache, _) = test_cache();
        let mut events = cache.subscribe();
        cache.set("a", "1".to_string(), SetOptions::default().with_priority(Priority::Low)).await.unwrap();
        cache.set("b", "2".to_string(), SetOptions::default()).await.unwrap();

        let evicted = cache.evict_lowest(1).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, "a");

        let mut saw_evict = false;
        while let Ok(event) = events.try_recv() {
            if let CacheEvent::Evict { key, reason, .. } = event {
                assert_eq!(key, "a");
                assert_eq!(reason, EvictionReason::LruPriority);
                saw_evict = true;
            }
        }
        assert!(saw_evict);
    }

    #[tokio::test]
    async fn test_invalidate_by_key_pattern_and_predicate() {
        let (cache, _) = test_cache();
        for key in ["price:BTC", "price:ETH", "risk:BTC", "risk:ETH"] {
            cache.set(key, key.to_string(), SetOptions::default()).await.unwrap();
        }

        assert_eq!(cache.invalidate(Invalidation::Key("missing".into())).await.unwrap(), 0);
        assert_eq!(cache.invalidate(Invalidation::Pattern("^price:".into())).await.unwrap(), 2);
        assert_eq!(cache.invalidate(Invalidation::Pattern("^nothing".into())).await.unwrap(), 0);

        let removed = cache
            .invalidate(Invalidation::predicate(|key, _entry| Ok(key.ends_with("ETH"))))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.contains("risk:BTC").await);
        assert_bytes_consistent(&cache).await;
    }

    #[tokio::test]
    async fn test_invalid_pattern_mutates_nothing() {
        let (cache, _) = test_cache();
        cache.set("a", "1".to_string(), SetOptions::default()).await.unwrap();

        let result = cache.invalidate(Invalidation::Pattern("(".into())).await;
        assert!(matches!(result, Err(CacheError::InvalidPattern(_))));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_failing_predicate_skips_only_that_key() {
        let (cache, _) = test_cache();
        for key in ["a", "b", "c"] {
            cache.set(key, key.to_string(), SetOptions::default()).await.unwrap();
        }

        let removed = cache
            .invalidate(Invalidation::predicate(|key, _| {
                if key == "b" {
                    Err(CacheError::Internal("cannot evaluate".into()))
                } else {
                    Ok(true)
                }
            }))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(cache.contains("b").await);
    }

    #[tokio::test]
    async fn test_delete() {
        let (cache, _) = test_cache();
        cache.set("a", "1".to_string(), SetOptions::default()).await.unwrap();

        cache.delete("a").await.unwrap();
        assert!(matches!(cache.delete("a").await, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_clear() {
        let (cache, _) = test_cache();
        cache.set("a", "1".to_string(), SetOptions::default()).await.unwrap();
        cache.set("b", "2".to_string(), SetOptions::default()).await.unwrap();

        let report = cache.clear().await;
        assert_eq!(report.cleared_entries, 2);
        assert_eq!(report.freed_bytes, 6);
        assert!(cache.is_empty().await);
        assert_eq!(cache.snapshot().await.bytes_stored, 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired_in_chunks() {
        let (cache, clock) = test_cache();
        for i in 0..(SWEEP_CHUNK_SIZE + 10) {
            cache
                .set(format!("md{}", i), "v".to_string(), SetOptions::category("order_book"))
                .await
                .unwrap();
        }
        cache
            .set("keeper", "v".to_string(), SetOptions::category("analysis_results"))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(10));
        let report = cache.cleanup_expired().await;
        assert_eq!(report.expired_count, SWEEP_CHUNK_SIZE + 10);
        assert_eq!(report.freed_bytes, (SWEEP_CHUNK_SIZE + 10) * 3);
        assert_eq!(report.remaining_entries, 1);
        assert_bytes_consistent(&cache).await;
    }

    #[tokio::test]
    async fn test_cleanup_drops_stale_patterns() {
        let (cache, clock) = test_cache();
        let _ = cache.get("ghost").await;
        assert_eq!(cache.snapshot().await.tracked_patterns, 1);

        clock.advance(Duration::from_secs(25 * 60 * 60));
        let report = cache.cleanup_expired().await;
        assert_eq!(report.stale_patterns, 1);
        assert_eq!(cache.snapshot().await.tracked_patterns, 0);
    }

    #[tokio::test]
    async fn test_miss_queues_related_keys() {
        let (cache, _) = test_cache();
        cache.set("ETH", "3000".to_string(), SetOptions::default()).await.unwrap();

        let access = AccessContext {
            related_keys: vec!["ETH".into(), "SOL".into(), "DOGE".into()],
            ..AccessContext::default()
        };
        let _ = cache.get_with("BTC", access).await;

        // ETH is resident, so only the absent keys are queued
        assert_eq!(cache.pending_prefetches(), 2);
        assert!(cache.predict_related("BTC").await.is_empty());
    }

    #[tokio::test]
    async fn test_drain_emits_intents_for_absent_keys() {
        let (cache, _) = test_cache();
        let mut events = cache.subscribe();
        let access = AccessContext {
            related_keys: vec!["SOL".into(), "DOGE".into()],
            ..AccessContext::default()
        };
        let _ = cache.get_with("BTC", access).await;

        // DOGE arrives before the drain and is skipped
        cache.set("DOGE", "0.1".to_string(), SetOptions::default()).await.unwrap();

        let delivered = cache.drain_prefetch_queue().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].key, "SOL");
        assert_eq!(delivered[0].reason, PrefetchReason::Relation);
        assert_eq!(cache.pending_prefetches(), 0);
        assert_eq!(cache.snapshot().await.prefetch_intents, 1);

        let mut saw_prefetch = false;
        while let Ok(event) = events.try_recv() {
            if let CacheEvent::Prefetch { key, predicted_by, .. } = event {
                assert_eq!(key, "SOL");
                assert_eq!(predicted_by, "BTC");
                saw_prefetch = true;
            }
        }
        assert!(saw_prefetch);
    }

    #[tokio::test]
    async fn test_drain_without_listener_drops_items() {
        let (cache, _) = test_cache();
        let access = AccessContext {
            related_keys: vec!["SOL".into()],
            ..AccessContext::default()
        };
        let _ = cache.get_with("BTC", access).await;

        assert!(cache.drain_prefetch_queue().await.is_empty());
        assert_eq!(cache.pending_prefetches(), 0);
        assert_eq!(cache.snapshot().await.prefetch_intents, 0);
    }

    #[tokio::test]
    async fn test_prefetch_hit_counted_once() {
        let (cache, _) = test_cache();
        cache
            .set("SOL", "150".to_string(), SetOptions::default().prefetched())
            .await
            .unwrap();

        cache.get("SOL").await.unwrap();
        cache.get("SOL").await.unwrap();

        let snap = cache.snapshot().await;
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.prefetch_hits, 1);
        assert!((snap.prefetch_hit_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_periodic_reads_schedule_temporal_prefetch() {
        let (cache, clock) = test_cache();
        cache
            .set("Y", "v".to_string(), SetOptions::category("analysis_results"))
            .await
            .unwrap();

        for i in 0..6 {
            if i > 0 {
                clock.advance(Duration::from_secs(60));
            }
            cache.get("Y").await.unwrap();
        }
        assert_eq!(cache.pending_prefetches(), 1);

        // still resident when the intent comes due
        let mut events = cache.subscribe();
        assert!(cache.drain_prefetch_queue().await.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_expired_periodic_key_is_requested_again() {
        let (cache, clock) = test_cache();
        let outcome = cache
            .set("Y", "v".to_string(), SetOptions::category("analysis_results"))
            .await
            .unwrap();

        for _ in 0..6 {
            let _ = cache.get("Y").await;
            clock.advance(Duration::from_secs(60));
        }
        clock.set(1_000_000 + outcome.ttl_ms + 60_000);

        let _events = cache.subscribe();
        let delivered = cache.drain_prefetch_queue().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].key, "Y");
        assert_eq!(delivered[0].reason, PrefetchReason::TemporalPrediction);
    }

    #[tokio::test]
    async fn test_frequent_access_lengthens_ttl() {
        let (cache, clock) = test_cache();
        let cold = cache
            .set("R", "v".to_string(), SetOptions::category("risk_metrics"))
            .await
            .unwrap();

        // reads keep counting after the first entry expires
        for _ in 0..12 {
            let _ = cache.get("R").await;
            clock.advance(Duration::from_secs(6));
        }
        let warm = cache
            .set("R", "v".to_string(), SetOptions::category("risk_metrics"))
            .await
            .unwrap();
        assert!(warm.ttl_ms > cold.ttl_ms);
    }

    #[tokio::test]
    async fn test_performance_report_breaks_down_categories() {
        let (cache, _) = test_cache();
        cache.set("a", "1".to_string(), SetOptions::category("market_data")).await.unwrap();
        cache.set("b", "2".to_string(), SetOptions::default()).await.unwrap();
        let _ = cache.get("a").await;

        let report = cache.performance_report().await;
        assert_eq!(report.categories["market_data"].entries, 1);
        assert_eq!(report.categories["default"].entries, 1);
        assert_eq!(report.stats.hits, 1);
        assert!(!report.generated_at.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = Config {
            max_size: 0,
            ..Config::default()
        };
        let result = AdaptiveCache::<String>::new(config);
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_background_tasks() {
        let cache: AdaptiveCache<String> = AdaptiveCache::start(Config::default()).unwrap();
        cache.shutdown().await;
        assert!(cache.inner.tasks.lock().is_empty());

        // foreground calls are unaffected
        cache.set("a", "1".to_string(), SetOptions::default()).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), "1");
    }
}
