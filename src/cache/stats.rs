//! Cache Statistics Module
//!
//! Lock-free counters plus the derived hit rate, health score and tuning
//! recommendations built from them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::store::CategoryUsage;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// == Cache Stats ==
/// Monotonic counters shared by all cache operations.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    prefetch_hits: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    prefetch_intents: AtomicU64,
}

/// Point-in-time copy of the raw counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub prefetch_hits: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub prefetch_intents: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, prefetch_hit: bool) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        if prefetch_hit {
            self.prefetch_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: usize) {
        self.expirations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_prefetch_intent(&self) {
        self.prefetch_intents.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> Counters {
        Counters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            prefetch_hits: self.prefetch_hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            prefetch_intents: self.prefetch_intents.load(Ordering::Relaxed),
        }
    }
}

// == Stats Snapshot ==
/// Counters plus derived metrics, as reported to metrics collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub prefetch_hits: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub prefetch_intents: u64,
    /// Always `hits + misses`
    pub total_requests: u64,
    pub total_entries: usize,
    pub bytes_stored: usize,
    pub memory_usage_mb: f64,
    pub tracked_patterns: usize,
    pub pending_prefetches: usize,
    pub hit_rate: f64,
    pub prefetch_hit_rate: f64,
    pub eviction_rate: f64,
    pub hit_rate_target: f64,
    /// 0–100
    pub health_score: f64,
}

/// Resident-state figures that come from the store and tracker rather than
/// the counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResidentState {
    pub total_entries: usize,
    pub bytes_stored: usize,
    pub tracked_patterns: usize,
    pub pending_prefetches: usize,
}

impl StatsSnapshot {
    pub fn new(counters: Counters, resident: ResidentState, hit_rate_target: f64) -> Self {
        let total_requests = counters.hits + counters.misses;
        let hit_rate = ratio(counters.hits, total_requests);
        let prefetch_hit_rate = ratio(counters.prefetch_hits, counters.hits);
        let eviction_rate = ratio(counters.evictions, total_requests);
        let memory_usage_mb = resident.bytes_stored as f64 / BYTES_PER_MB;

        let mut snapshot = Self {
            hits: counters.hits,
            misses: counters.misses,
            prefetch_hits: counters.prefetch_hits,
            evictions: counters.evictions,
            expirations: counters.expirations,
            prefetch_intents: counters.prefetch_intents,
            total_requests,
            total_entries: resident.total_entries,
            bytes_stored: resident.bytes_stored,
            memory_usage_mb,
            tracked_patterns: resident.tracked_patterns,
            pending_prefetches: resident.pending_prefetches,
            hit_rate,
            prefetch_hit_rate,
            eviction_rate,
            hit_rate_target,
            health_score: 0.0,
        };
        snapshot.health_score = snapshot.compute_health_score();
        snapshot
    }

    fn compute_health_score(&self) -> f64 {
        let mut score = 100.0;

        score -= (self.hit_rate_target * 100.0 - self.hit_rate * 100.0).max(0.0) * 0.5;

        if self.memory_usage_mb > 1000.0 {
            score -= 20.0;
        } else if self.memory_usage_mb > 500.0 {
            score -= 10.0;
        }

        if self.eviction_rate > 0.10 {
            score -= 15.0;
        } else if self.eviction_rate > 0.05 {
            score -= 5.0;
        }

        score.clamp(0.0, 100.0)
    }

    // == Recommendations ==
    /// Advisory tuning hints; nothing acts on them automatically.
    pub fn recommendations(&self) -> Vec<String> {
        let mut hints = Vec::new();

        if self.hit_rate < self.hit_rate_target {
            hints.push(format!(
                "Hit rate {:.1}% is below the {:.1}% target; consider longer TTLs or supplying related keys for prefetch",
                self.hit_rate * 100.0,
                self.hit_rate_target * 100.0
            ));
        }
        if self.memory_usage_mb > 500.0 {
            hints.push(format!(
                "Memory usage is high ({:.1} MB); consider lowering max_size or shortening TTLs",
                self.memory_usage_mb
            ));
        }
        if self.prefetch_intents > 0 && self.prefetch_hit_rate < 0.2 {
            hints.push(format!(
                "Prefetch effectiveness is low ({:.1}% of hits); review the related keys supplied on access",
                self.prefetch_hit_rate * 100.0
            ));
        }
        if self.eviction_rate > 0.05 {
            hints.push(format!(
                "Eviction rate is high ({:.1}% of requests); consider raising max_size",
                self.eviction_rate * 100.0
            ));
        }

        hints
    }
}

/// Snapshot, recommendations and per-category usage in one document.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    /// RFC 3339 timestamp
    pub generated_at: String,
    pub stats: StatsSnapshot,
    pub recommendations: Vec<String>,
    pub categories: BTreeMap<String, CategoryUsage>,
}

impl PerformanceReport {
    pub fn new(stats: StatsSnapshot, categories: BTreeMap<String, CategoryUsage>) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            recommendations: stats.recommendations(),
            stats,
            categories,
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
