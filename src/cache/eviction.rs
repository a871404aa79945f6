//! Eviction Policy Module
//!
//! Scores resident entries by freshness, access frequency, recency, priority
//! and category, and picks the lowest-scoring ones for removal.

use serde::{Deserialize, Serialize};

use crate::cache::patterns::{AccessRecord, AccessTracker};
use crate::cache::store::EntryStore;
use crate::cache::CacheEntry;

/// Why an entry was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Store was full when a new key arrived
    Capacity,
    /// Stored bytes would exceed the memory budget
    Memory,
    /// Explicit request to shed the lowest-scoring entries
    LruPriority,
}

/// An entry chosen for eviction.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionCandidate {
    pub key: String,
    pub score: f64,
    sequence: u64,
}

/// Score multiplier for a category; unknown categories are neutral.
pub fn category_weight(category: &str) -> f64 {
    match category {
        "market_data" => 1.2,
        "risk_metrics" => 1.5,
        "order_book" => 1.3,
        "position_data" => 1.1,
        "analysis_results" => 0.9,
        _ => 1.0,
    }
}

/// Computes the keep-score of an entry at `now`. Higher scores live longer.
///
/// Recency falls back to the creation time for entries that were never read.
pub fn score_entry<V>(entry: &CacheEntry<V>, record: Option<&AccessRecord>, now: u64) -> f64 {
    let age_secs = now.saturating_sub(entry.created_at) as f64 / 1000.0;
    let age = (100.0 - age_secs / 0.6).max(0.0);

    let frequency = record.map_or(0.0, |r| r.frequency * 20.0);

    let last_access = record.map_or(entry.created_at, |r| r.last_access);
    let idle_secs = now.saturating_sub(last_access) as f64 / 1000.0;
    let recency = (50.0 - idle_secs / 0.6).max(0.0);

    (age + frequency + recency) * entry.priority.weight() * category_weight(&entry.category)
}

/// Picks the `n` lowest-scoring resident entries, lowest first.
///
/// Ties go to the entry inserted earliest, so identical state always yields
/// the same selection. Asking for more than is resident returns everything.
pub fn select_for_eviction<V>(
    store: &EntryStore<V>,
    tracker: &AccessTracker,
    now: u64,
    n: usize,
) -> Vec<EvictionCandidate> {
    if n == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<EvictionCandidate> = store
        .iter()
        .map(|(key, entry)| EvictionCandidate {
            key: key.clone(),
            score: score_entry(entry, tracker.record(key), now),
            sequence: entry.sequence,
        })
        .collect();

    let by_score = |a: &EvictionCandidate, b: &EvictionCandidate| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.sequence.cmp(&b.sequence))
    };

    if n < candidates.len() {
        candidates.select_nth_unstable_by(n - 1, by_score);
        candidates.truncate(n);
    }
    candidates.sort_by(by_score);
    candidates
}

/// Number of entries a capacity eviction removes: 10% of capacity, at
/// least one.
pub fn capacity_batch(max_size: usize) -> usize {
    max_size.div_ceil(10).max(1)
}
