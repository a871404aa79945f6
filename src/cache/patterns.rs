//! Access Pattern Module
//!
//! Per-key access history used for frequency-aware TTLs, eviction scoring
//! and prefetch predictions.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Accesses kept per key; older samples are dropped first.
pub const MAX_ACCESS_HISTORY: usize = 50;

/// Related keys kept per key; the least recently reported go first.
pub const MAX_RELATED_KEYS: usize = MAX_ACCESS_HISTORY;

/// Accesses considered when measuring periodicity.
pub const TEMPORAL_WINDOW: usize = 10;

/// Minimum accesses before a temporal prediction is attempted.
pub const MIN_TEMPORAL_SAMPLES: usize = 5;

/// Consistency a temporal prediction must exceed.
pub const MIN_TEMPORAL_CONSISTENCY: f64 = 0.7;

/// Mean interval a temporal prediction must stay under.
pub const MAX_TEMPORAL_INTERVAL_MS: f64 = 5.0 * 60_000.0;

/// Patterns idle for longer than this are dropped by `sweep_stale`.
pub const PATTERN_RETENTION_MS: u64 = 24 * 60 * 60 * 1000;

const FREQUENCY_WINDOW_MS: u64 = 60_000;
const MAX_FREQUENCY: f64 = 10.0;

// == Access Record ==
/// Aggregate access counters for one key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccessRecord {
    pub count: u64,
    pub first_access: u64,
    pub last_access: u64,
    /// Accesses per minute in `[0, 10]`; stays 0 until a full minute has
    /// been observed
    pub frequency: f64,
}

impl AccessRecord {
    fn new(now: u64) -> Self {
        Self {
            count: 0,
            first_access: now,
            last_access: now,
            frequency: 0.0,
        }
    }

    fn record(&mut self, now: u64) {
        self.count += 1;
        self.last_access = self.last_access.max(now);

        let observed_ms = self.last_access.saturating_sub(self.first_access);
        if observed_ms >= FREQUENCY_WINDOW_MS {
            let minutes = observed_ms as f64 / FREQUENCY_WINDOW_MS as f64;
            self.frequency = (self.count as f64 / minutes).min(MAX_FREQUENCY);
        }
    }
}

/// One observed access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessSample {
    pub timestamp: u64,
    pub context: Option<String>,
    pub source: Option<String>,
}

// == Access Pattern ==
#[derive(Debug, Clone, Default)]
pub struct AccessPattern {
    pub accesses: VecDeque<AccessSample>,
    /// Keys the caller reported as accessed together with this one, oldest
    /// report first
    pub related_keys: VecDeque<String>,
}

impl AccessPattern {
    fn push(&mut self, sample: AccessSample) {
        if self.accesses.len() == MAX_ACCESS_HISTORY {
            self.accesses.pop_front();
        }
        self.accesses.push_back(sample);
    }

    fn relate(&mut self, related: &str) {
        if let Some(pos) = self.related_keys.iter().position(|k| k == related) {
            self.related_keys.remove(pos);
        } else if self.related_keys.len() == MAX_RELATED_KEYS {
            self.related_keys.pop_front();
        }
        self.related_keys.push_back(related.to_string());
    }
}

/// Caller-supplied context for an access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessContext {
    pub context: Option<String>,
    pub source: Option<String>,
    pub related_keys: Vec<String>,
}

/// Expected next access of a periodically read key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemporalPrediction {
    pub next_access_ms: u64,
    pub mean_interval_ms: f64,
    pub consistency: f64,
}

#[derive(Debug, Default)]
struct TrackedKey {
    record: Option<AccessRecord>,
    pattern: AccessPattern,
}

// == Access Tracker ==
/// Tracks accesses for every key read through the cache.
#[derive(Debug, Default)]
pub struct AccessTracker {
    keys: HashMap<String, TrackedKey>,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an access for `key` and merges the caller's related keys.
    pub fn record_access(&mut self, key: &str, now: u64, access: &AccessContext) {
        let tracked = self.keys.entry(key.to_string()).or_default();

        tracked
            .record
            .get_or_insert_with(|| AccessRecord::new(now))
            .record(now);
        tracked.pattern.push(AccessSample {
            timestamp: now,
            context: access.context.clone(),
            source: access.source.clone(),
        });
        for related in access.related_keys.iter().filter(|related| related.as_str() != key) {
            tracked.pattern.relate(related);
        }
    }

    pub fn record(&self, key: &str) -> Option<&AccessRecord> {
        self.keys.get(key).and_then(|t| t.record.as_ref())
    }

    /// Current frequency for `key`, 0 when never accessed.
    pub fn frequency(&self, key: &str) -> f64 {
        self.record(key).map_or(0.0, |r| r.frequency)
    }

    pub fn pattern(&self, key: &str) -> Option<&AccessPattern> {
        self.keys.get(key).map(|t| &t.pattern)
    }

    pub fn has_pattern(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Related keys recorded for `key`, sorted for stable output.
    pub fn related_keys(&self, key: &str) -> Vec<String> {
        let mut related: Vec<String> = self
            .pattern(key)
            .map(|p| p.related_keys.iter().cloned().collect())
            .unwrap_or_default();
        related.sort();
        related
    }

    /// Predicts the next access of `key` from the regularity of its recent
    /// inter-access intervals.
    pub fn predict_temporal(&self, key: &str) -> Option<TemporalPrediction> {
        let accesses = &self.pattern(key)?.accesses;
        if accesses.len() < MIN_TEMPORAL_SAMPLES {
            return None;
        }

        let window: Vec<u64> = accesses
            .iter()
            .skip(accesses.len().saturating_sub(TEMPORAL_WINDOW))
            .map(|a| a.timestamp)
            .collect();
        let intervals: Vec<f64> = window
            .windows(2)
            .map(|pair| pair[1].saturating_sub(pair[0]) as f64)
            .collect();

        let n = intervals.len() as f64;
        let mean = intervals.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return None;
        }
        let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / n;
        let consistency = (1.0 - variance / (mean * mean)).max(0.0);

        if consistency <= MIN_TEMPORAL_CONSISTENCY || mean >= MAX_TEMPORAL_INTERVAL_MS {
            return None;
        }

        let last = *window.last()?;
        Some(TemporalPrediction {
            next_access_ms: last + mean.round() as u64,
            mean_interval_ms: mean,
            consistency,
        })
    }

    /// Drops keys whose most recent access is older than the retention
    /// window. Returns how many were dropped.
    pub fn sweep_stale(&mut self, now: u64) -> usize {
        let before = self.keys.len();
        self.keys.retain(|_, tracked| {
            tracked
                .record
                .map_or(false, |r| now.saturating_sub(r.last_access) <= PATTERN_RETENTION_MS)
        });
        before - self.keys.len()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
