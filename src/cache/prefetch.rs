//! Prefetch Queue Module
//!
//! Pending prefetch intents, deduplicated by key and released by priority
//! once due.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Queue priority of relation-based predictions; temporal predictions use
/// their consistency score, which always exceeds it.
pub const RELATION_PREFETCH_PRIORITY: f64 = 0.5;

/// Temporal intents fire this long before the predicted access.
pub const TEMPORAL_LEAD_MS: u64 = 5_000;

/// Why a key was queued for prefetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetchReason {
    Relation,
    TemporalPrediction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrefetchItem {
    pub key: String,
    /// Higher is sooner
    pub priority: f64,
    pub reason: PrefetchReason,
    /// Earliest time the intent may be emitted
    pub scheduled_at: u64,
    /// Key whose access produced the prediction
    pub predicted_by: String,
}

impl PrefetchItem {
    pub fn relation(key: impl Into<String>, predicted_by: impl Into<String>, now: u64) -> Self {
        Self {
            key: key.into(),
            priority: RELATION_PREFETCH_PRIORITY,
            reason: PrefetchReason::Relation,
            scheduled_at: now,
            predicted_by: predicted_by.into(),
        }
    }

    /// Intent for `key` due [`TEMPORAL_LEAD_MS`] before `next_access_ms`, or
    /// immediately if that moment has already passed.
    pub fn temporal(key: impl Into<String>, next_access_ms: u64, consistency: f64, now: u64) -> Self {
        let key = key.into();
        let lead = next_access_ms
            .saturating_sub(now)
            .saturating_sub(TEMPORAL_LEAD_MS);
        Self {
            predicted_by: key.clone(),
            key,
            priority: consistency,
            reason: PrefetchReason::TemporalPrediction,
            scheduled_at: now + lead,
        }
    }
}

// == Prefetch Queue ==
#[derive(Debug)]
pub struct PrefetchQueue {
    items: Vec<PrefetchItem>,
    pending: HashSet<String>,
    max_pending: usize,
}

impl PrefetchQueue {
    pub fn new(max_pending: usize) -> Self {
        Self {
            items: Vec::new(),
            pending: HashSet::new(),
            max_pending,
        }
    }

    /// Queues an item. Returns false when the key is already pending or the
    /// queue is full.
    pub fn push(&mut self, item: PrefetchItem) -> bool {
        if self.pending.contains(&item.key) || self.items.len() >= self.max_pending {
            return false;
        }
        self.pending.insert(item.key.clone());
        self.items.push(item);
        true
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains(key)
    }

    /// Removes and returns up to `limit` due items, highest priority first.
    /// Equal priorities release the earliest scheduled item first.
    pub fn pop_due(&mut self, now: u64, limit: usize) -> Vec<PrefetchItem> {
        let (mut due, waiting): (Vec<_>, Vec<_>) = self
            .items
            .drain(..)
            .partition(|item| item.scheduled_at <= now);

        due.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.scheduled_at.cmp(&b.scheduled_at))
        });
        let deferred = due.split_off(limit.min(due.len()));

        self.items = waiting;
        self.items.extend(deferred);
        for item in &due {
            self.pending.remove(&item.key);
        }
        due
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
