//! Cache Entry Module
//!
//! Defines individual cache entries, their priority and the options a caller
//! passes when storing one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Category used when the caller does not name one.
pub const DEFAULT_CATEGORY: &str = "default";

/// Size charged for values that cannot be serialized for estimation.
pub const FALLBACK_MEMORY_USAGE: usize = 1024;

// == Priority ==
/// Caller-assigned importance of an entry; scales its eviction score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Eviction score multiplier.
    pub fn weight(self) -> f64 {
        match self {
            Priority::Low => 0.5,
            Priority::Normal => 1.0,
            Priority::High => 1.5,
            Priority::Critical => 2.0,
        }
    }
}

// == Set Options ==
/// Options accepted by `set`. Every field has a documented default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetOptions {
    /// TTL policy selector (default: `"default"`)
    pub category: String,
    /// Eviction priority (default: normal)
    pub priority: Priority,
    /// TTL multiplier supplied by the caller (default: 1.0, unclamped)
    pub importance: f64,
    /// Observed volatility of the underlying data (default: 0.02)
    pub market_volatility: f64,
    /// Signal coherence in `[0, 1]` (default: 0.7)
    pub coherence: f64,
    /// Set by prefetch fetchers so first reads count as prefetch hits
    pub is_prefetch: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            priority: Priority::Normal,
            importance: 1.0,
            market_volatility: 0.02,
            coherence: 0.7,
            is_prefetch: false,
        }
    }
}

impl SetOptions {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn prefetched(mut self) -> Self {
        self.is_prefetch = true;
        self
    }
}

// == Cache Entry ==
/// A resident value together with its metadata.
///
/// Everything except the access bookkeeping is fixed at insertion. The
/// bookkeeping fields are atomics so hits can be recorded under a shared lock.
#[derive(Debug)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), always after `created_at`
    pub expires_at: u64,
    pub category: String,
    pub priority: Priority,
    /// Estimated size in bytes at insertion
    pub memory_usage: usize,
    /// Whether the entry was stored by a prefetch fetcher
    pub was_prefetched: bool,
    /// Insertion order, used to break eviction score ties
    pub(crate) sequence: u64,
    access_count: AtomicU64,
    accessed: AtomicBool,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry that lives for `ttl_ms` from `now`.
    ///
    /// A zero TTL is bumped to one millisecond so `expires_at > created_at`
    /// always holds.
    pub fn new(value: V, now: u64, ttl_ms: u64, options: &SetOptions, memory_usage: usize) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms.max(1)),
            category: options.category.clone(),
            priority: options.priority,
            memory_usage,
            was_prefetched: options.is_prefetch,
            sequence: 0,
            access_count: AtomicU64::new(0),
            accessed: AtomicBool::new(false),
        }
    }

    // == Is Expired ==
    /// An entry is expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Remaining lifetime in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// Total lifetime the entry was granted.
    pub fn ttl_ms(&self) -> u64 {
        self.expires_at - self.created_at
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    pub fn was_accessed(&self) -> bool {
        self.accessed.load(Ordering::Relaxed)
    }

    /// Records a read and reports whether it is the first read of a
    /// prefetched entry.
    pub fn mark_accessed(&self) -> bool {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        let previously_accessed = self.accessed.swap(true, Ordering::AcqRel);
        self.was_prefetched && !previously_accessed
    }
}

/// Estimates the in-memory size of a value from its JSON encoding.
///
/// Values that fail to serialize are charged [`FALLBACK_MEMORY_USAGE`].
pub fn estimate_memory_usage<V: Serialize>(value: &V) -> usize {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .unwrap_or(FALLBACK_MEMORY_USAGE)
}
