//! Cache Events Module
//!
//! Typed notifications for metrics, logging and prefetch collaborators,
//! delivered over a broadcast channel.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::cache::eviction::EvictionReason;
use crate::cache::patterns::AccessContext;
use crate::cache::prefetch::PrefetchReason;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent<V> {
    Hit {
        key: String,
        value: V,
        remaining_ttl_ms: u64,
    },
    Miss {
        key: String,
        access: AccessContext,
    },
    Set {
        key: String,
        ttl_ms: u64,
        category: String,
        memory_usage: usize,
        total_entries: usize,
    },
    Evict {
        key: String,
        reason: EvictionReason,
        score: f64,
    },
    Cleanup {
        expired_count: usize,
        freed_bytes: usize,
        remaining_entries: usize,
    },
    Prefetch {
        key: String,
        reason: PrefetchReason,
        predicted_by: String,
    },
    Invalidate {
        pattern: String,
        invalidated_count: usize,
    },
    Clear {
        cleared_entries: usize,
        freed_bytes: usize,
    },
}

// == Event Bus ==
/// Fan-out of cache events. Slow subscribers lag and lose the oldest events
/// rather than slowing the cache down.
#[derive(Debug)]
pub struct EventBus<V> {
    sender: broadcast::Sender<CacheEvent<V>>,
}

impl<V: Clone> EventBus<V> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _rx) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent<V>> {
        self.sender.subscribe()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    /// Sends `event` to current subscribers. Returns false when nobody is
    /// listening.
    pub fn emit(&self, event: CacheEvent<V>) -> bool {
        self.sender.send(event).is_ok()
    }
}
