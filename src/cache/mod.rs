//! Cache Module
//!
//! Provides an adaptive in-memory cache with dynamic TTLs, score-based
//! eviction, access pattern tracking and predictive prefetching.

mod adaptive;
mod clock;
mod entry;
mod events;
mod eviction;
mod patterns;
mod prefetch;
mod stats;
mod store;
mod ttl;


// Re-export public types
pub use adaptive::{
    AdaptiveCache, CleanupReport, ClearReport, EntryPredicate, Invalidation, SetOutcome,
    WeakCache, SWEEP_CHUNK_SIZE,
};
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use entry::{
    estimate_memory_usage, CacheEntry, Priority, SetOptions, DEFAULT_CATEGORY,
    FALLBACK_MEMORY_USAGE,
};
pub use events::{CacheEvent, EventBus};
pub use eviction::{
    capacity_batch, category_weight, score_entry, select_for_eviction, EvictionCandidate,
    EvictionReason,
};
pub use patterns::{
    AccessContext, AccessPattern, AccessRecord, AccessSample, AccessTracker, TemporalPrediction,
    MAX_ACCESS_HISTORY, MAX_RELATED_KEYS, MIN_TEMPORAL_CONSISTENCY, MIN_TEMPORAL_SAMPLES,
    PATTERN_RETENTION_MS,
};
pub use prefetch::{
    PrefetchItem, PrefetchQueue, PrefetchReason, RELATION_PREFETCH_PRIORITY, TEMPORAL_LEAD_MS,
};
pub use stats::{CacheStats, Counters, PerformanceReport, ResidentState, StatsSnapshot};
pub use store::{CategoryUsage, EntryStore};
pub use ttl::{default_ttl_policies, TtlCalculator, TtlPolicy};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
