//! Adaptive Cache - an in-memory cache that adapts to how it is used
//!
//! Entries get TTLs derived from their category, market signals and access
//! frequency. A full cache evicts its lowest-scoring entries, and access
//! patterns drive predictive prefetch intents for an external fetcher.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{AccessContext, AdaptiveCache, CacheEvent, Invalidation, Priority, SetOptions};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_prefetch_fetcher;
