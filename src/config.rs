//! Configuration Module
//!
//! Handles loading, defaulting and validating cache configuration.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::cache::{default_ttl_policies, TtlPolicy};
use crate::error::{CacheError, Result};

/// Cache configuration parameters.
///
/// Every field has a default; scalar values can be overridden via environment
/// variables with [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of resident entries
    pub max_size: usize,
    /// Optional budget for stored value bytes
    pub max_memory_bytes: Option<usize>,
    /// TTL in milliseconds for categories without a policy
    pub default_ttl_ms: u64,
    /// Interval in milliseconds between expiry sweeps
    pub cleanup_interval_ms: u64,
    /// Interval in milliseconds between prefetch queue drains
    pub prefetch_interval_ms: u64,
    /// Maximum prefetch intents emitted per drain
    pub prefetch_batch_size: usize,
    /// Upper bound on queued prefetch items
    pub max_pending_prefetches: usize,
    /// Hit rate the health score is measured against
    pub hit_rate_target: f64,
    /// Buffered events per subscriber before slow subscribers lag
    pub event_capacity: usize,
    /// HTTP admin server port
    pub server_port: u16,
    /// TTL policy per category name
    pub ttl_policies: HashMap<String, TtlPolicy>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_SIZE` - Maximum resident entries (default: 10000)
    /// - `MAX_MEMORY_MB` - Memory budget in megabytes (default: unbounded)
    /// - `DEFAULT_TTL_MS` - Fallback TTL (default: 300000)
    /// - `CLEANUP_INTERVAL_MS` - Expiry sweep frequency (default: 60000)
    /// - `PREFETCH_INTERVAL_MS` - Prefetch drain frequency (default: 2000)
    /// - `PREFETCH_BATCH_SIZE` - Intents per drain (default: 5)
    /// - `MAX_PENDING_PREFETCHES` - Prefetch queue bound (default: 1000)
    /// - `HIT_RATE_TARGET` - Target hit rate (default: 0.85)
    /// - `EVENT_CAPACITY` - Event channel capacity (default: 1024)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size: env_or("MAX_SIZE", defaults.max_size),
            max_memory_bytes: env::var("MAX_MEMORY_MB")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .map(|mb| mb.saturating_mul(1024 * 1024))
                .or(defaults.max_memory_bytes),
            default_ttl_ms: env_or("DEFAULT_TTL_MS", defaults.default_ttl_ms),
            cleanup_interval_ms: env_or("CLEANUP_INTERVAL_MS", defaults.cleanup_interval_ms),
            prefetch_interval_ms: env_or("PREFETCH_INTERVAL_MS", defaults.prefetch_interval_ms),
            prefetch_batch_size: env_or("PREFETCH_BATCH_SIZE", defaults.prefetch_batch_size),
            max_pending_prefetches: env_or(
                "MAX_PENDING_PREFETCHES",
                defaults.max_pending_prefetches,
            ),
            hit_rate_target: env_or("HIT_RATE_TARGET", defaults.hit_rate_target),
            event_capacity: env_or("EVENT_CAPACITY", defaults.event_capacity),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            ..defaults
        }
    }

    /// Replaces (or adds) the TTL policy for one category.
    pub fn with_policy(mut self, category: impl Into<String>, policy: TtlPolicy) -> Self {
        self.ttl_policies.insert(category.into(), policy);
        self
    }

    /// Rejects configurations the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(CacheError::InvalidConfig(
                "max_size must be greater than zero".to_string(),
            ));
        }
        if self.max_memory_bytes == Some(0) {
            return Err(CacheError::InvalidConfig(
                "max_memory_bytes must be greater than zero when set".to_string(),
            ));
        }
        if self.prefetch_batch_size == 0 || self.max_pending_prefetches == 0 {
            return Err(CacheError::InvalidConfig(
                "prefetch batch size and queue bound must be greater than zero".to_string(),
            ));
        }
        if self.default_ttl_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "default_ttl_ms must be greater than zero".to_string(),
            ));
        }
        if self.cleanup_interval_ms == 0 || self.prefetch_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "background intervals must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        if !(self.hit_rate_target > 0.0 && self.hit_rate_target <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "hit_rate_target must be in (0, 1], got {}",
                self.hit_rate_target
            )));
        }
        for (category, policy) in &self.ttl_policies {
            if policy.min_ms == 0 || policy.min_ms > policy.max_ms {
                return Err(CacheError::InvalidConfig(format!(
                    "TTL policy for '{}' needs 0 < min <= max, got [{}, {}]",
                    category, policy.min_ms, policy.max_ms
                )));
            }
            if !policy.volatility_factor.is_finite() {
                return Err(CacheError::InvalidConfig(format!(
                    "TTL policy for '{}' has a non-finite volatility factor",
                    category
                )));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            max_memory_bytes: None,
            default_ttl_ms: 300_000,
            cleanup_interval_ms: 60_000,
            prefetch_interval_ms: 2_000,
            prefetch_batch_size: 5,
            max_pending_prefetches: 1_000,
            hit_rate_target: 0.85,
            event_capacity: 1_024,
            server_port: 3000,
            ttl_policies: default_ttl_policies(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
