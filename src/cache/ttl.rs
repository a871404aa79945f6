//! Dynamic TTL Module
//!
//! Derives per-entry lifetimes from the category policy, the caller's market
//! signals and the key's observed access frequency.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cache::patterns::AccessRecord;
use crate::cache::SetOptions;

/// Lifetime bounds and volatility sensitivity for one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TtlPolicy {
    pub min_ms: u64,
    pub max_ms: u64,
    pub volatility_factor: f64,
}

impl TtlPolicy {
    pub const fn new(min_ms: u64, max_ms: u64, volatility_factor: f64) -> Self {
        Self {
            min_ms,
            max_ms,
            volatility_factor,
        }
    }

    /// Midpoint of the policy bounds.
    pub fn base_ms(&self) -> f64 {
        (self.min_ms as f64 + self.max_ms as f64) / 2.0
    }
}

/// Built-in policy table.
pub fn default_ttl_policies() -> HashMap<String, TtlPolicy> {
    [
        ("market_data", TtlPolicy::new(1_000, 10_000, 2.0)),
        ("risk_metrics", TtlPolicy::new(5_000, 60_000, 1.0)),
        ("order_book", TtlPolicy::new(500, 5_000, 3.0)),
        ("position_data", TtlPolicy::new(10_000, 120_000, 0.5)),
        ("analysis_results", TtlPolicy::new(60_000, 600_000, 0.3)),
    ]
    .into_iter()
    .map(|(name, policy)| (name.to_string(), policy))
    .collect()
}

// == TTL Calculator ==
#[derive(Debug, Clone)]
pub struct TtlCalculator {
    policies: HashMap<String, TtlPolicy>,
    default_ttl_ms: u64,
}

impl TtlCalculator {
    pub fn new(policies: HashMap<String, TtlPolicy>, default_ttl_ms: u64) -> Self {
        Self {
            policies,
            default_ttl_ms,
        }
    }

    pub fn policy(&self, category: &str) -> Option<&TtlPolicy> {
        self.policies.get(category)
    }

    /// Computes the TTL in milliseconds for an entry of `options.category`.
    ///
    /// Unknown categories get the default TTL unscaled. Known categories get
    /// `base × volatility × frequency × importance × coherence`, clamped to the
    /// policy's `[min, max]`.
    pub fn compute(&self, options: &SetOptions, record: Option<&AccessRecord>) -> u64 {
        let Some(policy) = self.policies.get(&options.category) else {
            return self.default_ttl_ms;
        };

        let volatility =
            (1.0 - options.market_volatility * policy.volatility_factor).clamp(0.1, 2.0);
        let frequency = record.map_or(1.0, |r| 1.0 + (r.frequency * 0.5).min(1.0));
        let importance = options.importance;
        let coherence = 0.5 + options.coherence * 0.7;

        let ttl = policy.base_ms() * volatility * frequency * importance * coherence;
        if ttl.is_nan() {
            return policy.min_ms;
        }
        ttl.clamp(policy.min_ms as f64, policy.max_ms as f64).round() as u64
    }
}
