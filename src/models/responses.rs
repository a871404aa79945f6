//! Response DTOs for the cache admin API
//!
//! Defines the structure of outgoing HTTP response bodies. Stats and reports
//! are served as the cache's own `StatsSnapshot` and `PerformanceReport`.

use serde::Serialize;

use crate::cache::{ClearReport, EvictionCandidate, SetOutcome};

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The stored value
    pub value: serde_json::Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
    /// Lifetime granted to the entry
    pub ttl_ms: u64,
    /// Estimated size in bytes
    pub memory_usage: usize,
    /// Entries evicted to make room
    pub evicted: usize,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, outcome: SetOutcome) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
            ttl_ms: outcome.ttl_ms,
            memory_usage: outcome.memory_usage,
            evicted: outcome.evicted,
        }
    }
}

/// Response body for the DELETE operation (DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for POST /invalidate
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub pattern: String,
    pub invalidated_count: usize,
}

/// Response body for POST /clear
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub cleared_entries: usize,
    pub freed_bytes: usize,
}

impl From<ClearReport> for ClearResponse {
    fn from(report: ClearReport) -> Self {
        Self {
            cleared_entries: report.cleared_entries,
            freed_bytes: report.freed_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvictedEntry {
    pub key: String,
    pub score: f64,
}

/// Response body for POST /evict
#[derive(Debug, Clone, Serialize)]
pub struct EvictResponse {
    pub evicted: Vec<EvictedEntry>,
}

impl EvictResponse {
    pub fn new(candidates: Vec<EvictionCandidate>) -> Self {
        Self {
            evicted: candidates
                .into_iter()
                .map(|c| EvictedEntry {
                    key: c.key,
                    score: c.score,
                })
                .collect(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    /// Cache health score, 0–100
    pub health_score: f64,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(health_score: f64) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            health_score,
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
