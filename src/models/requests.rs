//! Request DTOs for the cache admin API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

use crate::cache::{AccessContext, SetOptions};

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `options`: Category, priority and market signals; every field optional
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: serde_json::Value,
    #[serde(default)]
    pub options: SetOptions,
}

/// Query string for GET /get/:key
///
/// `related` is a comma-separated list of keys the caller is about to read
/// together with this one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetQuery {
    pub related: Option<String>,
    pub context: Option<String>,
    pub source: Option<String>,
}

impl GetQuery {
    pub fn into_access(self) -> AccessContext {
        let related_keys = self
            .related
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        AccessContext {
            context: self.context,
            source: self.source,
            related_keys,
        }
    }
}

/// Request body for POST /invalidate
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    /// Regular expression, or an exact key when `exact` is set
    pub pattern: String,
    #[serde(default)]
    pub exact: bool,
}

/// Request body for POST /evict
#[derive(Debug, Clone, Deserialize)]
pub struct EvictRequest {
    /// Number of lowest-scoring entries to remove
    pub count: usize,
}
