//! API Handlers
//!
//! HTTP request handlers for each cache admin endpoint.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;

use crate::cache::{AdaptiveCache, Invalidation, PerformanceReport, StatsSnapshot};
use crate::config::Config;
use crate::error::Result;
use crate::models::{
    ClearResponse, DeleteResponse, EvictRequest, EvictResponse, GetQuery, GetResponse,
    HealthResponse, InvalidateRequest, InvalidateResponse, SetRequest, SetResponse,
};

/// Application state shared across all handlers.
///
/// The cache handle is internally reference-counted, so cloning the state is
/// cheap and every clone talks to the same cache.
#[derive(Clone)]
pub struct AppState {
    pub cache: AdaptiveCache<Value>,
}

impl AppState {
    pub fn new(cache: AdaptiveCache<Value>) -> Self {
        Self { cache }
    }

    /// Builds the cache from configuration and starts its background tasks.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = AdaptiveCache::start(config.clone())?;
        Ok(Self::new(cache))
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value. The TTL is derived from `options`. Key validation
/// happens in the cache.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    let outcome = state
        .cache
        .set(req.key.as_str(), req.value, req.options)
        .await?;

    Ok(Json(SetResponse::new(req.key, outcome)))
}

/// Handler for GET /get/:key
///
/// Related keys passed in the query string feed prefetch predictions.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<GetQuery>,
) -> Result<Json<GetResponse>> {
    let value = state.cache.get_with(&key, query.into_access()).await?;
    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.cache.delete(&key).await?;
    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    let invalidation = if req.exact {
        Invalidation::Key(req.pattern.clone())
    } else {
        Invalidation::Pattern(req.pattern.clone())
    };
    let invalidated_count = state.cache.invalidate(invalidation).await?;

    Ok(Json(InvalidateResponse {
        pattern: req.pattern,
        invalidated_count,
    }))
}

/// Handler for POST /evict
pub async fn evict_handler(
    State(state): State<AppState>,
    Json(req): Json<EvictRequest>,
) -> Json<EvictResponse> {
    let evicted = state.cache.evict_lowest(req.count).await;
    Json(EvictResponse::new(evicted))
}

/// Handler for POST /clear
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    Json(state.cache.clear().await.into())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.cache.snapshot().await)
}

/// Handler for GET /report
pub async fn report_handler(State(state): State<AppState>) -> Json<PerformanceReport> {
    Json(state.cache.performance_report().await)
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.cache.snapshot().await;
    Json(HealthResponse::healthy(snapshot.health_score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{SetOptions, MAX_KEY_LENGTH};
    use crate::error::CacheError;
    use serde_json::json;

    fn test_state() -> AppState {
        AppState::new(AdaptiveCache::new(Config::default()).unwrap())
    }

    fn set_request(key: &str, value: Value) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            options: SetOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state();

        let result = set_handler(State(state.clone()), Json(set_request("test_key", json!("test_value")))).await;
        assert!(result.is_ok());

        let response = get_handler(
            State(state),
            Path("test_key".to_string()),
            Query(GetQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(response.value, json!("test_value"));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let result = get_handler(
            State(test_state()),
            Path("nonexistent".to_string()),
            Query(GetQuery::default()),
        )
        .await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_with_related_keys_queues_prefetch() {
        let state = test_state();
        let query = GetQuery {
            related: Some("ETH,SOL".to_string()),
            ..GetQuery::default()
        };
        let _ = get_handler(State(state.clone()), Path("BTC".to_string()), Query(query)).await;

        assert_eq!(state.cache.pending_prefetches(), 2);
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let state = test_state();
        set_handler(State(state.clone()), Json(set_request("to_delete", json!(1))))
            .await
            .unwrap();

        let result = delete_handler(State(state.clone()), Path("to_delete".to_string())).await;
        assert!(result.is_ok());

        let result = delete_handler(State(state), Path("to_delete".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalidate_handler() {
        let state = test_state();
        for key in ["price:BTC", "price:ETH", "risk:BTC"] {
            set_handler(State(state.clone()), Json(set_request(key, json!(0))))
                .await
                .unwrap();
        }

        let req = InvalidateRequest {
            pattern: "^price:".to_string(),
            exact: false,
        };
        let response = invalidate_handler(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(response.invalidated_count, 2);

        let req = InvalidateRequest {
            pattern: "risk:BTC".to_string(),
            exact: true,
        };
        let response = invalidate_handler(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(response.invalidated_count, 1);
        assert!(state.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_evict_and_clear_handlers() {
        let state = test_state();
        for key in ["a", "b", "c"] {
            set_handler(State(state.clone()), Json(set_request(key, json!(key))))
                .await
                .unwrap();
        }

        let response = evict_handler(State(state.clone()), Json(EvictRequest { count: 1 })).await;
        assert_eq!(response.evicted.len(), 1);

        let response = clear_handler(State(state.clone())).await;
        assert_eq!(response.cleared_entries, 2);
        assert!(state.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let response = stats_handler(State(test_state())).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
    }

    #[tokio::test]
    async fn test_report_handler() {
        let response = report_handler(State(test_state())).await;
        assert!(response.categories.is_empty());
        assert!(!response.generated_at.is_empty());
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler(State(test_state())).await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let result = set_handler(State(test_state()), Json(set_request("", json!("value")))).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_set_rejects_overlong_key_from_cache() {
        let state = test_state();
        let key = "k".repeat(MAX_KEY_LENGTH + 1);
        let result = set_handler(State(state.clone()), Json(set_request(&key, json!(1)))).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
        assert!(state.cache.is_empty().await);
    }
}
