//! API Module
//!
//! HTTP handlers and routing for the cache admin REST API.
//!
//! # Endpoints
//! - `PUT /set` - Store a value with optional TTL/eviction options
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `POST /invalidate` - Remove keys by pattern or exact key
//! - `POST /evict` - Evict the lowest-scoring entries
//! - `POST /clear` - Remove every entry
//! - `GET /stats` - Cache statistics
//! - `GET /report` - Performance report with recommendations
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
