//! Linkgate - edge traffic router and click-analytics ingestion for a
//! multi-tenant short-link platform
//!
//! The hot path classifies the request host/path, resolves the short code
//! and answers with a redirect; everything analytic (enrichment, warehouse
//! emit, usage increment, buffering) happens in detached tasks after the
//! response is on the wire. A batch reconciler later drains the click buffer
//! into relational storage.
//!
//! # Architecture
//! - `routing`: hostname/path classification
//! - `limiter`: fixed-window rate limiting over the shared KV store
//! - `session`: signed session cookie resolution, memoized per request
//! - `services`: short-code resolution and workspace usage quotas
//! - `analytics`: click event model, dispatch pipeline, reconciler and
//!   aggregation queries
//! - `buffer` / `kv`: Redis-or-memory click buffer and KV primitives
//! - `cache`: moka caches for hot link rows
//! - `storage`: sea-orm backend (SQLite / MySQL / PostgreSQL)
//! - `api`: HTTP services and middleware
//! - `config`: layered file + environment configuration
//! - `runtime`: application lifecycle, server assembly and shutdown

pub mod analytics;
pub mod api;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod errors;
pub mod kv;
pub mod limiter;
pub mod routing;
pub mod runtime;
pub mod services;
pub mod session;
pub mod storage;
pub mod system;
pub mod utils;
