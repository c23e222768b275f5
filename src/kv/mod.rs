//! Shared key-value store behind the rate limiter and the dispatch de-dup
//! window.
//!
//! Both callers only need two atomic primitives: set-if-not-exists with a
//! TTL, and a windowed counter. Redis backs production; the in-memory
//! implementation serves tests and single-instance deployments.

mod memory;
mod redis;

pub use memory::MemoryKvStore;
pub use redis::RedisKvStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Atomic SET-NX-EX. Returns true when this call created the key.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Atomically bump a fixed-window counter, creating the bucket with
    /// `window` TTL on first hit. Returns the count after the increment and
    /// the bucket's reset time as epoch milliseconds.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<(u64, i64)>;
}
