//! Click-event buffer between the hot redirect path and the batch reconciler.
//!
//! Events are appended as serialized members scored by their click timestamp
//! in epoch milliseconds, so the reconciler can collect a time window with a
//! score-range query and delete exactly the members it persisted.

use async_trait::async_trait;

use crate::errors::Result;

mod memory;
mod redis;

pub use memory::MemoryClickBuffer;
pub use redis::RedisClickBuffer;

/// One buffered entry: the raw member payload and its timestamp score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedEvent {
    pub member: String,
    pub score: i64,
}

#[async_trait]
pub trait ClickBuffer: Send + Sync {
    /// Appends a member with the given score. Re-adding an identical member
    /// updates its score instead of duplicating it.
    async fn append(&self, member: &str, score: i64) -> Result<()>;

    /// Returns up to `limit` members with `from <= score <= to`, ordered by
    /// score ascending.
    async fn range(&self, from: i64, to: i64, limit: usize) -> Result<Vec<BufferedEvent>>;

    /// Removes the given members in one call, returning how many existed.
    async fn remove(&self, members: &[String]) -> Result<u64>;

    /// Number of members currently buffered.
    async fn depth(&self) -> Result<u64>;
}
