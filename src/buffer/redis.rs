//! Redis-backed click buffer: one sorted set per deployment, scored by the
//! click timestamp in epoch milliseconds.
//!
//! Shares the connection idiom of the Redis KV store: one lazily established
//! multiplexed connection behind an RwLock, dropped on command failure so the
//! next caller reconnects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{BufferedEvent, ClickBuffer};
use crate::errors::{LinkgateError, Result};

pub struct RedisClickBuffer {
    client: redis::Client,
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    key: String,
}

impl RedisClickBuffer {
    pub fn new(url: &str, key_prefix: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| LinkgateError::cache_operation(format!("invalid redis url: {e}")))?;

        // Fail fast at startup rather than on the first buffered click.
        match client.get_connection_with_timeout(Duration::from_secs(5)) {
            Ok(mut conn) => match redis::cmd("PING").query::<String>(&mut conn) {
                Ok(_) => debug!("Redis click buffer connection verified"),
                Err(e) => {
                    return Err(LinkgateError::cache_operation(format!(
                        "redis ping failed: {e}"
                    )));
                }
            },
            Err(e) => {
                return Err(LinkgateError::cache_operation(format!(
                    "redis connect failed: {e}"
                )));
            }
        }

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(None)),
            key: format!("{key_prefix}clicks:buffer"),
        })
    }

    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        {
            let guard = self.connection.read().await;
            if let Some(conn) = guard.as_ref() {
                return Ok(conn.clone());
            }
        }

        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(LinkgateError::from)?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn reset_connection(&self) {
        let mut guard = self.connection.write().await;
        *guard = None;
    }
}

#[async_trait]
impl ClickBuffer for RedisClickBuffer {
    async fn append(&self, member: &str, score: i64) -> Result<()> {
        let mut conn = self.get_connection().await?;
        match conn.zadd::<_, _, _, ()>(&self.key, member, score).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Click buffer ZADD failed: {}", e);
                self.reset_connection().await;
                Err(e.into())
            }
        }
    }

    async fn range(&self, from: i64, to: i64, limit: usize) -> Result<Vec<BufferedEvent>> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<Vec<(String, i64)>> = conn
            .zrangebyscore_limit_withscores(&self.key, from, to, 0, limit as isize)
            .await;
        match result {
            Ok(pairs) => Ok(pairs
                .into_iter()
                .map(|(member, score)| BufferedEvent { member, score })
                .collect()),
            Err(e) => {
                warn!("Click buffer ZRANGEBYSCORE failed: {}", e);
                self.reset_connection().await;
                Err(e.into())
            }
        }
    }

    async fn remove(&self, members: &[String]) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get_connection().await?;
        match conn.zrem::<_, _, u64>(&self.key, members).await {
            Ok(removed) => Ok(removed),
            Err(e) => {
                warn!("Click buffer ZREM failed: {}", e);
                self.reset_connection().await;
                Err(e.into())
            }
        }
    }

    async fn depth(&self) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        match conn.zcard::<_, u64>(&self.key).await {
            Ok(n) => Ok(n),
            Err(e) => {
                self.reset_connection().await;
                Err(e.into())
            }
        }
    }
}
