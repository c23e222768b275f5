//! Redis-backed KV store.
//!
//! Holds one lazily established multiplexed connection behind an RwLock;
//! command failures drop the connection so the next call reconnects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tokio::sync::RwLock;
use tracing::{debug, error};

use super::KvStore;
use crate::errors::{LinkgateError, Result};

pub struct RedisKvStore {
    client: redis::Client,
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    key_prefix: String,
}

impl RedisKvStore {
    pub fn new(url: &str, key_prefix: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| LinkgateError::cache_operation(format!("invalid redis url: {e}")))?;

        // Fail fast at startup rather than on the first request
        match client.get_connection() {
            Ok(mut conn) => match redis::cmd("PING").query::<String>(&mut conn) {
                Ok(_) => debug!("Redis KV connection test successful"),
                Err(e) => {
                    error!("Failed to ping Redis server: {}. Check URL: {}", e, url);
                    return Err(LinkgateError::cache_operation(format!(
                        "redis ping failed: {e}"
                    )));
                }
            },
            Err(e) => {
                error!("Failed to connect to Redis: {}. Check URL: {}", e, url);
                return Err(LinkgateError::cache_operation(format!(
                    "redis connect failed: {e}"
                )));
            }
        }

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(None)),
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let mut conn_guard = self.connection.write().await;

        // Double-check: another task may have connected while we waited
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let new_conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(LinkgateError::from)?;
        *conn_guard = Some(new_conn.clone());
        debug!("Redis KV connection established and cached");

        Ok(new_conn)
    }

    async fn reset_connection(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
        debug!("Redis KV connection reset due to error");
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let redis_key = self.make_key(key);
        let mut conn = self.get_connection().await?;

        let result: redis::RedisResult<Option<String>> = redis::cmd("SET")
            .arg(&redis_key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await;

        match result {
            Ok(reply) => Ok(reply.is_some()),
            Err(e) => {
                error!("SET NX EX failed for '{}': {}", redis_key, e);
                self.reset_connection().await;
                Err(e.into())
            }
        }
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<(u64, i64)> {
        let redis_key = self.make_key(key);
        let mut conn = self.get_connection().await?;
        let window_secs = window.as_secs().max(1) as i64;

        let count: i64 = match conn.incr(&redis_key, 1i64).await {
            Ok(c) => c,
            Err(e) => {
                error!("INCR failed for '{}': {}", redis_key, e);
                self.reset_connection().await;
                return Err(e.into());
            }
        };

        let now_ms = Utc::now().timestamp_millis();

        if count == 1 {
            // First hit creates the bucket; its TTL defines the window
            let expired: redis::RedisResult<i64> = conn.expire(&redis_key, window_secs).await;
            if let Err(e) = expired {
                error!("EXPIRE failed for '{}': {}", redis_key, e);
                self.reset_connection().await;
                return Err(e.into());
            }
            return Ok((count as u64, now_ms + window_secs * 1000));
        }

        let pttl: i64 = match conn.pttl(&redis_key).await {
            Ok(v) => v,
            Err(e) => {
                error!("PTTL failed for '{}': {}", redis_key, e);
                self.reset_connection().await;
                return Err(e.into());
            }
        };

        if pttl < 0 {
            // Key lost its TTL (e.g. Redis restarted mid-window); re-arm it
            // so the bucket cannot live forever.
            let _: redis::RedisResult<i64> = conn.expire(&redis_key, window_secs).await;
            return Ok((count as u64, now_ms + window_secs * 1000));
        }

        Ok((count as u64, now_ms + pttl))
    }
}
