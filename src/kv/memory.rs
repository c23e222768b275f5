//! In-process KV store for tests and single-instance deployments.
//!
//! DashMap's entry API serializes access per key, which is all the atomicity
//! the two primitives need. Expired entries are reaped lazily on access.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::KvStore;
use crate::errors::Result;

struct Entry {
    value: String,
    count: u64,
    expires_at_ms: i64,
}

#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Entry>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now_ms = Utc::now().timestamp_millis();

        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at_ms > now_ms {
                    return Ok(false);
                }
                occupied.insert(Entry {
                    value: value.to_string(),
                    count: 0,
                    expires_at_ms: now_ms + ttl.as_millis() as i64,
                });
                Ok(true)
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value: value.to_string(),
                    count: 0,
                    expires_at_ms: now_ms + ttl.as_millis() as i64,
                });
                Ok(true)
            }
        }
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<(u64, i64)> {
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = window.as_millis() as i64;

        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: String::new(),
            count: 0,
            expires_at_ms: now_ms + window_ms,
        });

        if entry.expires_at_ms <= now_ms {
            entry.count = 0;
            entry.expires_at_ms = now_ms + window_ms;
        }

        entry.count += 1;
        Ok((entry.count, entry.expires_at_ms))
    }
}
