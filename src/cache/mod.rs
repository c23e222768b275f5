//! Bounded in-process cache for link lookups on the redirect hot path.
//!
//! Entries are keyed by `(domain, slug)` and hold `Option<Link>` so confirmed
//! misses are cached too; a hot unknown slug must not turn into a database
//! query per request. Loads go through moka's `try_get_with`, which collapses
//! concurrent misses for the same key into a single lookup.

use std::future::Future;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::policy::Expiry;

use crate::errors::{LinkgateError, Result};
use crate::storage::Link;

/// Caps an entry's lifetime at the link's own expiration when that comes
/// sooner than the default TTL, so expired links stop redirecting on time.
struct LinkExpiry {
    default_ttl: Duration,
}

impl Expiry<(String, String), Option<Link>> for LinkExpiry {
    fn expire_after_create(
        &self,
        _key: &(String, String),
        value: &Option<Link>,
        _created_at: Instant,
    ) -> Option<Duration> {
        match value.as_ref().and_then(|link| link.expires_at) {
            Some(expires_at) => {
                let now = chrono::Utc::now();
                if expires_at <= now {
                    Some(Duration::from_secs(1))
                } else {
                    let remaining = (expires_at - now).num_seconds().max(1) as u64;
                    Some(Duration::from_secs(
                        remaining.min(self.default_ttl.as_secs()),
                    ))
                }
            }
            None => Some(self.default_ttl),
        }
    }
}

pub struct LinkCache {
    inner: Cache<(String, String), Option<Link>>,
}

impl LinkCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .expire_after(LinkExpiry { default_ttl: ttl })
            .build();
        Self { inner }
    }

    /// Returns the cached entry for `(domain, slug)`, running `load` on a
    /// miss. A load error is not cached; the next caller retries.
    pub async fn get_or_load<F, Fut>(
        &self,
        domain: &str,
        slug: &str,
        load: F,
    ) -> Result<Option<Link>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Link>>>,
    {
        self.inner
            .try_get_with((domain.to_string(), slug.to_string()), load())
            .await
            .map_err(|e: std::sync::Arc<LinkgateError>| (*e).clone())
    }

    pub async fn invalidate(&self, domain: &str, slug: &str) {
        self.inner
            .invalidate(&(domain.to_string(), slug.to_string()))
            .await;
    }
}
