//! The tenant-host gate: which custom domains may serve short links.
//!
//! Domain rows change rarely, so lookups are cached with a generous TTL.
//! Only a registered domain whose ownership is verified serves links;
//! anything else on a non-first-party host resolves like an unknown slug.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::errors::LinkgateError;
use crate::errors::Result;
use crate::storage::{CustomDomain, SeaOrmStorage};

pub struct DomainGate {
    storage: Arc<SeaOrmStorage>,
    domains: Cache<String, Option<CustomDomain>>,
}

impl DomainGate {
    pub fn new(storage: Arc<SeaOrmStorage>, capacity: u64, ttl: Duration) -> Self {
        let domains = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { storage, domains }
    }

    /// Cached domain row, `None` for hosts no tenant registered.
    pub async fn find(&self, domain: &str) -> Result<Option<CustomDomain>> {
        let storage = self.storage.clone();
        let key = domain.to_string();
        self.domains
            .try_get_with(key.clone(), async move {
                storage.find_custom_domain(&key).await
            })
            .await
            .map_err(|e: std::sync::Arc<LinkgateError>| (*e).clone())
    }

    /// True when the host is registered and its ownership is verified.
    /// `dns_configured` is deliberately not required: DNS propagation lags
    /// verification, and a tenant pointing traffic at us early should not
    /// see their links dark.
    pub async fn serves_links(&self, domain: &str) -> Result<bool> {
        Ok(self
            .find(domain)
            .await?
            .map(|row| row.verified)
            .unwrap_or(false))
    }

    pub async fn invalidate(&self, domain: &str) {
        self.domains.invalidate(domain).await;
    }
}
