//! Short-code resolution: the decision behind every redirect.
//!
//! Resolution order is fixed: temporary-marker detection, the custom-domain
//! ownership gate for non-root hosts, then lookup, soft-deletion,
//! expiration, password, and finally the workspace click quota. Lookups are
//! domain-scoped with no cross-domain fallback, so a
//! tenant's custom-domain link can never shadow a root-domain slug or vice
//! versa.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::cache::LinkCache;
use crate::errors::{LinkgateError, Result};
use crate::services::domains::DomainGate;
use crate::services::usage::UsageService;
use crate::storage::SeaOrmStorage;
use crate::utils::password::verify_password;

/// Short codes ending in this marker resolve on the temporary path: the
/// lookup bypasses the link cache and the caller issues a 302 instead of
/// the usual 307.
pub const TEMP_REDIRECT_SUFFIX: &str = "-t";

#[derive(Debug, Clone, PartialEq)]
pub enum RedirectDecision {
    Found {
        url: String,
        link_id: String,
        workspace_id: String,
    },
    NotFound,
    Expired {
        /// Link-level expiration URL; callers fall back to the configured
        /// landing page when absent.
        fallback_url: Option<String>,
    },
    PasswordRequired {
        link_id: String,
    },
    /// The workspace is at its click limit. The redirect still goes through
    /// for the visitor, but the click must not be recorded.
    QuotaExceeded {
        url: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub decision: RedirectDecision,
    /// Set when the temporary marker was present on the requested code.
    pub temporary: bool,
}

/// Splits the temporary marker off a requested short code. A code that is
/// nothing but the marker resolves as a literal slug.
pub fn split_temp_marker(raw: &str) -> (&str, bool) {
    match raw.strip_suffix(TEMP_REDIRECT_SUFFIX) {
        Some(base) if !base.is_empty() => (base, true),
        _ => (raw, false),
    }
}

pub struct LinkResolver {
    storage: Arc<SeaOrmStorage>,
    cache: Arc<LinkCache>,
    usage: Arc<UsageService>,
    domains: Arc<DomainGate>,
    root_domain: String,
}

impl LinkResolver {
    pub fn new(
        storage: Arc<SeaOrmStorage>,
        cache: Arc<LinkCache>,
        usage: Arc<UsageService>,
        domains: Arc<DomainGate>,
        root_domain: &str,
    ) -> Self {
        Self {
            storage,
            cache,
            usage,
            domains,
            root_domain: root_domain.to_ascii_lowercase(),
        }
    }

    pub async fn resolve(&self, short_code: &str, domain: &str) -> Result<Resolution> {
        self.resolve_inner(short_code, domain, None).await
    }

    /// Password unlock. Responds identically for a wrong password and an
    /// unknown slug so the endpoint cannot be used to probe for codes.
    pub async fn unlock(&self, short_code: &str, domain: &str, password: &str) -> Result<Resolution> {
        self.resolve_inner(short_code, domain, Some(password)).await
    }

    async fn resolve_inner(
        &self,
        short_code: &str,
        domain: &str,
        password: Option<&str>,
    ) -> Result<Resolution> {
        let (slug, temporary) = split_temp_marker(short_code);

        // Tenant hosts only serve links after ownership verification. The
        // gate fails open: a broken domain lookup must not take every
        // custom-domain link down with it.
        if domain != self.root_domain {
            match self.domains.serves_links(domain).await {
                Ok(true) => {}
                Ok(false) => {
                    if password.is_some() {
                        return Err(LinkgateError::unauthorized("invalid password"));
                    }
                    return Ok(Resolution {
                        decision: RedirectDecision::NotFound,
                        temporary,
                    });
                }
                Err(e) => {
                    warn!(
                        "Custom domain check failed for {}, resolving anyway: {}",
                        domain, e
                    );
                }
            }
        }

        let link = if temporary {
            // Temporary codes read through to storage so edits show up
            // immediately.
            self.storage.find_link(slug, domain).await?
        } else {
            let storage = self.storage.clone();
            let (slug_owned, domain_owned) = (slug.to_string(), domain.to_string());
            self.cache
                .get_or_load(domain, slug, || async move {
                    storage.find_link(&slug_owned, &domain_owned).await
                })
                .await?
        };

        let Some(link) = link else {
            if password.is_some() {
                return Err(LinkgateError::unauthorized("invalid password"));
            }
            return Ok(Resolution {
                decision: RedirectDecision::NotFound,
                temporary,
            });
        };

        if let Some(expires_at) = link.expires_at
            && expires_at <= Utc::now()
        {
            return Ok(Resolution {
                decision: RedirectDecision::Expired {
                    fallback_url: link.expiration_url.clone(),
                },
                temporary,
            });
        }

        if let Some(hash) = &link.password {
            match password {
                None => {
                    return Ok(Resolution {
                        decision: RedirectDecision::PasswordRequired {
                            link_id: link.id.clone(),
                        },
                        temporary,
                    });
                }
                Some(candidate) => {
                    // A malformed stored hash verifies as false rather than
                    // erroring; the response stays uniform either way.
                    if !verify_password(candidate, hash).unwrap_or(false) {
                        return Err(LinkgateError::unauthorized("invalid password"));
                    }
                }
            }
        }

        // Quota is a soft gate: a snapshot failure must not break redirects.
        match self.usage.quota_exceeded(&link.workspace_id).await {
            Ok(true) => {
                return Ok(Resolution {
                    decision: RedirectDecision::QuotaExceeded {
                        url: link.url.clone(),
                    },
                    temporary,
                });
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    "Usage lookup failed for workspace {}, allowing redirect: {}",
                    link.workspace_id, e
                );
            }
        }

        Ok(Resolution {
            decision: RedirectDecision::Found {
                url: link.url,
                link_id: link.id,
                workspace_id: link.workspace_id,
            },
            temporary,
        })
    }
}
