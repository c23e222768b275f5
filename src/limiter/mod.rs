//! Fixed-window rate limiting keyed by client IP and route class.
//!
//! Buckets live in the shared KV store so limits hold across workers. IPv6
//! clients are keyed by their first four hextets (see
//! [`crate::utils::ip::rate_limit_key`]), full IPv4 addresses as-is.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use strum::AsRefStr;
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::kv::KvStore;
use crate::utils::ip::rate_limit_key;

/// Which budget a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RouteClass {
    /// General API traffic, strict budget.
    Api,
    /// Allow-listed low-cost patterns, higher budget.
    Fast,
}

/// Outcome of one limit check, with everything a 429 response needs.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// End of the current window, epoch milliseconds.
    pub reset_at_ms: i64,
}

impl RateLimitDecision {
    /// Seconds until the window resets, clamped to at least one.
    pub fn retry_after_secs(&self) -> u64 {
        let ms = self.reset_at_ms - Utc::now().timestamp_millis();
        if ms <= 0 { 1 } else { ((ms + 999) / 1000) as u64 }
    }

    /// Window reset as unix seconds, for the `X-RateLimit-Reset` header.
    pub fn reset_at_secs(&self) -> i64 {
        self.reset_at_ms.div_euclid(1000)
    }
}

struct TierLimit {
    max_requests: u64,
    window: Duration,
}

pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    api: TierLimit,
    fast: TierLimit,
    fast_patterns: Vec<Regex>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, config: &RateLimitConfig) -> Self {
        let fast_patterns = config
            .fast_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Ignoring invalid fast-path pattern {:?}: {}", pattern, e);
                    None
                }
            })
            .collect();

        Self {
            store,
            api: TierLimit {
                max_requests: config.api_max_requests,
                window: Duration::from_secs(config.api_window_secs),
            },
            fast: TierLimit {
                max_requests: config.fast_max_requests,
                window: Duration::from_secs(config.fast_window_secs),
            },
            fast_patterns,
        }
    }

    /// Picks the budget for a path: fast when any allow-list pattern matches.
    pub fn classify_route(&self, path: &str) -> RouteClass {
        if self.fast_patterns.iter().any(|re| re.is_match(path)) {
            RouteClass::Fast
        } else {
            RouteClass::Api
        }
    }

    /// Counts this request against the client's window and reports the
    /// budget state. Fails open when the store is unreachable.
    pub async fn check(&self, client_ip: &str, class: RouteClass) -> RateLimitDecision {
        let tier = match class {
            RouteClass::Api => &self.api,
            RouteClass::Fast => &self.fast,
        };
        let key = format!("rl:{}:{}", class.as_ref(), rate_limit_key(client_ip));

        match self.store.incr_window(&key, tier.window).await {
            Ok((count, reset_at_ms)) => RateLimitDecision {
                allowed: count <= tier.max_requests,
                limit: tier.max_requests,
                remaining: tier.max_requests.saturating_sub(count),
                reset_at_ms,
            },
            Err(e) => {
                warn!("Rate limit check failed, allowing request: {}", e);
                RateLimitDecision {
                    allowed: true,
                    limit: tier.max_requests,
                    remaining: tier.max_requests,
                    reset_at_ms: Utc::now().timestamp_millis() + tier.window.as_millis() as i64,
                }
            }
        }
    }
}
