//! Fire-and-forget click dispatch, decoupled from the redirect response.
//!
//! The handler snapshots what it needs from the request, spawns the
//! pipeline, and answers the client without waiting. Only the quota re-check
//! and the de-dup window can stop an event; the three side effects
//! (warehouse, usage endpoint, buffer) run concurrently and fail
//! independently.

use std::sync::Arc;
use std::time::Duration;

use actix_web::HttpRequest;
use actix_web::http::header;
use actix_web::http::header::HeaderMap;
use chrono::Utc;
use tracing::{debug, warn};

use super::geo::GeoResolver;
use super::sink::{UsageNotifier, WarehouseSink};
use super::{ClickEvent, Trigger, UtmParams, device};
use crate::buffer::ClickBuffer;
use crate::kv::KvStore;
use crate::services::UsageService;
use crate::utils::ip::{extract_client_ip, rate_limit_key};

/// What the redirect handler knows about the link it just served.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub link_id: String,
    pub slug: String,
    pub url: String,
    pub workspace_id: String,
    pub domain: String,
    pub trigger: Trigger,
}

/// Owned snapshot of the request, taken before the handler returns. The
/// request itself is not `Send` and never crosses into the spawned task.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub ip: Option<String>,
    pub headers: HeaderMap,
    pub query: String,
}

impl RequestParts {
    pub fn from_request(
        req: &HttpRequest,
        trusted_proxies: &[String],
        via_unix_socket: bool,
    ) -> Self {
        Self {
            ip: extract_client_ip(req, trusted_proxies, via_unix_socket),
            headers: req.headers().clone(),
            query: req.query_string().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    QuotaExceeded,
    Duplicate,
}

pub struct ClickDispatcher {
    kv: Arc<dyn KvStore>,
    buffer: Arc<dyn ClickBuffer>,
    warehouse: Arc<dyn WarehouseSink>,
    notifier: Arc<dyn UsageNotifier>,
    usage: Arc<UsageService>,
    geo: Arc<GeoResolver>,
    dedup_window: Duration,
}

impl ClickDispatcher {
    pub fn new(
        kv: Arc<dyn KvStore>,
        buffer: Arc<dyn ClickBuffer>,
        warehouse: Arc<dyn WarehouseSink>,
        notifier: Arc<dyn UsageNotifier>,
        usage: Arc<UsageService>,
        geo: Arc<GeoResolver>,
        dedup_window: Duration,
    ) -> Self {
        Self {
            kv,
            buffer,
            warehouse,
            notifier,
            usage,
            geo,
            dedup_window,
        }
    }

    /// Fire and forget. The spawned task runs to completion on its own; the
    /// caller's response never waits for it.
    pub fn dispatch(self: &Arc<Self>, parts: RequestParts, ctx: DispatchContext) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = dispatcher.process(parts, ctx).await;
            debug!("Click dispatch finished: {:?}", outcome);
        });
    }

    /// The dispatch pipeline, awaitable for tests and for callers that are
    /// already off the hot path.
    pub async fn process(&self, parts: RequestParts, ctx: DispatchContext) -> DispatchOutcome {
        // The resolver's quota gate raced with concurrent requests; check
        // again against the current snapshot before recording anything.
        match self.usage.quota_exceeded(&ctx.workspace_id).await {
            Ok(true) => {
                debug!(
                    "Workspace {} over click quota, dropping event for {}",
                    ctx.workspace_id, ctx.slug
                );
                return DispatchOutcome::QuotaExceeded;
            }
            Ok(false) => {}
            Err(e) => warn!("Quota re-check failed, dispatching anyway: {}", e),
        }

        let ip_key = parts
            .ip
            .as_deref()
            .map(rate_limit_key)
            .unwrap_or_else(|| "unknown".to_string());
        let dedup_key = format!("dedup:{}:{}:{}", ctx.domain, ctx.slug, ip_key);
        match self.kv.set_nx_ex(&dedup_key, "1", self.dedup_window).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Suppressed duplicate click for {}", dedup_key);
                return DispatchOutcome::Duplicate;
            }
            // Best-effort de-dup only; a broken store must not drop clicks.
            Err(e) => warn!("De-dup check failed, dispatching anyway: {}", e),
        }

        let event = self.build_event(&parts, ctx).await;

        let emit = async {
            if let Err(e) = self.warehouse.emit(&event).await {
                warn!("Warehouse emit failed for {}: {}", event.event_id, e);
            }
        };
        let notify = async {
            if let Err(e) = self.notifier.notify(&event).await {
                warn!("Usage notify failed for {}: {}", event.event_id, e);
            }
        };
        let append = async {
            match serde_json::to_string(&event) {
                Ok(member) => {
                    if let Err(e) = self
                        .buffer
                        .append(&member, event.timestamp.timestamp_millis())
                        .await
                    {
                        warn!("Buffer append failed for {}: {}", event.event_id, e);
                    }
                }
                Err(e) => warn!("Event serialization failed: {}", e),
            }
        };
        tokio::join!(emit, notify, append);

        DispatchOutcome::Dispatched
    }

    async fn build_event(&self, parts: &RequestParts, ctx: DispatchContext) -> ClickEvent {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok());
        let device = device::parse_user_agent(user_agent);
        let geo = self.geo.resolve(&parts.headers, parts.ip.as_deref()).await;
        let referrer = parts
            .headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from);

        let mut event = ClickEvent {
            event_id: String::new(),
            link_id: ctx.link_id,
            workspace_id: ctx.workspace_id,
            slug: ctx.slug,
            domain: ctx.domain,
            url: ctx.url,
            ip: parts.ip.clone(),
            country: geo.country,
            city: geo.city,
            continent: geo.continent,
            device: device.device,
            browser: device.browser,
            os: device.os,
            referrer,
            trigger: ctx.trigger,
            utm: UtmParams::from_query(&parts.query),
            timestamp: Utc::now(),
        };
        event.event_id = event.compute_event_id();
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_request_parts_snapshot() {
        let req = TestRequest::default()
            .insert_header((header::USER_AGENT, "Test/1.0"))
            .insert_header(("x-forwarded-for", "203.0.113.7, 10.0.0.1"))
            .uri("/promo?utm_source=newsletter&x=1")
            .to_http_request();

        let parts = RequestParts::from_request(&req, &[], false);

        // TestRequest has no peer address, so the forwarded chain is unused
        // and no IP is attributed.
        assert!(parts.ip.is_none());
        assert_eq!(parts.query, "utm_source=newsletter&x=1");
        assert_eq!(
            parts.headers.get(header::USER_AGENT).unwrap(),
            "Test/1.0"
        );
    }

    #[test]
    fn test_trigger_values_match_wire_format() {
        assert_eq!(Trigger::Link.as_ref(), "link");
        assert_eq!(Trigger::Qr.as_ref(), "qr");
    }
}
