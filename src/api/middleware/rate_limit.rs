//! Fixed-window rate limiting middleware.
//!
//! Sits in front of every route but only counts traffic on first-party
//! hosts; tenant custom domains and static assets pass through unmetered.
//! Over-budget clients get a JSON 429 with the standard rate-limit headers;
//! allowed responses carry the same headers so well-behaved clients can
//! pace themselves.

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header::{HeaderMap, HeaderName, HeaderValue},
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use serde_json::json;
use std::rc::Rc;
use std::sync::Arc;
use tracing::trace;

use crate::config::StaticConfig;
use crate::limiter::{RateLimitDecision, RateLimiter};
use crate::routing::{Classifier, RouteIntent};
use crate::utils::ip::extract_client_ip;

#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: Arc<RateLimiter>,
    classifier: Arc<Classifier>,
    trusted_proxies: Arc<Vec<String>>,
    via_unix_socket: bool,
    enabled: bool,
}

impl RateLimitGuard {
    pub fn new(
        limiter: Arc<RateLimiter>,
        classifier: Arc<Classifier>,
        config: &StaticConfig,
    ) -> Self {
        Self {
            limiter,
            classifier,
            trusted_proxies: Arc::new(config.server.trusted_proxies.clone()),
            via_unix_socket: config.server.unix_socket.is_some(),
            enabled: config.rate_limit.enabled,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service: Rc::new(service),
            limiter: Arc::clone(&self.limiter),
            classifier: Arc::clone(&self.classifier),
            trusted_proxies: Arc::clone(&self.trusted_proxies),
            via_unix_socket: self.via_unix_socket,
            enabled: self.enabled,
        }))
    }
}

pub struct RateLimitService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    classifier: Arc<Classifier>,
    trusted_proxies: Arc<Vec<String>>,
    via_unix_socket: bool,
    enabled: bool,
}

fn insert_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let pairs = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_at_secs().to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

fn too_many_requests(decision: &RateLimitDecision) -> HttpResponse {
    let mut response = HttpResponse::TooManyRequests()
        .insert_header(("retry-after", decision.retry_after_secs().to_string()))
        .json(json!({
            "error": "Too many requests",
            "limit": decision.limit,
            "reset": decision.reset_at_secs(),
            "remaining": decision.remaining,
        }));
    insert_limit_headers(response.headers_mut(), decision);
    response
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();

        if !self.enabled {
            return Box::pin(async move { Ok(srv.call(req).await?.map_into_left_body()) });
        }

        let host = req.connection_info().host().to_string();
        let path = req.path().to_string();

        let intent = self.classifier.classify(&host, &path);
        if intent == RouteIntent::StaticAsset || !intent.is_first_party() {
            return Box::pin(async move { Ok(srv.call(req).await?.map_into_left_body()) });
        }

        let Some(ip) = extract_client_ip(req.request(), &self.trusted_proxies, self.via_unix_socket)
        else {
            trace!("No client address on {}, skipping rate limit", path);
            return Box::pin(async move { Ok(srv.call(req).await?.map_into_left_body()) });
        };

        let limiter = Arc::clone(&self.limiter);
        let class = limiter.classify_route(&path);

        Box::pin(async move {
            let decision = limiter.check(&ip, class).await;

            if !decision.allowed {
                trace!(
                    "Rate limit exceeded for {} on {} ({:?} tier)",
                    ip, path, class
                );
                return Ok(req.into_response(too_many_requests(&decision).map_into_right_body()));
            }

            let mut response = srv.call(req).await?.map_into_left_body();
            insert_limit_headers(response.headers_mut(), &decision);
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use actix_web::{App, HttpResponse, test, web};

    fn guard(api_max: u64) -> RateLimitGuard {
        let mut config = StaticConfig::default();
        config.rate_limit.api_max_requests = api_max;
        config.rate_limit.api_window_secs = 60;
        config.rate_limit.fast_patterns = vec![];
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(MemoryKvStore::new()),
            &config.rate_limit,
        ));
        let classifier = Arc::new(Classifier::new(&config.domains.root_domain, 64));
        RateLimitGuard::new(limiter, classifier, &config)
    }

    #[actix_rt::test]
    async fn test_over_budget_returns_contract_429() {
        let app = test::init_service(
            App::new()
                .wrap(guard(2))
                .route("/api/links", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let peer = "203.0.113.9:51000".parse().unwrap();
        for _ in 0..2 {
            let resp = test::call_service(
                &app,
                test::TestRequest::get()
                    .uri("/api/links")
                    .insert_header(("host", "slugy.co"))
                    .peer_addr(peer)
                    .to_request(),
            )
            .await;
            assert!(resp.status().is_success());
            assert!(resp.headers().contains_key("x-ratelimit-remaining"));
        }

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/links")
                .insert_header(("host", "slugy.co"))
                .peer_addr(peer)
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("x-ratelimit-limit").unwrap(), "2");
        assert_eq!(resp.headers().get("x-ratelimit-remaining").unwrap(), "0");
        assert!(resp.headers().contains_key("x-ratelimit-reset"));
        assert!(resp.headers().contains_key("retry-after"));

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Too many requests");
        assert_eq!(body["limit"], 2);
        assert_eq!(body["remaining"], 0);
        assert!(body["reset"].is_i64() || body["reset"].is_u64());
    }

    #[actix_rt::test]
    async fn test_custom_domain_traffic_is_never_limited() {
        let app = test::init_service(
            App::new()
                .wrap(guard(1))
                .route("/promo", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let peer = "203.0.113.9:51000".parse().unwrap();
        for _ in 0..5 {
            let resp = test::call_service(
                &app,
                test::TestRequest::get()
                    .uri("/promo")
                    .insert_header(("host", "links.tenant.com"))
                    .peer_addr(peer)
                    .to_request(),
            )
            .await;
            assert!(resp.status().is_success());
            assert!(!resp.headers().contains_key("x-ratelimit-limit"));
        }
    }
}

