use std::borrow::Cow;
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, Responder, Scope, web};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::analytics::{ClickDispatcher, DispatchContext, RequestParts, Trigger};
use crate::config::StaticConfig;
use crate::errors::LinkgateError;
use crate::routing::{Classifier, RouteIntent};
use crate::services::{LinkResolver, RedirectDecision, Resolution, split_temp_marker};

use super::error_response;

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub password: String,
    pub domain: Option<String>,
}

pub struct RedirectService {}

impl RedirectService {
    /// Edge catch-all. Classifies the host/path, then either short-circuits
    /// (static asset, non-link host) or resolves the short code and issues
    /// the real redirect.
    pub async fn handle_redirect(
        req: HttpRequest,
        path: web::Path<String>,
        config: web::Data<StaticConfig>,
        classifier: web::Data<Arc<Classifier>>,
        resolver: web::Data<Arc<LinkResolver>>,
        dispatcher: web::Data<Arc<ClickDispatcher>>,
    ) -> impl Responder {
        let captured_path = path.into_inner();
        let host = req.connection_info().host().to_string();
        let intent = classifier.classify(&host, req.path());

        if intent == RouteIntent::StaticAsset {
            // Never hits the resolver or the session layer.
            return Self::not_found_response();
        }

        if !intent.serves_short_links() {
            debug!("Host {} classified {:?}, forwarding to app", host, intent);
            return Self::app_redirect(&req, &config);
        }

        if captured_path.is_empty() {
            // Bare apex or custom-domain root goes to the dashboard.
            return Self::app_redirect(&req, &config);
        }

        if captured_path.contains('/') {
            return Self::not_found_response();
        }

        let domain = classifier.canonical_host(&host);
        match resolver.resolve(&captured_path, &domain).await {
            Ok(resolution) => {
                Self::edge_resolution_response(&req, &config, &dispatcher, &captured_path, domain, resolution)
            }
            Err(e) => {
                error!("Redirect lookup failed for {}/{}: {}", domain, captured_path, e);
                Self::error_response()
            }
        }
    }

    fn edge_resolution_response(
        req: &HttpRequest,
        config: &StaticConfig,
        dispatcher: &Arc<ClickDispatcher>,
        short_code: &str,
        domain: String,
        resolution: Resolution,
    ) -> HttpResponse {
        match resolution.decision {
            RedirectDecision::Found {
                url,
                link_id,
                workspace_id,
            } => {
                Self::dispatch_click(
                    req,
                    config,
                    dispatcher,
                    DispatchContext {
                        link_id,
                        slug: split_temp_marker(short_code).0.to_string(),
                        url: url.clone(),
                        workspace_id,
                        domain,
                        trigger: trigger_from_query(req.query_string()),
                    },
                );
                Self::finish_redirect(req, &url, resolution.temporary)
            }
            RedirectDecision::QuotaExceeded { url } => {
                debug!("Click quota exhausted for {}/{}, redirecting untracked", domain, short_code);
                Self::finish_redirect(req, &url, resolution.temporary)
            }
            RedirectDecision::Expired { fallback_url } => {
                let target =
                    fallback_url.unwrap_or_else(|| config.domains.expired_fallback_url.clone());
                HttpResponse::Found()
                    .insert_header(("Location", target))
                    .finish()
            }
            RedirectDecision::PasswordRequired { link_id } => HttpResponse::Unauthorized().json(json!({
                "error": "password_required",
                "linkId": link_id,
            })),
            RedirectDecision::NotFound => Self::not_found_response(),
        }
    }

    /// `GET /api/redirect/{short_code}?domain=` for callers that need the
    /// destination without following a redirect themselves.
    pub async fn resolve_api(
        req: HttpRequest,
        path: web::Path<String>,
        query: web::Query<ResolveQuery>,
        config: web::Data<StaticConfig>,
        resolver: web::Data<Arc<LinkResolver>>,
        dispatcher: web::Data<Arc<ClickDispatcher>>,
    ) -> impl Responder {
        let short_code = path.into_inner();
        let domain = query
            .domain
            .clone()
            .unwrap_or_else(|| config.domains.root_domain.clone());

        match resolver.resolve(&short_code, &domain).await {
            Ok(resolution) => {
                Self::api_resolution_response(&req, &config, &dispatcher, &short_code, domain, resolution)
            }
            Err(e) => {
                error!("API resolve failed for {}/{}: {}", domain, short_code, e);
                error_response(&e)
            }
        }
    }

    /// `POST /api/redirect/{short_code}` with a password attempts to unlock
    /// a protected link. Success behaves exactly like a plain resolve.
    pub async fn unlock_api(
        req: HttpRequest,
        path: web::Path<String>,
        body: web::Json<UnlockRequest>,
        config: web::Data<StaticConfig>,
        resolver: web::Data<Arc<LinkResolver>>,
        dispatcher: web::Data<Arc<ClickDispatcher>>,
    ) -> impl Responder {
        let short_code = path.into_inner();
        let domain = body
            .domain
            .clone()
            .unwrap_or_else(|| config.domains.root_domain.clone());

        match resolver.unlock(&short_code, &domain, &body.password).await {
            Ok(resolution) => {
                Self::api_resolution_response(&req, &config, &dispatcher, &short_code, domain, resolution)
            }
            Err(e) => {
                debug!("Unlock rejected for {}/{}: {}", domain, short_code, e);
                error_response(&e)
            }
        }
    }

    fn api_resolution_response(
        req: &HttpRequest,
        config: &StaticConfig,
        dispatcher: &Arc<ClickDispatcher>,
        short_code: &str,
        domain: String,
        resolution: Resolution,
    ) -> HttpResponse {
        match resolution.decision {
            RedirectDecision::Found {
                url,
                link_id,
                workspace_id,
            } => {
                Self::dispatch_click(
                    req,
                    config,
                    dispatcher,
                    DispatchContext {
                        link_id,
                        slug: split_temp_marker(short_code).0.to_string(),
                        url: url.clone(),
                        workspace_id,
                        domain,
                        trigger: trigger_from_query(req.query_string()),
                    },
                );
                HttpResponse::Ok().json(json!({ "url": url }))
            }
            // Over quota the caller still gets the destination; the click
            // is simply not recorded.
            RedirectDecision::QuotaExceeded { url } => HttpResponse::Ok().json(json!({ "url": url })),
            RedirectDecision::Expired { fallback_url } => {
                let mut body = json!({ "error": "link_expired" });
                if let Some(target) = fallback_url {
                    body["redirectUrl"] = json!(target);
                }
                HttpResponse::Gone().json(body)
            }
            RedirectDecision::PasswordRequired { link_id } => HttpResponse::Unauthorized().json(json!({
                "error": "password_required",
                "linkId": link_id,
            })),
            RedirectDecision::NotFound => error_response(&LinkgateError::not_found("link not found")),
        }
    }

    /// Snapshots the request and hands the click to the dispatcher. Returns
    /// immediately; the response never waits for analytics.
    fn dispatch_click(
        req: &HttpRequest,
        config: &StaticConfig,
        dispatcher: &Arc<ClickDispatcher>,
        ctx: DispatchContext,
    ) {
        let parts = RequestParts::from_request(
            req,
            &config.server.trusted_proxies,
            config.server.unix_socket.is_some(),
        );
        dispatcher.dispatch(parts, ctx);
    }

    fn finish_redirect(req: &HttpRequest, target: &str, temporary: bool) -> HttpResponse {
        let target_url = Self::build_target_url(req, target);
        let status = if temporary {
            StatusCode::FOUND
        } else {
            StatusCode::TEMPORARY_REDIRECT
        };

        HttpResponse::build(status)
            .insert_header(("Location", target_url.as_ref()))
            .finish()
    }

    fn app_redirect(req: &HttpRequest, config: &StaticConfig) -> HttpResponse {
        let base = config.domains.app_redirect_url.trim_end_matches('/');
        let mut location = format!("{}{}", base, req.path());
        let query = req.query_string();
        if !query.is_empty() {
            location.push('?');
            location.push_str(query);
        }

        HttpResponse::TemporaryRedirect()
            .insert_header(("Location", location))
            .finish()
    }

    #[inline]
    fn not_found_response() -> HttpResponse {
        HttpResponse::build(StatusCode::NOT_FOUND)
            .insert_header(("Content-Type", "text/html; charset=utf-8"))
            .insert_header(("Cache-Control", "public, max-age=60"))
            .body("Not Found")
    }

    #[inline]
    fn error_response() -> HttpResponse {
        HttpResponse::build(StatusCode::INTERNAL_SERVER_ERROR)
            .insert_header(("Content-Type", "text/html; charset=utf-8"))
            .body("Internal Server Error")
    }

    /// Appends the request's UTM parameters to the destination so campaign
    /// attribution survives the hop.
    #[inline]
    fn build_target_url<'a>(req: &HttpRequest, target: &'a str) -> Cow<'a, str> {
        let Some(query) = req.uri().query() else {
            return Cow::Borrowed(target);
        };

        let utm_params = Self::extract_utm_params_raw(query);
        if utm_params.is_empty() {
            return Cow::Borrowed(target);
        }

        // Raw fragments pass through unchanged, so no re-encoding happens.
        let separator = if target.contains('?') { "&" } else { "?" };
        let utm_query = utm_params.join("&");

        Cow::Owned(format!("{}{}{}", target, separator, utm_query))
    }

    #[inline]
    fn extract_utm_params_raw(query: &str) -> Vec<&str> {
        const UTM_KEYS: [&str; 5] = [
            "utm_source",
            "utm_medium",
            "utm_campaign",
            "utm_term",
            "utm_content",
        ];

        query
            .split('&')
            .filter(|part| {
                part.find('=')
                    .map(|pos| UTM_KEYS.contains(&&part[..pos]))
                    .unwrap_or(false)
            })
            .collect()
    }
}

fn trigger_from_query(query: &str) -> Trigger {
    for part in query.split('&') {
        if let Some(value) = part.strip_prefix("qr=")
            && (value == "1" || value.eq_ignore_ascii_case("true"))
        {
            return Trigger::Qr;
        }
    }
    Trigger::Link
}

pub fn redirect_api_routes() -> Scope {
    web::scope("/redirect")
        .route("/{short_code}", web::get().to(RedirectService::resolve_api))
        .route("/{short_code}", web::post().to(RedirectService::unlock_api))
}

/// Catch-all edge routes. Must be registered last.
pub fn redirect_routes() -> Scope {
    web::scope("")
        .route("/{path:.*}", web::get().to(RedirectService::handle_redirect))
        .route("/{path:.*}", web::head().to(RedirectService::handle_redirect))
}
