//! Session gate middleware.
//!
//! Resolves the session cookie once per request and rejects unauthenticated
//! traffic. Public paths and static assets never touch the JWT decoder; the
//! resolved session is memoized so handlers read it for free.

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use serde_json::json;
use std::rc::Rc;
use std::sync::Arc;
use tracing::trace;

use crate::routing::is_static_asset;
use crate::session::SessionService;

#[derive(Clone)]
pub struct SessionGate {
    sessions: Arc<SessionService>,
}

impl SessionGate {
    pub fn new(sessions: Arc<SessionService>) -> Self {
        Self { sessions }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = SessionGateService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionGateService {
            service: Rc::new(service),
            sessions: Arc::clone(&self.sessions),
        }))
    }
}

pub struct SessionGateService<S> {
    service: Rc<S>,
    sessions: Arc<SessionService>,
}

impl<S, B> Service<ServiceRequest> for SessionGateService<S>
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
        let path = req.path();

        // Allow-listed and asset paths skip JWT work entirely.
        if self.sessions.is_public_path(path) || is_static_asset(path) {
            return Box::pin(async move { Ok(srv.call(req).await?.map_into_left_body()) });
        }

        if self.sessions.resolve(req.request()).is_some() {
            return Box::pin(async move { Ok(srv.call(req).await?.map_into_left_body()) });
        }

        trace!("No valid session on {}, rejecting", path);
        Box::pin(async move {
            let response = HttpResponse::Unauthorized()
                .json(json!({ "error": "authentication_required" }))
                .map_into_right_body();
            Ok(req.into_response(response))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use actix_web::{App, HttpResponse, test, web};
    use jsonwebtoken::{Algorithm, EncodingKey, Header};

    fn sessions() -> Arc<SessionService> {
        let config = SessionConfig {
            jwt_secret: "gate-test-secret".to_string(),
            public_paths: vec!["/api/redirect/".to_string()],
            ..SessionConfig::default()
        };
        Arc::new(SessionService::new(&config))
    }

    fn session_cookie(service: &SessionService, secret: &str) -> actix_web::cookie::Cookie<'static> {
        let now = chrono::Utc::now().timestamp();
        let claims = serde_json::json!({ "sub": "user-1", "iat": now, "exp": now + 3600 });
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        actix_web::cookie::Cookie::new(service.cookie_name().to_string(), token)
    }

    #[actix_rt::test]
    async fn test_rejects_without_session() {
        let app = test::init_service(
            App::new()
                .wrap(SessionGate::new(sessions()))
                .route("/api/workspace/acme/analytics", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/workspace/acme/analytics")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_rt::test]
    async fn test_public_path_passes_unauthenticated() {
        let app = test::init_service(
            App::new()
                .wrap(SessionGate::new(sessions()))
                .route("/api/redirect/abc", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/redirect/abc").to_request(),
        )
        .await;
        assert!(resp.status().is_success());
    }

    #[actix_rt::test]
    async fn test_valid_cookie_passes() {
        let service = sessions();
        let cookie = session_cookie(&service, "gate-test-secret");
        let app = test::init_service(
            App::new()
                .wrap(SessionGate::new(service))
                .route("/api/workspace/acme/analytics", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/workspace/acme/analytics")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert!(resp.status().is_success());
    }
}
