//! Request id + timing middleware.
//!
//! Tags every request with a UUID, wraps the handler in a tracing span
//! carrying it, and logs slow requests. The id is echoed back in the
//! `X-Request-ID` response header and stored in request extensions for
//! handlers that want to attach it elsewhere.

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpMessage,
    dev::{ServiceRequest, ServiceResponse},
    http::header::{HeaderName, HeaderValue},
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

/// Anything slower than this gets a warning with the request id.
const SLOW_REQUEST: Duration = Duration::from_secs(1);

/// Request id, extractable from request extensions.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

#[derive(Clone, Default)]
pub struct RequestIdMiddleware;

impl<S, B> Transform<S, ServiceRequest> for RequestIdMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestIdService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestIdService {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestIdService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestIdService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
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
        let start = Instant::now();

        let request_id = Uuid::new_v4().to_string();
        req.extensions_mut().insert(RequestId(request_id.clone()));

        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %req.method(),
            path = %req.path(),
        );

        let method = req.method().clone();
        let path = req.path().to_string();

        Box::pin(
            async move {
                let mut response = srv.call(req).await?;

                let elapsed = start.elapsed();
                if elapsed >= SLOW_REQUEST {
                    warn!(
                        "Slow request: {} {} took {:?} (status {})",
                        method,
                        path,
                        elapsed,
                        response.status()
                    );
                }

                if let Ok(header_value) = HeaderValue::from_str(&request_id) {
                    response
                        .headers_mut()
                        .insert(HeaderName::from_static("x-request-id"), header_value);
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}
