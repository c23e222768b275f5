//! HTTP services: the edge redirect handler plus the JSON API surface.

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde_json::json;

use crate::errors::LinkgateError;

pub mod analytics;
pub mod cron;
pub mod health;
pub mod redirect;
pub mod workspace;

pub use analytics::{AnalyticsService, analytics_routes};
pub use cron::{CRON_SIGNATURE_HEADER, CronGate, CronService, cron_routes};
pub use health::{AppStartTime, HealthService, health_routes};
pub use redirect::{RedirectService, redirect_api_routes, redirect_routes};
pub use workspace::{WorkspaceService, workspace_routes};

/// Maps a domain error onto the JSON error shape shared by every API route.
pub(crate) fn error_response(err: &LinkgateError) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    HttpResponse::build(status).json(json!({
        "error": err.error_type(),
        "message": err.message(),
        "code": err.code(),
    }))
}
