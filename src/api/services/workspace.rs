use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, Scope, web};
use serde::Deserialize;
use tracing::error;

use crate::analytics::{AnalyticsQuery, DimensionFilters, Metric, TimePeriod};
use crate::errors::LinkgateError;
use crate::session::SessionService;
use crate::storage::SeaOrmStorage;

use super::error_response;

#[derive(Debug, Deserialize)]
pub struct AnalyticsParams {
    pub time_period: Option<String>,
    /// Comma-separated metric names.
    pub metrics: Option<String>,
    pub country_key: Option<String>,
    pub city_key: Option<String>,
    pub continent_key: Option<String>,
    pub device_key: Option<String>,
    pub browser_key: Option<String>,
    pub os_key: Option<String>,
    pub referrer_key: Option<String>,
    pub slug_key: Option<String>,
    pub destination_key: Option<String>,
}

pub struct WorkspaceService;

impl WorkspaceService {
    /// `GET /api/workspace/{slug}/analytics`. Requires a session whose user
    /// owns or belongs to the workspace.
    pub async fn analytics(
        req: HttpRequest,
        path: web::Path<String>,
        params: web::Query<AnalyticsParams>,
        sessions: web::Data<Arc<SessionService>>,
        storage: web::Data<Arc<SeaOrmStorage>>,
        analytics: web::Data<Arc<AnalyticsQuery>>,
    ) -> impl Responder {
        let slug = path.into_inner();

        let Some(session) = sessions.resolve(&req) else {
            return error_response(&LinkgateError::unauthorized("authentication required"));
        };

        let workspace = match storage.find_workspace_by_slug(&slug).await {
            Ok(Some(ws)) => ws,
            Ok(None) => {
                return error_response(&LinkgateError::not_found(format!(
                    "workspace {slug} not found"
                )));
            }
            Err(e) => {
                error!("Workspace lookup failed for {}: {}", slug, e);
                return error_response(&e);
            }
        };

        match storage
            .is_workspace_member(&workspace.id, &session.user_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return error_response(&LinkgateError::unauthorized(
                    "not a member of this workspace",
                ));
            }
            Err(e) => {
                error!("Membership check failed for {}: {}", slug, e);
                return error_response(&e);
            }
        }

        let period = match params
            .time_period
            .as_deref()
            .unwrap_or("24h")
            .parse::<TimePeriod>()
        {
            Ok(p) => p,
            Err(_) => return error_response(&LinkgateError::validation("unknown time_period")),
        };

        let metrics = match params.metrics.as_deref() {
            Some(raw) => match Metric::parse_list(raw) {
                Ok(m) => m,
                Err(e) => return error_response(&e),
            },
            None => {
                return error_response(&LinkgateError::validation(
                    "metrics query parameter is required",
                ));
            }
        };

        let filters = DimensionFilters {
            country: params.country_key.clone(),
            city: params.city_key.clone(),
            continent: params.continent_key.clone(),
            device: params.device_key.clone(),
            browser: params.browser_key.clone(),
            os: params.os_key.clone(),
            referrer: params.referrer_key.clone(),
            slug: params.slug_key.clone(),
            destination: params.destination_key.clone(),
        };

        match analytics
            .run(&workspace.id, period, &metrics, &filters)
            .await
        {
            Ok(response) => HttpResponse::Ok().json(response),
            Err(e) => {
                error!("Analytics query failed for {}: {}", slug, e);
                error_response(&e)
            }
        }
    }
}

pub fn workspace_routes() -> Scope {
    web::scope("/workspace").route("/{slug}/analytics", web::get().to(WorkspaceService::analytics))
}
