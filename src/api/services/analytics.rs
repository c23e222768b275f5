use std::sync::Arc;

use actix_web::{HttpResponse, Responder, Scope, web};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::analytics::{ReconcileOptions, Reconciler, UsagePayload};
use crate::buffer::ClickBuffer;
use crate::config::StaticConfig;
use crate::services::UsageService;

use super::error_response;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchRequest {
    pub max_batch_size: Option<usize>,
    pub dry_run: Option<bool>,
}

pub struct AnalyticsService;

impl AnalyticsService {
    /// `POST /api/analytics/usages`. The dispatcher fires one of these per
    /// tracked click. Only the cached usage snapshot moves here; the durable
    /// counter belongs to the reconciler.
    pub async fn record_usage(
        payload: web::Json<UsagePayload>,
        usage: web::Data<Arc<UsageService>>,
    ) -> impl Responder {
        usage.record_click(&payload.workspace_id).await;
        HttpResponse::Accepted().json(json!({ "accepted": true }))
    }

    /// `POST /api/analytics/batch` drains the click buffer into relational
    /// storage, covering everything buffered so far.
    pub async fn run_batch(
        body: Option<web::Json<BatchRequest>>,
        config: web::Data<StaticConfig>,
        reconciler: web::Data<Arc<Reconciler>>,
    ) -> impl Responder {
        let request = body.map(web::Json::into_inner).unwrap_or_default();
        let options = ReconcileOptions {
            max_batch_size: request
                .max_batch_size
                .unwrap_or(config.reconciler.max_batch_size),
            dry_run: request.dry_run.unwrap_or(false),
        };

        let report = reconciler
            .reconcile(DateTime::UNIX_EPOCH, Utc::now(), &options)
            .await;
        info!(
            "Batch reconcile finished: {} ok, {} failed, {} skipped, {} remaining",
            report.success, report.failed, report.skipped, report.remaining
        );

        HttpResponse::Ok().json(report)
    }

    /// `GET /api/analytics/batch` reports how many clicks wait in the buffer.
    pub async fn batch_status(buffer: web::Data<Arc<dyn ClickBuffer>>) -> impl Responder {
        match buffer.depth().await {
            Ok(pending) => HttpResponse::Ok().json(json!({ "pending": pending })),
            Err(e) => {
                error!("Buffer depth query failed: {}", e);
                error_response(&e)
            }
        }
    }
}

pub fn analytics_routes() -> Scope {
    web::scope("/analytics")
        .route("/usages", web::post().to(AnalyticsService::record_usage))
        .route("/batch", web::post().to(AnalyticsService::run_batch))
        .route("/batch", web::get().to(AnalyticsService::batch_status))
}
