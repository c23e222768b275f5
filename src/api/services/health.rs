use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{HttpResponse, Responder, Scope, web};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::warn;

use crate::storage::SeaOrmStorage;

/// Recorded once at process start so the health endpoint can report uptime.
#[derive(Clone)]
pub struct AppStartTime {
    pub start_datetime: DateTime<Utc>,
}

pub struct HealthService;

impl HealthService {
    pub async fn health_check(
        storage: web::Data<Arc<SeaOrmStorage>>,
        start_time: web::Data<AppStartTime>,
    ) -> impl Responder {
        let started = Instant::now();
        let now = Utc::now();
        let uptime = (now - start_time.start_datetime).num_seconds().max(0);

        let db_ok = match tokio::time::timeout(
            Duration::from_secs(5),
            storage.get_db().ping(),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Health check database ping failed: {}", e);
                false
            }
            Err(_) => {
                warn!("Health check database ping timed out");
                false
            }
        };

        let body = json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "timestamp": now.to_rfc3339(),
            "uptime": uptime,
            "backend": storage.get_backend_name(),
            "responseTimeMs": started.elapsed().as_millis() as u64,
        });

        if db_ok {
            HttpResponse::Ok().json(body)
        } else {
            HttpResponse::ServiceUnavailable().json(body)
        }
    }
}

pub fn health_routes() -> Scope {
    web::scope("/health")
        .route("", web::get().to(HealthService::health_check))
        .route("", web::head().to(HealthService::health_check))
}
