use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, Scope, web};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::analytics::{ReconcileOptions, Reconciler};
use crate::config::ReconcilerConfig;
use crate::errors::LinkgateError;

use super::error_response;

pub const CRON_SIGNATURE_HEADER: &str = "x-cron-signature";

#[derive(Debug, Deserialize)]
struct CronClaims {
    iat: i64,
    exp: i64,
}

/// Verifies the HS256 token that gates the cron endpoint. An empty signing
/// key leaves the gate permanently closed.
pub struct CronGate {
    decoding_key: Option<DecodingKey>,
    validation: Validation,
    lookback: ChronoDuration,
    max_batch_size: usize,
}

impl CronGate {
    pub fn new(config: &ReconcilerConfig) -> Self {
        let decoding_key = if config.signing_key.is_empty() {
            warn!("Reconciler signing key is empty, the cron endpoint rejects all requests");
            None
        } else {
            Some(DecodingKey::from_secret(config.signing_key.as_bytes()))
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            decoding_key,
            validation,
            lookback: ChronoDuration::hours(config.lookback_hours as i64),
            max_batch_size: config.max_batch_size,
        }
    }

    pub fn lookback(&self) -> ChronoDuration {
        self.lookback
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Checks the signature header. HMAC tag comparison inside
    /// `jsonwebtoken` is constant-time.
    pub fn verify(&self, req: &HttpRequest) -> bool {
        let Some(key) = self.decoding_key.as_ref() else {
            return false;
        };
        let Some(token) = req
            .headers()
            .get(CRON_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };

        match jsonwebtoken::decode::<CronClaims>(token, key, &self.validation) {
            Ok(data) => {
                debug!(
                    "Cron signature accepted, iat={} exp={}",
                    data.claims.iat, data.claims.exp
                );
                true
            }
            Err(e) => {
                warn!("Cron signature rejected: {}", e);
                false
            }
        }
    }
}

pub struct CronService;

impl CronService {
    /// `POST /api/cron/reconcile`: signed requests only. Runs the reconciler
    /// over the configured lookback window.
    pub async fn reconcile(
        req: HttpRequest,
        gate: web::Data<Arc<CronGate>>,
        reconciler: web::Data<Arc<Reconciler>>,
    ) -> impl Responder {
        if !gate.verify(&req) {
            return error_response(&LinkgateError::unauthorized("invalid cron signature"));
        }

        let to = Utc::now();
        let from = to - gate.lookback();
        let options = ReconcileOptions {
            max_batch_size: gate.max_batch_size(),
            dry_run: false,
        };

        let report = reconciler.reconcile(from, to, &options).await;
        info!(
            "Cron reconcile over {}h window: {} ok, {} failed, {} skipped, {} remaining",
            gate.lookback().num_hours(),
            report.success,
            report.failed,
            report.skipped,
            report.remaining
        );

        HttpResponse::Ok().json(report)
    }
}

pub fn cron_routes() -> Scope {
    web::scope("/cron").route("/reconcile", web::post().to(CronService::reconcile))
}
