//! The signed cron reconcile endpoint, end to end: signature verification
//! through the gate, then a real reconcile run over the lookback window.

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::{App, web};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;
use tempfile::TempDir;

use linkgate::analytics::reconciler::ClickStore;
use linkgate::analytics::{ClickEvent, Reconciler, Trigger, UtmParams};
use linkgate::api::middleware::SessionGate;
use linkgate::api::services::{CRON_SIGNATURE_HEADER, CronGate, cron_routes};
use linkgate::buffer::{ClickBuffer, MemoryClickBuffer};
use linkgate::config::StaticConfig;
use linkgate::services::UsageService;
use linkgate::session::SessionService;
use linkgate::storage::{Link, SeaOrmStorage, Workspace};

const CRON_SECRET: &str = "cron-endpoint-test-secret";

// =============================================================================
// fixture
// =============================================================================

struct TestEnv {
    _dir: TempDir,
    storage: Arc<SeaOrmStorage>,
    reconciler: Arc<Reconciler>,
    sessions: Arc<SessionService>,
    cron_gate: Arc<CronGate>,
    buffer: Arc<dyn ClickBuffer>,
}

impl TestEnv {
    async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("cron_endpoint.db");

        let mut config = StaticConfig::default();
        config.database.database_url = format!("sqlite://{}?mode=rwc", db_path.display());
        config.reconciler.signing_key = CRON_SECRET.to_string();

        let storage = Arc::new(
            SeaOrmStorage::new(&config.database)
                .await
                .expect("storage init"),
        );
        let buffer: Arc<dyn ClickBuffer> = Arc::new(MemoryClickBuffer::new());
        let usage = Arc::new(UsageService::new(
            storage.clone(),
            128,
            Duration::from_secs(30),
        ));
        let store: Arc<dyn ClickStore> = storage.clone();
        let reconciler = Arc::new(Reconciler::new(
            buffer.clone(),
            store,
            usage,
            Duration::from_secs(10),
        ));
        let sessions = Arc::new(SessionService::new(&config.session));
        let cron_gate = Arc::new(CronGate::new(&config.reconciler));

        Self {
            _dir: dir,
            storage,
            reconciler,
            sessions,
            cron_gate,
            buffer,
        }
    }

    fn state(&self) -> impl Fn(&mut web::ServiceConfig) {
        let reconciler = self.reconciler.clone();
        let cron_gate = self.cron_gate.clone();
        move |cfg: &mut web::ServiceConfig| {
            cfg.app_data(web::Data::new(reconciler.clone()))
                .app_data(web::Data::new(cron_gate.clone()));
        }
    }
}

fn sign(secret: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = serde_json::json!({ "iat": now, "exp": now + 300 });
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("sign token")
}

macro_rules! cron_app {
    ($env:expr) => {
        test::init_service(
            App::new().configure($env.state()).service(
                web::scope("/api")
                    .wrap(SessionGate::new($env.sessions.clone()))
                    .service(cron_routes()),
            ),
        )
        .await
    };
}

// =============================================================================
// gate behavior
// =============================================================================

#[actix_rt::test]
async fn reconcile_rejects_unsigned_requests() {
    let env = TestEnv::new().await;
    let app = cron_app!(env);

    let req = TestRequest::post().uri("/api/cron/reconcile").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["code"], "E003");
}

#[actix_rt::test]
async fn reconcile_rejects_foreign_signatures() {
    let env = TestEnv::new().await;
    let app = cron_app!(env);

    let req = TestRequest::post()
        .uri("/api/cron/reconcile")
        .insert_header((CRON_SIGNATURE_HEADER, sign("some-other-secret")))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn signed_reconcile_returns_empty_report() {
    let env = TestEnv::new().await;
    let app = cron_app!(env);

    let req = TestRequest::post()
        .uri("/api/cron/reconcile")
        .insert_header((CRON_SIGNATURE_HEADER, sign(CRON_SECRET)))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let report: Value = test::read_body_json(resp).await;
    assert_eq!(report["success"], 0);
    assert_eq!(report["failed"], 0);
    assert_eq!(report["remaining"], 0);
    assert_eq!(report["dryRun"], false);
}

// =============================================================================
// reconcile through the endpoint
// =============================================================================

#[actix_rt::test]
async fn signed_reconcile_persists_buffered_clicks() {
    let env = TestEnv::new().await;
    env.storage
        .create_workspace(&Workspace {
            id: "ws1".to_string(),
            slug: "ws1-team".to_string(),
            name: "ws1 team".to_string(),
            owner_id: "user-ws1".to_string(),
        })
        .await
        .expect("create workspace");
    env.storage
        .create_workspace_usage("ws1", 0, 0)
        .await
        .expect("create workspace usage");
    env.storage
        .create_link(&Link {
            id: "lnk1".to_string(),
            slug: "promo".to_string(),
            domain: "slugy.co".to_string(),
            url: "https://example.com/landing".to_string(),
            password: None,
            expires_at: None,
            expiration_url: None,
            workspace_id: "ws1".to_string(),
        })
        .await
        .expect("create link");

    let mut event = ClickEvent {
        event_id: String::new(),
        link_id: "lnk1".to_string(),
        workspace_id: "ws1".to_string(),
        slug: "promo".to_string(),
        domain: "slugy.co".to_string(),
        url: "https://example.com/landing".to_string(),
        ip: Some("203.0.113.7".to_string()),
        country: "US".to_string(),
        city: "Seattle".to_string(),
        continent: "NA".to_string(),
        device: "desktop".to_string(),
        browser: "Chrome".to_string(),
        os: "macOS".to_string(),
        referrer: None,
        trigger: Trigger::Link,
        utm: UtmParams::default(),
        timestamp: Utc::now(),
    };
    event.event_id = event.compute_event_id();
    let member = serde_json::to_string(&event).expect("serialize event");
    env.buffer
        .append(&member, event.timestamp.timestamp_millis())
        .await
        .expect("buffer append");

    let app = cron_app!(env);

    let req = TestRequest::post()
        .uri("/api/cron/reconcile")
        .insert_header((CRON_SIGNATURE_HEADER, sign(CRON_SECRET)))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let report: Value = test::read_body_json(resp).await;
    assert_eq!(report["success"], 1);
    assert_eq!(report["remaining"], 0);
    assert_eq!(report["workspaces"]["ws1"]["success"], 1);

    let rows = env.storage.list_click_events("ws1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].slug, "promo");
    assert_eq!(rows[0].event_id, event.event_id);
    assert_eq!(env.buffer.depth().await.unwrap(), 0);
}
