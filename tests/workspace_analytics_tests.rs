//! The session-gated workspace analytics endpoint: membership checks,
//! parameter validation, and aggregation over reconciled click events.

use std::sync::Arc;
use std::time::Duration;

use actix_web::cookie::Cookie;
use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::{App, web};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;
use tempfile::TempDir;

use linkgate::analytics::reconciler::ClickStore;
use linkgate::analytics::{
    AnalyticsQuery, ClickEvent, ReconcileOptions, Reconciler, Trigger, UtmParams,
};
use linkgate::api::middleware::SessionGate;
use linkgate::api::services::workspace_routes;
use linkgate::buffer::{ClickBuffer, MemoryClickBuffer};
use linkgate::config::StaticConfig;
use linkgate::services::UsageService;
use linkgate::session::{SessionClaims, SessionService};
use linkgate::storage::{Link, SeaOrmStorage, Workspace};

const SESSION_SECRET: &str = "workspace-analytics-test-secret";

// =============================================================================
// fixture
// =============================================================================

struct TestEnv {
    _dir: TempDir,
    config: StaticConfig,
    storage: Arc<SeaOrmStorage>,
    analytics: Arc<AnalyticsQuery>,
    reconciler: Arc<Reconciler>,
    sessions: Arc<SessionService>,
    buffer: Arc<dyn ClickBuffer>,
}

impl TestEnv {
    async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("workspace_analytics.db");

        let mut config = StaticConfig::default();
        config.database.database_url = format!("sqlite://{}?mode=rwc", db_path.display());
        config.session.jwt_secret = SESSION_SECRET.to_string();

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
        let analytics = Arc::new(AnalyticsQuery::new(storage.clone()));
        let sessions = Arc::new(SessionService::new(&config.session));

        Self {
            _dir: dir,
            config,
            storage,
            analytics,
            reconciler,
            sessions,
            buffer,
        }
    }

    fn state(&self) -> impl Fn(&mut web::ServiceConfig) {
        let storage = self.storage.clone();
        let analytics = self.analytics.clone();
        let sessions = self.sessions.clone();
        move |cfg: &mut web::ServiceConfig| {
            cfg.app_data(web::Data::new(storage.clone()))
                .app_data(web::Data::new(analytics.clone()))
                .app_data(web::Data::new(sessions.clone()));
        }
    }

    /// Seeds a workspace with one member and one link.
    async fn seed_workspace(&self) {
        self.storage
            .create_workspace(&Workspace {
                id: "ws1".to_string(),
                slug: "acme".to_string(),
                name: "Acme".to_string(),
                owner_id: "user-owner".to_string(),
            })
            .await
            .expect("create workspace");
        self.storage
            .create_workspace_usage("ws1", 0, 0)
            .await
            .expect("create workspace usage");
        self.storage
            .add_workspace_member("ws1", "user-member", "member")
            .await
            .expect("add member");
        self.storage
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
    }

    /// Pushes events through the buffer and reconciles them into storage.
    async fn seed_clicks(&self, events: &[ClickEvent]) {
        for event in events {
            let member = serde_json::to_string(event).expect("serialize event");
            self.buffer
                .append(&member, event.timestamp.timestamp_millis())
                .await
                .expect("buffer append");
        }
        let report = self
            .reconciler
            .reconcile(
                chrono::DateTime::UNIX_EPOCH,
                Utc::now(),
                &ReconcileOptions::default(),
            )
            .await;
        assert_eq!(report.failed, 0, "seed reconcile failed");
        assert_eq!(report.success, events.len() as u64);
    }
}

fn session_cookie(config: &StaticConfig, user_id: &str) -> Cookie<'static> {
    let now = Utc::now().timestamp();
    let claims = SessionClaims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 3600,
    };
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.session.jwt_secret.as_bytes()),
    )
    .expect("sign session token");
    Cookie::new(config.session.cookie_name.clone(), token)
}

struct ClickSpec<'a> {
    slug: &'a str,
    ip: &'a str,
    country: &'a str,
    device: &'a str,
    browser: &'a str,
}

fn click(spec: &ClickSpec<'_>) -> ClickEvent {
    let mut event = ClickEvent {
        event_id: String::new(),
        link_id: "lnk1".to_string(),
        workspace_id: "ws1".to_string(),
        slug: spec.slug.to_string(),
        domain: "slugy.co".to_string(),
        url: "https://example.com/landing".to_string(),
        ip: Some(spec.ip.to_string()),
        country: spec.country.to_string(),
        city: "unknown".to_string(),
        continent: "unknown".to_string(),
        device: spec.device.to_string(),
        browser: spec.browser.to_string(),
        os: "macOS".to_string(),
        referrer: None,
        trigger: Trigger::Link,
        utm: UtmParams::default(),
        timestamp: Utc::now(),
    };
    event.event_id = event.compute_event_id();
    event
}

fn sample_clicks() -> Vec<ClickEvent> {
    vec![
        click(&ClickSpec {
            slug: "promo",
            ip: "203.0.113.7",
            country: "US",
            device: "desktop",
            browser: "Chrome",
        }),
        click(&ClickSpec {
            slug: "promo",
            ip: "203.0.113.8",
            country: "US",
            device: "desktop",
            browser: "Firefox",
        }),
        click(&ClickSpec {
            slug: "promo",
            ip: "198.51.100.4",
            country: "DE",
            device: "mobile",
            browser: "Safari",
        }),
    ]
}

macro_rules! analytics_app {
    ($env:expr) => {
        test::init_service(
            App::new().configure($env.state()).service(
                web::scope("/api")
                    .wrap(SessionGate::new($env.sessions.clone()))
                    .service(workspace_routes()),
            ),
        )
        .await
    };
}

// =============================================================================
// access control
// =============================================================================

#[actix_rt::test]
async fn analytics_requires_a_session() {
    let env = TestEnv::new().await;
    env.seed_workspace().await;
    let app = analytics_app!(env);

    let req = TestRequest::get()
        .uri("/api/workspace/acme/analytics?metrics=totalClicks")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "authentication_required");
}

#[actix_rt::test]
async fn unknown_workspace_is_not_found() {
    let env = TestEnv::new().await;
    env.seed_workspace().await;
    let app = analytics_app!(env);

    let req = TestRequest::get()
        .uri("/api/workspace/ghost/analytics?metrics=totalClicks")
        .cookie(session_cookie(&env.config, "user-member"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn non_members_are_rejected() {
    let env = TestEnv::new().await;
    env.seed_workspace().await;
    let app = analytics_app!(env);

    let req = TestRequest::get()
        .uri("/api/workspace/acme/analytics?metrics=totalClicks")
        .cookie(session_cookie(&env.config, "user-stranger"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Unauthorized");
}

// =============================================================================
// parameter validation
// =============================================================================

#[actix_rt::test]
async fn unknown_time_period_is_rejected() {
    let env = TestEnv::new().await;
    env.seed_workspace().await;
    let app = analytics_app!(env);

    let req = TestRequest::get()
        .uri("/api/workspace/acme/analytics?time_period=1y&metrics=totalClicks")
        .cookie(session_cookie(&env.config, "user-member"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn missing_metrics_parameter_is_rejected() {
    let env = TestEnv::new().await;
    env.seed_workspace().await;
    let app = analytics_app!(env);

    let req = TestRequest::get()
        .uri("/api/workspace/acme/analytics?time_period=24h")
        .cookie(session_cookie(&env.config, "user-member"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "E006");
}

#[actix_rt::test]
async fn unknown_metric_name_is_rejected() {
    let env = TestEnv::new().await;
    env.seed_workspace().await;
    let app = analytics_app!(env);

    let req = TestRequest::get()
        .uri("/api/workspace/acme/analytics?metrics=clicks")
        .cookie(session_cookie(&env.config, "user-member"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// aggregation
// =============================================================================

#[actix_rt::test]
async fn members_read_exactly_the_requested_metrics() {
    let env = TestEnv::new().await;
    env.seed_workspace().await;
    env.seed_clicks(&sample_clicks()).await;
    let app = analytics_app!(env);

    let req = TestRequest::get()
        .uri("/api/workspace/acme/analytics?time_period=24h&metrics=totalClicks,countries,devices")
        .cookie(session_cookie(&env.config, "user-member"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;

    let keys: Vec<&String> = body.as_object().expect("json object").keys().collect();
    assert_eq!(keys.len(), 3, "only requested metrics are present: {keys:?}");
    assert_eq!(body["totalClicks"], 3);

    let countries = body["countries"].as_array().expect("countries array");
    let us = countries
        .iter()
        .find(|row| row["value"] == "US")
        .expect("US row");
    assert_eq!(us["clicks"], 2);
    let de = countries
        .iter()
        .find(|row| row["value"] == "DE")
        .expect("DE row");
    assert_eq!(de["clicks"], 1);

    let devices = body["devices"].as_array().expect("devices array");
    let desktop = devices
        .iter()
        .find(|row| row["value"] == "desktop")
        .expect("desktop row");
    assert_eq!(desktop["clicks"], 2);
}

#[actix_rt::test]
async fn dimension_filters_narrow_the_window() {
    let env = TestEnv::new().await;
    env.seed_workspace().await;
    env.seed_clicks(&sample_clicks()).await;
    let app = analytics_app!(env);

    let req = TestRequest::get()
        .uri("/api/workspace/acme/analytics?metrics=totalClicks&country_key=US")
        .cookie(session_cookie(&env.config, "user-member"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["totalClicks"], 2, "filtered to US clicks");

    let req = TestRequest::get()
        .uri("/api/workspace/acme/analytics?metrics=totalClicks,browsers&device_key=mobile")
        .cookie(session_cookie(&env.config, "user-member"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["totalClicks"], 1);
    let browsers = body["browsers"].as_array().expect("browsers array");
    assert_eq!(browsers.len(), 1);
    assert_eq!(browsers[0]["value"], "Safari");
}

#[actix_rt::test]
async fn default_period_covers_recent_clicks() {
    let env = TestEnv::new().await;
    env.seed_workspace().await;
    env.seed_clicks(&sample_clicks()).await;
    let app = analytics_app!(env);

    // No time_period parameter: the endpoint defaults to the last 24 hours.
    let req = TestRequest::get()
        .uri("/api/workspace/acme/analytics?metrics=totalClicks")
        .cookie(session_cookie(&env.config, "user-member"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["totalClicks"], 3);
}
