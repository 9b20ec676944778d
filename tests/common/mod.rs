#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use gatelog::audit::AuditConfig;
use gatelog::db::Database;
use gatelog::session::{SessionService, TokenPair};
use gatelog::{ServerConfig, create_app, create_app_with_routes};
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"access-secret-for-tests-0123456789ab";
pub const REFRESH_SECRET: &[u8] = b"refresh-secret-for-tests-0123456789a";

pub struct TestContext {
    pub app: Router,
    pub db: Database,
    pub sessions: SessionService,
}

pub async fn setup() -> TestContext {
    TestSetup::new().build().await
}

/// Builder for test setup with various options
pub struct TestSetup {
    audience: String,
    audit: AuditConfig,
    extra_routes: Option<Router>,
}

impl TestSetup {
    pub fn new() -> Self {
        Self {
            audience: "client".to_string(),
            audit: AuditConfig::default(),
            extra_routes: None,
        }
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.audience = audience.to_string();
        self
    }

    pub fn with_audit(mut self, audit: AuditConfig) -> Self {
        self.audit = audit;
        self
    }

    /// Extra routes are nested under /api, inside the capture middleware.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.extra_routes = Some(routes);
        self
    }

    pub async fn build(self) -> TestContext {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");

        let config = ServerConfig {
            db: db.clone(),
            access_secret: ACCESS_SECRET.to_vec(),
            refresh_secret: REFRESH_SECRET.to_vec(),
            audience: self.audience,
            issuer: Some("gatelog-tests".to_string()),
            access_ttl_secs: 900,
            refresh_ttl_secs: 14 * 24 * 60 * 60,
            in_memory_blacklist: false,
            audit: self.audit,
        };

        let sessions = config.session_service();
        let app = match self.extra_routes {
            Some(routes) => create_app_with_routes(&config, routes),
            None => create_app(&config),
        };

        TestContext { app, db, sessions }
    }
}

impl TestContext {
    /// Issue a fresh token pair for the given user, bypassing HTTP.
    pub fn issue(&self, user_id: &str, username: &str) -> TokenPair {
        self.sessions
            .issue_pair(user_id, username)
            .expect("Failed to issue token pair")
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    pub async fn get(&self, path: &str) -> Response<Body> {
        self.request(
            Request::builder()
                .uri(path)
                .body(Body::empty())
                .expect("Failed to build request"),
        )
        .await
    }

    pub async fn get_bearer(&self, path: &str, token: &str) -> Response<Body> {
        self.request(
            Request::builder()
                .uri(path)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("Failed to build request"),
        )
        .await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Response<Body> {
        self.request(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("Failed to build request"),
        )
        .await
    }

    /// Audit records are written from a spawned task, so poll until the
    /// expected count is visible or the deadline passes.
    pub async fn wait_for_audit_count(&self, expected: i64) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let count = self
                .db
                .audit_logs()
                .count()
                .await
                .expect("Failed to count audit records");
            if count >= expected {
                assert_eq!(count, expected, "more audit records than expected");
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("expected {expected} audit records, found {count}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body was not valid JSON")
}
