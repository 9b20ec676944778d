pub mod api;
pub mod audit;
pub mod auth;
pub mod blacklist;
pub mod cleanup;
pub mod cli;
pub mod context;
pub mod db;
pub mod jwt;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, middleware};
use tokio::net::TcpListener;

use audit::{AuditConfig, AuditLogWriter, ObserveState};
use blacklist::BlacklistStore;
use db::Database;
use jwt::TokenCodec;
use session::SessionService;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret signing refresh tokens (must differ from the access secret)
    pub refresh_secret: Vec<u8>,
    /// Audience stamped into and enforced on every token
    pub audience: String,
    /// Optional issuer label
    pub issuer: Option<String>,
    /// Access token lifetime in seconds
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: u64,
    /// Keep the revocation blacklist in process memory instead of SQLite
    pub in_memory_blacklist: bool,
    /// Audit capture configuration
    pub audit: AuditConfig,
}

impl ServerConfig {
    /// Build the session service this configuration describes. Useful
    /// for host applications that issue tokens directly.
    pub fn session_service(&self) -> SessionService {
        let codec = Arc::new(
            TokenCodec::new(
                &self.access_secret,
                &self.refresh_secret,
                &self.audience,
                self.issuer.as_deref(),
            )
            .with_ttls(self.access_ttl_secs, self.refresh_ttl_secs),
        );
        let blacklist = if self.in_memory_blacklist {
            BlacklistStore::memory()
        } else {
            BlacklistStore::sqlite(self.db.revoked_tokens())
        };
        SessionService::new(codec, blacklist)
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    create_app_with_routes(config, Router::new())
}

/// Create the application router, merging host-supplied routes into the
/// observed `/api` surface so they share the context/audit pipeline.
pub fn create_app_with_routes(config: &ServerConfig, extra_api_routes: Router) -> Router {
    let sessions = config.session_service();

    let writer = AuditLogWriter::new(config.db.audit_logs(), Arc::new(config.audit.clone()));
    let observe_state = ObserveState { writer };

    let api_router = api::create_api_router(sessions, config.db.clone()).merge(extra_api_routes);

    Router::new()
        .nest("/api", api_router)
        .layer(middleware::from_fn_with_state(observe_state, audit::observe))
}

/// Run cleanup tasks and spawn the background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database, audit_retention_days: u32) {
    cleanup::run_cleanup(db, audit_retention_days).await;
    cleanup::spawn_cleanup_scheduler(db.clone(), audit_retention_days);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    init_cleanup(&config.db, config.audit.retention_days).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    (handle, local_addr)
}
