mod audit;
mod error;
mod tokens;

use axum::{Json, Router, routing::get};

use crate::db::Database;
use crate::session::SessionService;

pub use audit::ADMIN_AUDIENCE;
pub use error::{ApiError, storage_message};

/// Create the API router (mounted under `/api`).
pub fn create_api_router(sessions: SessionService, db: Database) -> Router {
    let tokens_state = tokens::TokensState {
        sessions: sessions.clone(),
    };

    let audit_state = audit::AuditState { db, sessions };

    Router::new()
        .route("/health", get(health))
        .nest("/tokens", tokens::router(tokens_state))
        .nest("/admin/audit", audit::router(audit_state))
}

/// Liveness probe. On the audit skip-list by default so probes do not
/// flood the log.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
