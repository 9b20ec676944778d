//! Audit record inspection endpoints (admin surface).

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::auth::{ApiAuth, HasAuthState};
use crate::db::{Database, StoredAuditRecord};
use crate::session::SessionService;

/// Audience whose tokens may read audit records.
pub const ADMIN_AUDIENCE: &str = "admin";

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct AuditState {
    pub db: Database,
    pub sessions: SessionService,
}

impl HasAuthState for AuditState {
    fn sessions(&self) -> &SessionService {
        &self.sessions
    }
}

pub fn router(state: AuditState) -> Router {
    Router::new().route("/", get(list_records)).with_state(state)
}

#[derive(Deserialize)]
struct ListParams {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct ListResponse {
    records: Vec<StoredAuditRecord>,
}

/// List recent audit records, newest first. Requires a token issued for
/// the admin audience.
async fn list_records(
    State(state): State<AuditState>,
    ApiAuth(user): ApiAuth,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    if user.audience() != ADMIN_AUDIENCE {
        return Err(ApiError::forbidden("Admin audience required"));
    }

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let records = state.db.audit_logs().list_recent(limit).await?;

    Ok((StatusCode::OK, Json(ListResponse { records })))
}
