//! Token lifecycle API endpoints.
//!
//! - POST `/refresh` - Exchange a refresh token for a new pair (rotation)
//! - POST `/logout` - Revoke supplied tokens; always succeeds
//! - GET `/verify` - Check that the presented access token is still valid

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::audit::{AuditAction, AuditContent};
use crate::auth::{ApiAuth, HasAuthState};
use crate::session::SessionService;

#[derive(Clone)]
pub struct TokensState {
    pub sessions: SessionService,
}

impl HasAuthState for TokensState {
    fn sessions(&self) -> &SessionService {
        &self.sessions
    }
}

pub fn router(state: TokensState) -> Router {
    Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/verify", get(verify))
        .with_state(state)
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Serialize)]
struct TokenPairResponse {
    access_token: String,
    refresh_token: String,
}

/// Exchange a refresh token for a fresh pair. The presented token is
/// consumed; a second exchange with it fails with 401.
async fn refresh(
    State(state): State<TokensState>,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state.sessions.refresh(&request.refresh_token).await?;

    Ok((
        StatusCode::OK,
        Json(TokenPairResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    ))
}

#[derive(Deserialize)]
struct LogoutRequest {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Revoke the supplied tokens for their remaining lifetimes. Idempotent:
/// expired, already-revoked or undecodable tokens are skipped silently.
async fn logout(
    State(state): State<TokensState>,
    Json(request): Json<LogoutRequest>,
) -> Result<Response, ApiError> {
    state
        .sessions
        .logout(request.access_token.as_deref(), request.refresh_token.as_deref())
        .await?;

    let mut response =
        (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response();
    response
        .extensions_mut()
        .insert(AuditContent("session logout".to_string()));
    response
        .extensions_mut()
        .insert(AuditAction("logout".to_string()));
    Ok(response)
}

/// Lightweight auth check: 200 when the access token verifies (and is
/// not blacklisted), 401 otherwise.
async fn verify(ApiAuth(_user): ApiAuth) -> impl IntoResponse {
    StatusCode::OK
}
