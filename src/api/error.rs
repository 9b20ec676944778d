//! Uniform error translation for API endpoints.
//!
//! Every failure leaving a handler is rendered as the stable body
//! `{"code": <status>, "message": <text>}` with the code duplicated as
//! the HTTP status. The chosen pair is also attached to the response as
//! an extension so the audit middleware can log it without re-deriving.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::audit::ErrorOutcome;
use crate::session::SessionError;

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Fixed lookup for storage errors. Known SQLite codes get a stable
/// message; unknown codes fall back to the raw error text. Either way
/// the failure stays in the server-error class.
pub fn storage_message(e: &sqlx::Error) -> String {
    if matches!(e, sqlx::Error::RowNotFound) {
        return "Record not found".to_string();
    }
    match e.as_database_error().and_then(|d| d.code()) {
        // SQLITE_CONSTRAINT_UNIQUE / SQLITE_CONSTRAINT_PRIMARYKEY
        Some(code) if code == "2067" || code == "1555" => {
            "Unique constraint violated".to_string()
        }
        // SQLITE_CONSTRAINT_FOREIGNKEY
        Some(code) if code == "787" => "Foreign key constraint failed".to_string(),
        _ => e.to_string(),
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        error!(error = %e, "Storage error");
        Self::Internal(storage_message(&e))
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            // Deliberately uniform: the cause is never exposed to callers
            SessionError::Unauthorized => Self::Unauthorized("Unauthorized".to_string()),
            SessionError::Storage(e) => e.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let mut response = (
            status,
            Json(ErrorBody {
                code: status.as_u16(),
                message: message.clone(),
            }),
        )
            .into_response();
        response.extensions_mut().insert(ErrorOutcome {
            code: status.as_u16(),
            message,
        });
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_fixed_string() {
        let msg = storage_message(&sqlx::Error::RowNotFound);
        assert_eq!(msg, "Record not found");
    }

    #[test]
    fn test_session_unauthorized_is_uniform() {
        let err: ApiError = SessionError::Unauthorized.into();
        assert!(matches!(err, ApiError::Unauthorized(ref m) if m == "Unauthorized"));
    }

    #[test]
    fn test_storage_error_is_server_class() {
        let err: ApiError = ApiError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, ApiError::Internal(ref m) if m == "Record not found"));
    }

    #[tokio::test]
    async fn test_response_shape_and_extension() {
        let response = ApiError::bad_request("nope").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let outcome = response.extensions().get::<ErrorOutcome>().unwrap();
        assert_eq!(outcome.code, 400);
        assert_eq!(outcome.message, "nope");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({"code": 400, "message": "nope"}));
    }
}
