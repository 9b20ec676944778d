//! Exception translation over HTTP: stable error bodies, storage error
//! mapping and failure auditing.

mod common;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common::{TestSetup, body_json};
use gatelog::api::ApiError;
use serde_json::Value;

async fn missing_record() -> Result<Json<Value>, ApiError> {
    Err(sqlx::Error::RowNotFound.into())
}

async fn bad_cursor() -> Result<Json<Value>, ApiError> {
    Err(ApiError::bad_request("Invalid cursor"))
}

fn failing_routes() -> Router {
    Router::new()
        .route("/missing", get(missing_record))
        .route("/bad-cursor", get(bad_cursor))
}

#[tokio::test]
async fn test_storage_error_maps_to_fixed_message() {
    let ctx = TestSetup::new().with_routes(failing_routes()).build().await;

    let response = ctx.get("/api/missing").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["code"], 500);
    assert_eq!(body["message"], "Record not found");
}

#[tokio::test]
async fn test_error_body_shape_matches_status() {
    let ctx = TestSetup::new().with_routes(failing_routes()).build().await;

    let response = ctx.get("/api/bad-cursor").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "Invalid cursor");
}

#[tokio::test]
async fn test_handler_errors_are_audited_as_failures() {
    let ctx = TestSetup::new().with_routes(failing_routes()).build().await;

    let response = ctx.get("/api/bad-cursor").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    ctx.wait_for_audit_count(1).await;
    let records = ctx.db.audit_logs().list_recent(10).await.unwrap();
    let record = &records[0];
    assert_eq!(record.status_code, 400);
    assert!(!record.is_success);
    assert_eq!(record.path, "/api/bad-cursor");
}

#[tokio::test]
async fn test_unknown_route_is_still_audited() {
    let ctx = TestSetup::new().build().await;

    let response = ctx.get("/api/no-such-route").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    ctx.wait_for_audit_count(1).await;
    let records = ctx.db.audit_logs().list_recent(10).await.unwrap();
    assert_eq!(records[0].status_code, 404);
    assert!(!records[0].is_success);
}
