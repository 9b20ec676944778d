//! Token lifecycle over the HTTP surface: refresh rotation, logout
//! revocation and the verify endpoint.

mod common;

use axum::http::StatusCode;
use common::{TestSetup, body_json, setup};
use serde_json::json;

#[tokio::test]
async fn test_refresh_returns_new_pair() {
    let ctx = setup().await;
    let pair = ctx.issue("user-1", "alice");

    let response = ctx
        .post_json(
            "/api/tokens/refresh",
            &json!({ "refresh_token": pair.refresh_token }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let access = body["access_token"].as_str().unwrap();
    let refresh = body["refresh_token"].as_str().unwrap();
    assert!(!access.is_empty());
    assert!(!refresh.is_empty());
    assert_ne!(refresh, pair.refresh_token);

    // The rotated access token authenticates.
    let response = ctx.get_bearer("/api/tokens/verify", access).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let ctx = setup().await;
    let pair = ctx.issue("user-1", "alice");
    let request = json!({ "refresh_token": pair.refresh_token });

    let response = ctx.post_json("/api/tokens/refresh", &request).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Replaying the consumed token is rejected with the uniform 401.
    let response = ctx.post_json("/api/tokens/refresh", &request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], 401);
    assert_eq!(body["message"], "Unauthorized");
}

#[tokio::test]
async fn test_refresh_rejects_access_token() {
    let ctx = setup().await;
    let pair = ctx.issue("user-1", "alice");

    let response = ctx
        .post_json(
            "/api/tokens/refresh",
            &json!({ "refresh_token": pair.access_token }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_rejects_garbage() {
    let ctx = setup().await;

    let response = ctx
        .post_json(
            "/api/tokens/refresh",
            &json!({ "refresh_token": "not-a-jwt" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_both_tokens() {
    let ctx = setup().await;
    let pair = ctx.issue("user-1", "alice");

    let response = ctx.get_bearer("/api/tokens/verify", &pair.access_token).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = ctx
        .post_json(
            "/api/tokens/logout",
            &json!({
                "access_token": pair.access_token,
                "refresh_token": pair.refresh_token,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);

    let response = ctx.get_bearer("/api/tokens/verify", &pair.access_token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = ctx
        .post_json(
            "/api/tokens/refresh",
            &json!({ "refresh_token": pair.refresh_token }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let ctx = setup().await;
    let pair = ctx.issue("user-1", "alice");
    let request = json!({
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
    });

    for _ in 0..2 {
        let response = ctx.post_json("/api/tokens/logout", &request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], true);
    }
}

#[tokio::test]
async fn test_logout_accepts_garbage_tokens() {
    let ctx = setup().await;

    let response = ctx
        .post_json(
            "/api/tokens/logout",
            &json!({ "access_token": "junk", "refresh_token": "also junk" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);
}

#[tokio::test]
async fn test_logout_with_no_tokens() {
    let ctx = setup().await;

    let response = ctx.post_json("/api/tokens/logout", &json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_verify_without_token() {
    let ctx = setup().await;

    let response = ctx.get("/api/tokens/verify").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], 401);
    assert_eq!(body["message"], "Unauthorized");
}

#[tokio::test]
async fn test_verify_rejects_token_from_other_audience() {
    let client = setup().await;
    let admin = TestSetup::new().with_audience("admin").build().await;

    let pair = admin.issue("admin-1", "root");
    let response = client
        .get_bearer("/api/tokens/verify", &pair.access_token)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_endpoint() {
    let ctx = setup().await;

    let response = ctx.get("/api/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}
