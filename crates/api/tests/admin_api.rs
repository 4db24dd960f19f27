//! Integration tests for `/api/v1/admin/requests`.

mod common;

use axum::http::{Method, StatusCode};
use brandgen_core::request::{NewGenerationRequest, RequestStatus};
use common::{admin_token, body_json, get, send, upload, user, user_token};
use serde_json::json;

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let app = common::build_test_app();
    let token = user_token(&user("Ana"));

    let response = get(&app.router, "/api/v1/admin/requests", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");

    let response = get(&app.router, "/api/v1/admin/requests", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn queue_filters_by_status() {
    let app = common::build_test_app();
    let ana = user("Ana");
    let pending = app
        .state
        .lifecycle
        .create_request(&ana, NewGenerationRequest::image("pending"))
        .await
        .unwrap();
    let failed = app
        .state
        .lifecycle
        .create_request(&ana, NewGenerationRequest::image("broken"))
        .await
        .unwrap();
    app.state.lifecycle.mark_failed(failed.id, "nope").await.unwrap();

    let admin = admin_token();
    let json = body_json(get(&app.router, "/api/v1/admin/requests?status=new", Some(&admin)).await).await;
    let list = json["data"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], pending.id.to_string());

    let json = body_json(get(&app.router, "/api/v1/admin/requests", Some(&admin)).await).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn set_status_follows_transition_rules() {
    let app = common::build_test_app();
    let req = app
        .state
        .lifecycle
        .create_request(&user("Ana"), NewGenerationRequest::image("logo"))
        .await
        .unwrap();
    let admin = admin_token();
    let uri = format!("/api/v1/admin/requests/{}/status", req.id);

    let response = send(
        &app.router,
        Method::PATCH,
        &uri,
        Some(&admin),
        Some(json!({ "status": "completed", "result_url": "https://cdn/x.png" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "INVALID_TRANSITION");

    let unchanged = app.state.lifecycle.get_request(req.id).await.unwrap();
    assert_eq!(unchanged.status, RequestStatus::New);

    let response = send(
        &app.router,
        Method::PATCH,
        &uri,
        Some(&admin),
        Some(json!({ "status": "in-progress" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "in-progress");
}

#[tokio::test]
async fn upload_completes_request_with_artifact_url() {
    let app = common::build_test_app();
    let req = app
        .state
        .lifecycle
        .create_request(&user("Ana"), NewGenerationRequest::image("logo"))
        .await
        .unwrap();

    let response = upload(
        &app.router,
        &format!("/api/v1/admin/requests/{}/result", req.id),
        &admin_token(),
        "image/png",
        b"\x89PNG fake image bytes",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let url = json["data"]["artifact_url"].as_str().unwrap();
    assert!(url.starts_with("memory://artifacts/"));
    assert!(url.ends_with(".png"));
    assert_eq!(json["data"]["request"]["status"], "completed");
    assert_eq!(json["data"]["request"]["result_url"], url);
    assert_eq!(app.artifacts.len(), 1);
}

#[tokio::test]
async fn upload_rejects_unsupported_type() {
    let app = common::build_test_app();
    let req = app
        .state
        .lifecycle
        .create_request(&user("Ana"), NewGenerationRequest::image("logo"))
        .await
        .unwrap();

    let response = upload(
        &app.router,
        &format!("/api/v1/admin/requests/{}/result", req.id),
        &admin_token(),
        "application/pdf",
        b"%PDF-1.7",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    assert!(app.artifacts.is_empty());

    let unchanged = app.state.lifecycle.get_request(req.id).await.unwrap();
    assert_eq!(unchanged.status, RequestStatus::New);
}

#[tokio::test]
async fn clear_all_needs_confirmation() {
    let app = common::build_test_app();
    app.state
        .lifecycle
        .create_request(&user("Ana"), NewGenerationRequest::image("a"))
        .await
        .unwrap();
    let admin = admin_token();

    let response = send(&app.router, Method::DELETE, "/api/v1/admin/requests", Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.state.lifecycle.list_all_requests().await.unwrap().len(), 1);

    let response = send(
        &app.router,
        Method::DELETE,
        "/api/v1/admin/requests?confirm=true",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["deleted"], 1);
    assert!(app.state.lifecycle.list_all_requests().await.unwrap().is_empty());
}
