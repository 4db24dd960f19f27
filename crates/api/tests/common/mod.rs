#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use brandgen_core::request::Requester;
use brandgen_core::roles::{ROLE_ADMIN, ROLE_USER};
use brandgen_db::store::InMemoryRequestStore;
use brandgen_events::{Alerts, PageChannel};
use brandgen_pipeline::artifacts::InMemoryArtifactStore;
use brandgen_pipeline::config::PollConfig;
use brandgen_provider::ScriptedProvider;
use http_body_util::BodyExt;
use tower::ServiceExt;

use brandgen_api::auth::jwt::{generate_access_token, JwtConfig};
use brandgen_api::config::ServerConfig;
use brandgen_api::router::build_app_router;
use brandgen_api::state::{AppComponents, AppState};

/// Everything a test needs to drive the app and look behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub notifier: Arc<PageChannel>,
    pub provider: Arc<ScriptedProvider>,
    pub artifacts: Arc<InMemoryArtifactStore>,
}

/// Build a test `ServerConfig` with safe defaults and no artifact route.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        artifact_dir: None,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

/// Build the full application on the in-memory store and scripted provider.
///
/// Pollers wait a minute between checks, so nothing changes behind a test's
/// back unless it advances time.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let notifier = Arc::new(PageChannel::new("api-test"));
    let provider = Arc::new(ScriptedProvider::new());
    let artifacts = Arc::new(InMemoryArtifactStore::default());

    let state = AppState::assemble(AppComponents {
        config: config.clone(),
        pool: None,
        store: Arc::new(InMemoryRequestStore::new()),
        notifier: notifier.clone(),
        provider: provider.clone(),
        artifacts: artifacts.clone(),
        alerts: Alerts::none(),
        poll: PollConfig {
            retries: 3,
            delay: Duration::from_secs(60),
        },
    });

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        notifier,
        provider,
        artifacts,
    }
}

pub fn user(name: &str) -> Requester {
    Requester {
        user_id: uuid::Uuid::new_v4(),
        name: name.to_string(),
        email: Some(format!("{}@example.com", name.to_lowercase())),
    }
}

pub fn user_token(user: &Requester) -> String {
    generate_access_token(user, ROLE_USER, &test_config().jwt).unwrap()
}

pub fn admin_token() -> String {
    generate_access_token(&user("Admin"), ROLE_ADMIN, &test_config().jwt).unwrap()
}

/// Send a request with an optional bearer token and JSON body.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str, token: Option<&str>) -> Response<Body> {
    send(app, Method::GET, uri, token, None).await
}

pub async fn post_json(
    app: &Router,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, Method::POST, uri, token, Some(body)).await
}

/// Send a single-file multipart upload in field `file`.
pub async fn upload(
    app: &Router,
    uri: &str,
    token: &str,
    content_type: &str,
    bytes: &[u8],
) -> Response<Body> {
    const BOUNDARY: &str = "brandgen-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
