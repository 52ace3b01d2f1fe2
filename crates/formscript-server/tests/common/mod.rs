//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use formscript_sandbox::{SandboxConfig, ScriptExecutor};
use formscript_server::{build_app_router, AppState, FormRepository, InMemoryRepository};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Form seeded with a script that totals `price * quantity`.
pub const ORDER_FORM: u32 = 1;
/// Form seeded without any script.
pub const BARE_FORM: u32 = 2;
/// Form whose script always throws.
pub const BROKEN_FORM: u32 = 3;

/// Sandbox config with a short timeout so timeout tests stay quick.
pub fn test_sandbox_config() -> SandboxConfig {
    SandboxConfig {
        timeout: Duration::from_millis(300),
        ..SandboxConfig::default()
    }
}

/// Repository pre-populated with the test forms.
pub async fn seeded_repository() -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::new());
    repo.insert_form(ORDER_FORM, "Order").await;
    repo.insert_script(ORDER_FORM, "return { total: price * quantity };")
        .await;
    repo.insert_form(BARE_FORM, "Feedback").await;
    repo.insert_form(BROKEN_FORM, "Broken").await;
    repo.insert_script(BROKEN_FORM, "throw new Error('boom');")
        .await;
    repo
}

/// Build the app with the same middleware stack as production.
pub fn build_test_app(repository: Arc<dyn FormRepository>) -> Router {
    let executor = ScriptExecutor::new(test_sandbox_config());
    build_app_router(AppState::new(executor, repository))
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
