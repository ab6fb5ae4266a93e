//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use storyloom_core::clock::Clock;
use storyloom_server::routes;
use storyloom_server::state::AppState;
use storyloom_test_support::FixedClock;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 3, 3, 10, 0, 0).unwrap(),
    ))
}

/// Build the full app router with a deterministic clock. Uses the same
/// route structure as `main.rs`.
pub fn build_test_app() -> (Router, AppState) {
    let app_state = AppState::new(fixed_clock());

    let app = Router::new()
        .merge(routes::health::router())
        .nest(
            "/api/v1/documents",
            routes::snapshot::router().merge(routes::sync::router()),
        )
        .with_state(app_state.clone());

    (app, app_state)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
