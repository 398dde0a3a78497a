#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use powerwatch_core::aggregation::Aggregator;
use powerwatch_events::{Broker, BrokerConfig};
use tower::ServiceExt;

use powerwatch_api::config::ServerConfig;
use powerwatch_api::router::build_app_router;
use powerwatch_api::state::AppState;

pub const TEST_HOST_ADDRESS: &str = "10.0.75.74";

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin and a small window so tests
/// can complete one quickly.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        host_address: Some(TEST_HOST_ADDRESS.to_string()),
        window_size: 4,
        ..ServerConfig::default()
    }
}

/// Everything a test needs to drive the app and poke at its state.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

/// Build the full application router with all middleware layers and a
/// fresh aggregator and broker.
///
/// Uses the same [`build_app_router`] as `main.rs`, so integration tests
/// exercise the production middleware stack.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

/// Same as [`build_test_app`] but with a caller-supplied config.
pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let aggregator = Arc::new(Aggregator::new(config.window_size).expect("valid window"));
    let (broker, _control) = Broker::start(BrokerConfig {
        queue_capacity: config.subscriber_queue_capacity,
        max_missed: config.subscriber_max_missed,
    });

    let state = AppState {
        config: Arc::new(config.clone()),
        aggregator,
        broker,
        host_address: TEST_HOST_ADDRESS.into(),
    };
    let router = build_app_router(state.clone(), &config);

    TestApp { router, state }
}

/// Issue a GET request against the router.
pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("valid request");
    app.oneshot(request).await.expect("infallible router")
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("readable body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("JSON body")
}
