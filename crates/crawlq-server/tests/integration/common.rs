use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use crawlq_core::{CrawlerConfig, InMemoryQueueStore};
use crawlq_server::routes;
use crawlq_server::state::{AnyQueueStore, AppState};
use http_body_util::BodyExt;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub store: InMemoryQueueStore,
}

/// Router over a fresh in-memory store, with no workers attached.
pub fn setup_test_app() -> TestApp {
    let store = InMemoryQueueStore::new();
    let state = Arc::new(AppState::new(
        AnyQueueStore::Memory(store.clone()),
        &CrawlerConfig::default(),
    ));
    TestApp {
        router: routes::router(state),
        store,
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(router, Request::post(uri).body(Body::empty()).unwrap()).await
}
