//! HTTP API tests, driving the router in-process.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use coalesce::store::{SimulatedStore, SimulatedStoreConfig};
use coalesce::web::{create_router, AppState};
use coalesce::{CoalescingMachine, HashStatsSink, InMemoryStore, Store, StoreKeys};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const PREFIX: &str = "coalesce.v1.";

// =============================================================================
// Test Helpers
// =============================================================================

fn app_with(store: InMemoryStore) -> Router {
    create_router(AppState::new(Arc::new(store), PREFIX))
}

fn machine_for(store: &InMemoryStore) -> CoalescingMachine {
    let store: Arc<dyn Store> = Arc::new(store.clone());
    let stats = Arc::new(HashStatsSink::new(store.clone(), &StoreKeys::new(PREFIX)));
    CoalescingMachine::new(PREFIX, store, stats)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("X-Forwarded-Proto", "https")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

// =============================================================================
// Endpoints
// =============================================================================

#[tokio::test]
async fn test_index_lists_versions() {
    let (status, body) = get(app_with(InMemoryStore::new()), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"versions": ["v1"]}));
}

#[tokio::test]
async fn test_list_keys_empty() {
    let (status, body) = get(app_with(InMemoryStore::new()), "/v1/list").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"coalesce.v1.": []}));
}

#[tokio::test]
async fn test_list_keys_sorted() {
    let store = InMemoryStore::new();
    let machine = machine_for(&store);
    for key in ["zeta", "alpha", "mid"] {
        machine.insert_task("t", key).await.unwrap();
    }

    let (_, body) = get(app_with(store), "/v1/list").await;
    assert_eq!(body, json!({"coalesce.v1.": ["alpha", "mid", "zeta"]}));
}

#[tokio::test]
async fn test_list_queue_newest_first() {
    let store = InMemoryStore::new();
    let machine = machine_for(&store);
    machine.insert_task("t1", "build").await.unwrap();
    machine.insert_task("t2", "build").await.unwrap();

    let (status, body) = get(app_with(store), "/v1/list/build").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"build": ["t2", "t1"]}));
}

#[tokio::test]
async fn test_list_queue_unknown_key() {
    let (status, body) = get(app_with(InMemoryStore::new()), "/v1/list/nothing").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"nothing": []}));
}

#[tokio::test]
async fn test_stats_reflect_operations() {
    let store = InMemoryStore::new();
    let machine = machine_for(&store);
    machine.insert_task("t1", "k").await.unwrap();
    machine.insert_task("t2", "k").await.unwrap();
    machine.remove_task("t1", "k").await.unwrap();

    let (status, body) = get(app_with(store), "/v1/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"insert": 2, "remove": 1}));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_every_route_requires_forwarded_proto() {
    for uri in ["/", "/v1/list", "/v1/list/k", "/v1/stats"] {
        let response = app_with(InMemoryStore::new())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "route {}", uri);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body["message"],
            "HTTPS required; X-Forwarded-Proto header missing"
        );
    }
}

#[tokio::test]
async fn test_store_failure_returns_503() {
    let config = SimulatedStoreConfig {
        read_fail_prob: 1.0,
        ..SimulatedStoreConfig::no_faults()
    };
    let store = SimulatedStore::new(InMemoryStore::new(), 0, config);
    let app = create_router(AppState::new(Arc::new(store), PREFIX));

    let (status, body) = get(app, "/v1/list").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["message"].as_str().unwrap().contains("injected"));
}
