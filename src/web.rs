//! Read-only HTTP view of the coalescer state.
//!
//! Handlers read the store directly and never mutate it. Every route sits
//! behind `require_https`, which rejects requests that did not come through
//! a TLS-terminating proxy.

use crate::error::StoreError;
use crate::store::{Store, StoreKeys};
use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub keys: StoreKeys,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, prefix: impl Into<String>) -> Self {
        AppState {
            store,
            keys: StoreKeys::new(prefix),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    /// Request arrived without a forwarded-protocol header
    HttpsRequired,
    /// The store failed while serving a read
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::HttpsRequired => (
                StatusCode::BAD_REQUEST,
                "HTTPS required; X-Forwarded-Proto header missing".to_string(),
            ),
            ApiError::Store(e) => {
                tracing::error!(error = %e, "Store read failed");
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/v1/list", get(list_keys_handler))
        .route("/v1/list/:key", get(list_queue_handler))
        .route("/v1/stats", get(stats_handler))
        .layer(middleware::from_fn(require_https))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(state)
}

/// Reject requests lacking a non-empty `X-Forwarded-Proto` header.
///
/// Only presence is checked, not the value.
pub async fn require_https(request: Request, next: Next) -> Response {
    let forwarded = request
        .headers()
        .get(FORWARDED_PROTO_HEADER)
        .map(|v| !v.as_bytes().is_empty())
        .unwrap_or(false);

    if !forwarded {
        tracing::debug!(path = %request.uri().path(), "Rejected request without forwarded proto");
        return ApiError::HttpsRequired.into_response();
    }
    next.run(request).await
}

async fn index_handler() -> Json<Value> {
    Json(json!({ "versions": ["v1"] }))
}

/// All tracked coalescing keys, keyed by the store prefix.
async fn list_keys_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut keys = state.store.smembers(&state.keys.key_set()).await?;
    keys.sort();

    let mut body = Map::new();
    body.insert(state.keys.prefix().to_string(), json!(keys));
    Ok(Json(Value::Object(body)))
}

/// Queue for one key, newest first.
async fn list_queue_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tasks = state.store.lrange(&state.keys.queue(&key), 0, -1).await?;

    let mut body = Map::new();
    body.insert(key, json!(tasks));
    Ok(Json(Value::Object(body)))
}

async fn stats_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let counters = state.store.hgetall(&state.keys.stats()).await?;
    Ok(Json(render_counters(counters)))
}

/// Integer counters become JSON numbers; anything else stays a string.
pub fn render_counters(counters: Vec<(String, String)>) -> Value {
    let body: Map<String, Value> = counters
        .into_iter()
        .map(|(field, raw)| {
            let value = match raw.parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(raw),
            };
            (field, value)
        })
        .collect();
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        create_router(AppState::new(Arc::new(InMemoryStore::new()), "t."))
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({"message": "HTTPS required; X-Forwarded-Proto header missing"})
        );
    }

    #[tokio::test]
    async fn test_empty_header_rejected() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/v1/stats")
                    .header("X-Forwarded-Proto", "")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_any_header_value_accepted() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("X-Forwarded-Proto", "http")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_render_counters() {
        let rendered = render_counters(vec![
            ("insert".to_string(), "12".to_string()),
            ("note".to_string(), "hello".to_string()),
        ]);
        assert_eq!(rendered, json!({"insert": 12, "note": "hello"}));
    }

    #[test]
    fn test_store_error_maps_to_503() {
        let response = ApiError::Store(StoreError::ConnectionClosed).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
