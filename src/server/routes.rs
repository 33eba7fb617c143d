//! HTTP surface of the reference remote service.
//!
//! # Endpoints
//!
//! - `GET /health`: liveness probe (no auth required)
//! - `GET /{collection}`: list records; `page`/`limit` switch to the
//!   paginated envelope, other query keys filter
//! - `POST /{collection}`: create a record
//! - `GET|PUT|DELETE /{collection}/{id}`: read, merge-update or delete one record
//! - `GET /locks/{id}`: lock state
//! - `POST /locks/{id}` with `{"device_id": ...}`: acquire (409 when held elsewhere)
//! - `DELETE /locks/{id}?device_id=...`: release (409 when held elsewhere)
//!
//! Collections are `repairs`, `warehouse-items` and `transactions`.

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::storage::{RemoteStore, StorageError};
use crate::remote::{Collection, HealthInfo, ListQuery};

#[derive(Clone)]
struct AppState {
    store: Arc<RemoteStore>,
    api_keys: Arc<HashSet<String>>,
}

/// Error body
#[derive(Serialize)]
struct ApiError {
    error: &'static str,
    message: String,
}

fn error_response(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiError {
            error,
            message: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        match self {
            StorageError::InvalidBody(e) => error_response(StatusCode::BAD_REQUEST, "invalid_body", e),
            StorageError::NotFound(..) => {
                error_response(StatusCode::NOT_FOUND, "not_found", self.to_string())
            }
            // Conflicts carry the current holder so clients can show it.
            StorageError::Locked(state) => (StatusCode::CONFLICT, Json(state)).into_response(),
        }
    }
}

fn unknown_collection(name: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "unknown_collection",
        format!("No collection named '{}'", name),
    )
}

/// Builds the service router. An empty key set disables authentication.
pub fn router(store: Arc<RemoteStore>, api_keys: HashSet<String>) -> Router {
    let state = AppState {
        store,
        api_keys: Arc::new(api_keys),
    };

    let protected = Router::new()
        .route("/locks/{id}", get(lock_state).post(acquire_lock).delete(release_lock))
        .route("/{collection}", get(list_records).post(create_record))
        .route(
            "/{collection}/{id}",
            get(get_record).put(update_record).delete(delete_record),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.api_keys.is_empty() {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(key) if state.api_keys.contains(key) => next.run(request).await,
        Some(_) => error_response(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key"),
        None => error_response(
            StatusCode::UNAUTHORIZED,
            "missing_auth",
            "Bearer authorization required",
        ),
    }
}

async fn health() -> Json<HealthInfo> {
    Json(HealthInfo {
        status: "ok".to_string(),
        version: Some(crate::version().to_string()),
    })
}

async fn list_records(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let Some(collection) = Collection::parse(&name) else {
        return unknown_collection(&name);
    };
    let paginated = query.page.is_some() || query.limit.is_some();
    let page = state.store.list(collection, &query);

    if paginated {
        Json(serde_json::json!({
            "items": page.items,
            "page": page.page,
            "total_pages": page.total_pages,
        }))
        .into_response()
    } else {
        Json(page.items).into_response()
    }
}

async fn create_record(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some(collection) = Collection::parse(&name) else {
        return unknown_collection(&name);
    };
    match state.store.create(collection, body) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_record(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, i64)>,
) -> Response {
    let Some(collection) = Collection::parse(&name) else {
        return unknown_collection(&name);
    };
    match state.store.get(collection, id) {
        Some(record) => Json(record).into_response(),
        None => StorageError::NotFound(collection, id).into_response(),
    }
}

async fn update_record(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, i64)>,
    Json(body): Json<Value>,
) -> Response {
    let Some(collection) = Collection::parse(&name) else {
        return unknown_collection(&name);
    };
    match state.store.update(collection, id, body) {
        Ok(record) => Json(record).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_record(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, i64)>,
) -> Response {
    let Some(collection) = Collection::parse(&name) else {
        return unknown_collection(&name);
    };
    match state.store.delete(collection, id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct LockRequest {
    device_id: String,
}

async fn lock_state(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    Json(state.store.lock_state(id)).into_response()
}

async fn acquire_lock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<LockRequest>,
) -> Response {
    if request.device_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalid_body", "device_id is required");
    }
    match state.store.acquire_lock(id, &request.device_id) {
        Ok(lock) => {
            tracing::debug!("Lock {} acquired by {}", id, request.device_id);
            Json(lock).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn release_lock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(request): Query<LockRequest>,
) -> Response {
    match state.store.release_lock(id, &request.device_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
