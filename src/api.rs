//! HTTP boundary of the todo store.
//!
//! Every route maps one request onto one store operation and answers with
//! JSON. Failures are returned as `{"message": ...}` with the status code of
//! the error kind: 400 for invalid input, 404 for unknown identifiers and 500
//! for anything the store could not do.

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::error::StoreError;
use crate::model::{self, DeletedCount, ListQuery, NewTodo, Todo, TodoPatch};
use crate::store::Store;

/// Shared state of the request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        AppState { store }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Status code and message of a failed request.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub error: ErrorBody,
}

impl ApiErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiErrorResponse {
            status,
            error: ErrorBody {
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<StoreError> for ApiErrorResponse {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Validation(message) => Self::bad_request(message),
            StoreError::NotFound => Self::not_found("Todo not found"),
            // Details stay in the server log.
            StoreError::Database(_) | StoreError::Unavailable(_) => {
                tracing::error!(%error, "store operation failed");
                Self::internal_error()
            }
        }
    }
}

impl From<JsonRejection> for ApiErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /`
pub async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// `GET /health`
pub async fn health() -> &'static str {
    "OK"
}

/// `GET /todos`
pub async fn list_todos(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Todo>>, ApiErrorResponse> {
    let filter = query.to_filter();
    let todos = state.store.call(move |db| model::list(db, &filter)).await?;
    tracing::debug!(count = todos.len(), "listed todos");
    Ok(Json(todos))
}

/// `POST /todos`
pub async fn create_todo(
    State(state): State<AppState>,
    body: Result<Json<NewTodo>, JsonRejection>,
) -> Result<(StatusCode, Json<Todo>), ApiErrorResponse> {
    let Json(new) = body?;
    let todo = state.store.call(move |db| model::create(db, &new)).await?;
    tracing::info!(id = %todo.id, "created todo");
    Ok((StatusCode::CREATED, Json(todo)))
}

/// `PUT /todos/{id}`
///
/// An unknown identifier answers 404 even when the body is malformed.
pub async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TodoPatch>, JsonRejection>,
) -> Result<Json<Todo>, ApiErrorResponse> {
    let Json(patch) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let lookup = id.clone();
            state
                .store
                .call(move |db| model::find(db, &lookup)?.ok_or(StoreError::NotFound))
                .await?;
            return Err(rejection.into());
        }
    };
    let todo = state
        .store
        .call(move |db| model::update(db, &id, &patch))
        .await?;
    tracing::info!(id = %todo.id, "updated todo");
    Ok(Json(todo))
}

/// `DELETE /todos/{id}`
pub async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiErrorResponse> {
    let deleted = id.clone();
    state.store.call(move |db| model::delete(db, &id)).await?;
    tracing::info!(id = %deleted, "deleted todo");
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /todos`
pub async fn delete_completed(
    State(state): State<AppState>,
) -> Result<Json<DeletedCount>, ApiErrorResponse> {
    let deleted_count = state.store.call(|db| model::delete_completed(db)).await?;
    tracing::info!(deleted_count, "deleted completed todos");
    Ok(Json(DeletedCount { deleted_count }))
}

// =============================================================================
// Server
// =============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health))
        .route(
            "/todos",
            get(list_todos).post(create_todo).delete(delete_completed),
        )
        .route("/todos/{id}", put(update_todo).delete(delete_todo))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `addr` until Ctrl-C or SIGTERM.
pub async fn serve(addr: SocketAddr, store: Store) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(AppState::new(store)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => tracing::error!(%error, "Failed to install signal handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
