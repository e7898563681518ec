//! Read-only HTTP query API.
//!
//! A thin layer over [`search`](crate::search) and [`get`](crate::get). It
//! never writes to the store and never touches the processing ledger.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search?q=<text>` | Ranked `[{filename, score}]`, at most 20 |
//! | `GET`  | `/document/{filename}` | `{filename, content}` |
//! | `GET`  | `/documents` | `[{filename}]`, at most 100 |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::get::{get_document, list_documents, LIST_LIMIT};
use crate::models::{DocumentSummary, IndexedDocument, SearchHit};
use crate::search::{search_documents, QueryError, SEARCH_LIMIT};
use crate::store::DocumentStore;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn DocumentStore>,
}

/// Binds `[server].bind` and serves until Ctrl-C.
pub async fn run_server(config: &Config, store: Arc<dyn DocumentStore>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.server.bind).await?;
    info!("Query API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

/// Serves on an already-bound listener until the process ends.
pub async fn serve(listener: TcpListener, store: Arc<dyn DocumentStore>) -> anyhow::Result<()> {
    axum::serve(listener, router(store)).await?;
    Ok(())
}

pub fn router(store: Arc<dyn DocumentStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", get(handle_search))
        .route("/document/{filename}", get(handle_get))
        .route("/documents", get(handle_list))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { store })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let (status, code) = match &err {
            QueryError::EmptyQuery => (StatusCode::BAD_REQUEST, "bad_request"),
            QueryError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            QueryError::Store(e) => {
                error!("Query failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let q = params.q.unwrap_or_default();
    let hits = search_documents(state.store.as_ref(), &q, SEARCH_LIMIT).await?;
    Ok(Json(hits))
}

// ============ GET /document/{filename} ============

async fn handle_get(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<IndexedDocument>, AppError> {
    let doc = get_document(state.store.as_ref(), &filename).await?;
    Ok(Json(doc))
}

// ============ GET /documents ============

async fn handle_list(
    State(state): State<AppState>,
) -> Result<Json<Vec<DocumentSummary>>, AppError> {
    let docs = list_documents(state.store.as_ref(), LIST_LIMIT).await?;
    Ok(Json(docs))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
