//! HTTP transport.
//!
//! Thin axum layer over [`RagService`](docrag_core::RagService). Streaming
//! endpoints return a plain-text chunked body with one write per fragment;
//! when the client disconnects the body is dropped, which drops the model
//! stream and closes the upstream connection.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/stats` | Collection statistics |
//! | `POST` | `/reconcile` | Index new documents from the configured directory |
//! | `POST` | `/query` | Answer from indexed context, `{query, k?, model?}` |
//! | `GET`  | `/query/stream` | Streaming answer, `?query=&k=&model=` |
//! | `POST` | `/rag` | Answer over caller-supplied context, `{query, context, model?}` |
//! | `GET`  | `/rag-stream` | Streaming variant, `?query=&context=&model=` |
//! | `POST` | `/generate` | Raw completion, `{prompt, max_tokens?, temperature?, model?}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `generation_failed` (502),
//! `store_error` (500), `internal` (500). A failure after a stream has
//! started cannot change the status line; the body is cut short instead.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use docrag_core::generate::{CompletionOptions, GenerationStream};
use docrag_core::reconcile::ReconcileReport;
use docrag_core::{GenerationError, RagError};

use crate::app::{build_service, App};
use crate::config::Config;
use crate::stats::{collect_stats, IndexStats};

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = build_service(config).await?;
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("docrag server listening on http://{}", listener.local_addr()?);
    info!(bind = %bind_addr, "server started");

    axum::serve(listener, router(app)).await?;
    Ok(())
}

/// All routes over `app`, with permissive CORS.
pub fn router(app: App) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/reconcile", post(handle_reconcile))
        .route("/query", post(handle_query))
        .route("/query/stream", get(handle_query_stream))
        .route("/rag", post(handle_rag))
        .route("/rag-stream", get(handle_rag_stream))
        .route("/generate", post(handle_generate))
        .layer(cors)
        .with_state(app)
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

#[derive(Debug)]
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        error!(error = %err, "generation failed");
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "generation_failed",
            message: err.to_string(),
        }
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Generation(e) => e.into(),
            RagError::Store(e) => {
                error!(error = %e, "store error");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "store_error",
                    message: e.to_string(),
                }
            }
            other => {
                error!(error = %other, "request failed");
                internal(other.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<RagError>() {
            Ok(rag) => rag.into(),
            Err(err) => internal(format!("{:#}", err)),
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_k(k: Option<usize>) -> Result<(), AppError> {
    if k == Some(0) {
        return Err(bad_request("k must be >= 1"));
    }
    Ok(())
}

fn stream_response(stream: GenerationStream) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream.into_fragments()),
    )
        .into_response()
}

#[derive(Serialize, Deserialize)]
pub struct AnswerResponse {
    pub response: String,
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

// ============ GET /stats ============

async fn handle_stats(State(app): State<App>) -> Result<Json<IndexStats>, AppError> {
    Ok(Json(collect_stats(&app).await?))
}

// ============ POST /reconcile ============

async fn handle_reconcile(State(app): State<App>) -> Result<Json<ReconcileReport>, AppError> {
    let source = app.document_source()?;
    let report = app.service.reconcile_index(&source).await?;
    Ok(Json(report))
}

// ============ POST /query, GET /query/stream ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
    #[serde(default)]
    model: Option<String>,
}

async fn handle_query(
    State(app): State<App>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    require_text("query", &req.query)?;
    require_k(req.k)?;
    let response = app
        .service
        .answer_query(&req.query, req.k, req.model.as_deref())
        .await?;
    Ok(Json(AnswerResponse { response }))
}

async fn handle_query_stream(
    State(app): State<App>,
    Query(req): Query<QueryRequest>,
) -> Result<Response, AppError> {
    require_text("query", &req.query)?;
    require_k(req.k)?;
    let stream = app
        .service
        .answer_query_stream(&req.query, req.k, req.model.as_deref())
        .await?;
    Ok(stream_response(stream))
}

// ============ POST /rag, GET /rag-stream ============

#[derive(Deserialize)]
struct RagRequest {
    query: String,
    #[serde(default)]
    context: String,
    #[serde(default)]
    model: Option<String>,
}

async fn handle_rag(
    State(app): State<App>,
    Json(req): Json<RagRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    require_text("query", &req.query)?;
    let response = app
        .service
        .answer_with_context(&req.query, &req.context, req.model.as_deref())
        .await?;
    Ok(Json(AnswerResponse { response }))
}

async fn handle_rag_stream(
    State(app): State<App>,
    Query(req): Query<RagRequest>,
) -> Result<Response, AppError> {
    require_text("query", &req.query)?;
    let stream = app
        .service
        .answer_with_context_stream(&req.query, &req.context, req.model.as_deref())
        .await?;
    Ok(stream_response(stream))
}

// ============ POST /generate ============

#[derive(Deserialize)]
struct GenerateRequest {
    prompt: String,
    #[serde(default = "default_generate_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_generate_temperature")]
    temperature: f32,
    #[serde(default)]
    model: Option<String>,
}

fn default_generate_max_tokens() -> u32 {
    100
}

fn default_generate_temperature() -> f32 {
    0.7
}

async fn handle_generate(
    State(app): State<App>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    require_text("prompt", &req.prompt)?;
    if req.max_tokens == 0 {
        return Err(bad_request("max_tokens must be >= 1"));
    }
    let options = CompletionOptions {
        temperature: Some(req.temperature),
        max_tokens: Some(req.max_tokens),
    };
    let response = app
        .service
        .complete_raw(&req.prompt, req.model.as_deref(), options)
        .await?;
    Ok(Json(AnswerResponse { response }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_maps_to_bad_gateway() {
        let err: AppError = RagError::Generation(GenerationError::Model("boom".into())).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.code, "generation_failed");
    }

    #[test]
    fn test_store_error_maps_to_store_error() {
        let err: AppError =
            RagError::Store(docrag_core::StoreError::Backend("disk full".into())).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "store_error");
    }

    #[test]
    fn test_anyhow_wrapping_rag_error_keeps_code() {
        let rag = RagError::Generation(GenerationError::Request("down".into()));
        let err: AppError = anyhow::Error::from(rag).into();
        assert_eq!(err.code, "generation_failed");
        let err: AppError = anyhow::anyhow!("bad glob").into();
        assert_eq!(err.code, "internal");
    }

    #[test]
    fn test_validation() {
        assert!(require_text("query", "  ").is_err());
        assert!(require_text("query", "hi").is_ok());
        assert!(require_k(Some(0)).is_err());
        assert!(require_k(None).is_ok());
    }
}
