use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app::Pipeline;
use crate::error::PipelineError;
use crate::ingest::runner::AcquireRequest;
use crate::metrics::Metrics;
use crate::queue::manager::QueueRequest;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
}

pub fn router(state: AppState, metrics: &Metrics) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/acquire", post(acquire))
        .route("/process-queue", post(process_queue))
        .route("/sources", get(sources))
        .route("/queue/stats", get(queue_stats))
        .merge(metrics.router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// `{success: false, error}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        tracing::error!(error = %e, "trigger run failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

/// An empty body means "defaults"; anything else must be valid JSON.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid body: {e}")))
}

async fn acquire(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req: AcquireRequest = optional_body(&body)?;
    let mut reports = state.pipeline.runner.run(&req).await?;

    // A named source answers with its own result; a batch wraps them.
    if req.source_id.is_some() && reports.len() == 1 {
        let report = reports.remove(0);
        return Ok(Json(report).into_response());
    }
    Ok(Json(json!({
        "success": true,
        "processed": reports.len(),
        "results": reports,
    }))
    .into_response())
}

async fn process_queue(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req: QueueRequest = optional_body(&body)?;
    let result = state.pipeline.queue.process_batch(&req).await?;
    Ok(Json(result).into_response())
}

async fn sources(State(state): State<AppState>) -> Result<Response, ApiError> {
    let report = state.pipeline.store.call(|store| store.source_report()).await?;
    Ok(Json(report).into_response())
}

async fn queue_stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let now = Utc::now();
    let stats = state.pipeline.store.call(move |store| store.queue_stats(now)).await?;
    Ok(Json(stats).into_response())
}
