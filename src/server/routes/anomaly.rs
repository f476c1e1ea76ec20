//! Single-source detection, explanations, batch jobs and comparisons.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use super::created;
use crate::anomaly::batch::{self, BatchRequest};
use crate::anomaly::comparison::{self, CompareRequest};
use crate::anomaly::{self, DetectRequest, ExplainRequest, ExplainResponse};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AlgorithmComparisonResult, AlgorithmInfo, AnomalyDetection, AnomalyExplanation,
    BatchDetectionJob, BatchJobStatus, BatchSourceResult, ListResponse,
};
use crate::server::{JsonBody, OptionalJsonBody, Params, SharedState};

const DEFAULT_LIMIT: usize = 20;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/anomaly/algorithms", get(algorithms_handler))
        .route("/api/v1/sources/:id/anomaly/detect", post(detect_handler))
        .route(
            "/api/v1/sources/:id/anomaly/detections",
            get(source_detections_handler),
        )
        .route("/api/v1/sources/:id/anomaly/latest", get(latest_handler))
        .route("/api/v1/anomaly/detections/:id", get(get_detection_handler))
        .route("/api/v1/anomaly/detections/:id/explain", post(explain_handler))
        .route(
            "/api/v1/anomaly/detections/:id/explanations",
            get(explanations_handler),
        )
        .route(
            "/api/v1/anomaly/batch",
            get(list_batch_handler).post(create_batch_handler),
        )
        .route(
            "/api/v1/anomaly/batch/:id",
            get(get_batch_handler).delete(delete_batch_handler),
        )
        .route("/api/v1/anomaly/batch/:id/results", get(batch_results_handler))
        .route("/api/v1/anomaly/batch/:id/cancel", post(cancel_batch_handler))
        .route("/api/v1/anomaly/compare", post(compare_handler))
}

async fn algorithms_handler() -> Json<Vec<AlgorithmInfo>> {
    Json(anomaly::algorithms())
}

// ============================================================================
// Single-source detection
// ============================================================================

async fn detect_handler(
    State(state): State<SharedState>,
    Path(source_id): Path<String>,
    OptionalJsonBody(request): OptionalJsonBody<DetectRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut store = state.store.write().await;
    let detection = anomaly::detect(&mut store, &source_id, &request)?;
    Ok(created(detection))
}

async fn source_detections_handler(
    State(state): State<SharedState>,
    Path(source_id): Path<String>,
    params: Params,
) -> ApiResult<Json<ListResponse<AnomalyDetection>>> {
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;
    let store = state.store.read().await;
    store.sources.require(&source_id)?;
    let detections = store
        .detections_for_source(&source_id)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(ListResponse::paginate(detections, offset, limit)))
}

async fn latest_handler(
    State(state): State<SharedState>,
    Path(source_id): Path<String>,
) -> ApiResult<Json<AnomalyDetection>> {
    let store = state.store.read().await;
    store.sources.require(&source_id)?;
    store
        .latest_detection(&source_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Detection for source", source_id))
}

async fn get_detection_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AnomalyDetection>> {
    let store = state.store.read().await;
    Ok(Json(store.detections.require(&id)?.clone()))
}

async fn explain_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<ExplainRequest>,
) -> ApiResult<Json<ExplainResponse>> {
    let mut store = state.store.write().await;
    Ok(Json(anomaly::explain(&mut store, &id, &request)?))
}

async fn explanations_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AnomalyExplanation>>> {
    let store = state.store.read().await;
    store.detections.require(&id)?;
    Ok(Json(
        store
            .explanations_for_detection(&id)
            .into_iter()
            .cloned()
            .collect(),
    ))
}

// ============================================================================
// Batch jobs
// ============================================================================

async fn create_batch_handler(
    State(state): State<SharedState>,
    JsonBody(request): JsonBody<BatchRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut store = state.store.write().await;
    let job = batch::create(&mut store, &request)?;
    Ok(created(job))
}

async fn list_batch_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<BatchDetectionJob>>> {
    let status = params.enum_value::<BatchJobStatus>("status")?;
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;
    let store = state.store.read().await;
    let mut jobs: Vec<BatchDetectionJob> = store
        .batch_jobs
        .iter()
        .filter(|j| status.map_or(true, |s| j.status == s))
        .cloned()
        .collect();
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(ListResponse::paginate(jobs, offset, limit)))
}

async fn get_batch_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BatchDetectionJob>> {
    // Polling advances the simulated job.
    let mut store = state.store.write().await;
    Ok(Json(batch::advance(&mut store, &id)?))
}

async fn batch_results_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<BatchSourceResult>>> {
    let store = state.store.read().await;
    Ok(Json(store.batch_jobs.require(&id)?.results.clone()))
}

async fn cancel_batch_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BatchDetectionJob>> {
    let mut store = state.store.write().await;
    Ok(Json(batch::cancel(&mut store, &id)?))
}

async fn delete_batch_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write().await.batch_jobs.remove(&id)?;
    info!(job_id = %id, "Batch job deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Comparison
// ============================================================================

async fn compare_handler(
    State(state): State<SharedState>,
    params: Params,
    JsonBody(request): JsonBody<CompareRequest>,
) -> ApiResult<Json<AlgorithmComparisonResult>> {
    let source_id = params
        .str("source_id")
        .ok_or_else(|| ApiError::bad_request("source_id query parameter is required"))?;
    comparison::validate_algorithms(&request.algorithms)?;

    let mut store = state.store.write().await;
    let source = store.sources.require(source_id)?.clone();
    Ok(Json(comparison::compare(&mut store.rng, &source, &request)?))
}
