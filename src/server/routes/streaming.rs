use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use super::created;
use crate::anomaly::streaming::{
    self, BatchPointsRequest, BatchPushResponse, PointRequest, PushResponse, StartRequest,
    StreamingAlgorithmInfo,
};
use crate::error::ApiResult;
use crate::models::{ListResponse, StreamingAlert, StreamingDataPoint, StreamingSession, StreamingStatus};
use crate::server::{JsonBody, OptionalJsonBody, Params, SharedState};

const DEFAULT_LIMIT: usize = 50;
const DEFAULT_POINTS: usize = 100;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/anomaly/streaming/start", post(start_handler))
        .route("/api/v1/anomaly/streaming/sessions", get(sessions_handler))
        .route("/api/v1/anomaly/streaming/algorithms", get(algorithms_handler))
        .route(
            "/api/v1/anomaly/streaming/:id",
            axum::routing::delete(delete_handler),
        )
        .route(
            "/api/v1/anomaly/streaming/:id/data",
            get(recent_points_handler).post(push_handler),
        )
        .route("/api/v1/anomaly/streaming/:id/batch", post(push_batch_handler))
        .route("/api/v1/anomaly/streaming/:id/status", get(status_handler))
        .route("/api/v1/anomaly/streaming/:id/alerts", get(alerts_handler))
        .route("/api/v1/anomaly/streaming/:id/stop", post(stop_handler))
}

async fn start_handler(
    State(state): State<SharedState>,
    OptionalJsonBody(request): OptionalJsonBody<StartRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut store = state.store.write().await;
    Ok(created(streaming::start(&mut store, &request)?))
}

async fn push_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(point): JsonBody<PointRequest>,
) -> ApiResult<Json<PushResponse>> {
    let mut store = state.store.write().await;
    Ok(Json(streaming::push(&mut store, &id, &point)?))
}

async fn push_batch_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<BatchPointsRequest>,
) -> ApiResult<Json<BatchPushResponse>> {
    let mut store = state.store.write().await;
    Ok(Json(streaming::push_batch(&mut store, &id, &request)?))
}

async fn status_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StreamingSession>> {
    let store = state.store.read().await;
    Ok(Json(store.streaming_sessions.require(&id)?.clone()))
}

async fn alerts_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    params: Params,
) -> ApiResult<Json<ListResponse<StreamingAlert>>> {
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;
    let store = state.store.read().await;
    store.streaming_sessions.require(&id)?;
    let alerts = store.alerts_for_session(&id).into_iter().cloned().collect();
    Ok(Json(ListResponse::paginate(alerts, offset, limit)))
}

async fn recent_points_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    params: Params,
) -> ApiResult<Json<Vec<StreamingDataPoint>>> {
    let limit = params
        .parse::<usize>("limit")?
        .unwrap_or(DEFAULT_POINTS)
        .clamp(1, streaming::RECENT_POINTS);
    let store = state.store.read().await;
    Ok(Json(streaming::recent_points(&store, &id, limit)?))
}

async fn stop_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StreamingSession>> {
    let mut store = state.store.write().await;
    Ok(Json(streaming::stop(&mut store, &id)?))
}

async fn delete_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let mut store = state.store.write().await;
    streaming::delete(&mut store, &id)?;
    info!(session_id = %id, "Streaming session deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn sessions_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<StreamingSession>>> {
    let status = params.enum_value::<StreamingStatus>("status")?;
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;
    let store = state.store.read().await;
    let mut sessions: Vec<StreamingSession> = store
        .streaming_sessions
        .iter()
        .filter(|s| status.map_or(true, |st| s.status == st))
        .cloned()
        .collect();
    sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(Json(ListResponse::paginate(sessions, offset, limit)))
}

async fn algorithms_handler() -> Json<Vec<StreamingAlgorithmInfo>> {
    Json(streaming::algorithms())
}
