use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tracing::info;

use super::created;
use crate::error::{ApiError, ApiResult};
use crate::factories::merge_json;
use crate::models::{ListResponse, VersionDiff, VersionInfo};
use crate::server::{JsonBody, Params, SharedState};
use crate::versioning::{self, CreateVersionRequest, RollbackResponse, DEFAULT_HISTORY_LIMIT};

const DEFAULT_LIMIT: usize = 20;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/v1/versions",
            get(list_versions_handler).post(create_version_handler),
        )
        .route(
            "/api/v1/versions/:id",
            get(get_version_handler)
                .patch(update_version_handler)
                .delete(delete_version_handler),
        )
        .route("/api/v1/versions/:id/history", get(history_handler))
        .route(
            "/api/v1/versions/:id/compare/:other_id",
            get(compare_handler),
        )
        .route("/api/v1/versions/:id/rollback", post(rollback_handler))
        .route(
            "/api/v1/sources/:id/versions/latest",
            get(latest_version_handler),
        )
}

async fn list_versions_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<VersionInfo>>> {
    let source_id = params.str("source_id");
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;

    let store = state.store.read().await;
    let mut versions: Vec<VersionInfo> = store
        .versions
        .iter()
        .filter(|v| source_id.map_or(true, |s| v.source_id == s))
        .cloned()
        .collect();
    versions.sort_by(|a, b| {
        a.source_id
            .cmp(&b.source_id)
            .then(b.version_number.cmp(&a.version_number))
    });
    Ok(Json(ListResponse::paginate(versions, offset, limit)))
}

async fn create_version_handler(
    State(state): State<SharedState>,
    JsonBody(request): JsonBody<CreateVersionRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut store = state.store.write().await;
    Ok(created(versioning::create(&mut store, &request)?))
}

async fn get_version_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VersionInfo>> {
    let store = state.store.read().await;
    Ok(Json(store.versions.require(&id)?.clone()))
}

async fn update_version_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<Value>,
) -> ApiResult<Json<VersionInfo>> {
    let mut store = state.store.write().await;
    let current = store.versions.require(&id)?;
    let mut version = merge_json(current, &patch)?;
    // Chain position is fixed once created.
    version.id = current.id.clone();
    version.source_id = current.source_id.clone();
    version.version_number = current.version_number;
    version.parent_version_id = current.parent_version_id.clone();
    store.versions.replace(version.clone())?;
    Ok(Json(version))
}

async fn delete_version_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write().await.versions.remove(&id)?;
    info!(version_id = %id, "Version deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn history_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    params: Params,
) -> ApiResult<Json<Vec<VersionInfo>>> {
    let limit = params
        .parse::<usize>("limit")?
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .max(1);
    let store = state.store.read().await;
    Ok(Json(versioning::history(&store, &id, limit)?))
}

async fn compare_handler(
    State(state): State<SharedState>,
    Path((id, other_id)): Path<(String, String)>,
) -> ApiResult<Json<VersionDiff>> {
    let store = state.store.read().await;
    let a = store.versions.require(&id)?;
    let b = store.versions.require(&other_id)?;
    Ok(Json(versioning::diff(a, b)?))
}

async fn rollback_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RollbackResponse>> {
    let mut store = state.store.write().await;
    Ok(Json(versioning::rollback(&mut store, &id)?))
}

async fn latest_version_handler(
    State(state): State<SharedState>,
    Path(source_id): Path<String>,
) -> ApiResult<Json<VersionInfo>> {
    let store = state.store.read().await;
    store.sources.require(&source_id)?;
    store
        .latest_version(&source_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Version for source", source_id))
}
