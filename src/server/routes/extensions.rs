//! Custom validators, custom reporters and report downloads.

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{created, required_str};
use crate::error::{ApiError, ApiResult};
use crate::factories::{self, merge_json};
use crate::models::{matches_search, CustomReporter, CustomValidator, ListResponse, ReportFormat};
use crate::plugins::extensions::{self, CategoryCount, ValidatorTestRequest, ValidatorTestResult};
use crate::reports;
use crate::server::{JsonBody, OptionalJsonBody, Params, SharedState};

const DEFAULT_LIMIT: usize = 50;
const SAMPLE_SOURCE: &str = "sample_source";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PreviewRequest {
    format: ReportFormat,
    title: Option<String>,
}

#[derive(Debug, Serialize)]
struct PreviewResponse {
    format: ReportFormat,
    content_type: String,
    content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateRequest {
    format: ReportFormat,
    validation_id: Option<String>,
    source_id: Option<String>,
    title: Option<String>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/v1/validators/custom",
            get(list_validators_handler).post(create_validator_handler),
        )
        .route(
            "/api/v1/validators/custom/:id",
            get(get_validator_handler)
                .patch(update_validator_handler)
                .delete(delete_validator_handler),
        )
        .route("/api/v1/validators/custom/:id/test", post(test_validator_handler))
        .route("/api/v1/validators/categories", get(categories_handler))
        .route(
            "/api/v1/reporters/custom",
            get(list_reporters_handler).post(create_reporter_handler),
        )
        .route(
            "/api/v1/reporters/custom/:id",
            get(get_reporter_handler)
                .patch(update_reporter_handler)
                .delete(delete_reporter_handler),
        )
        .route("/api/v1/reporters/custom/:id/preview", post(preview_handler))
        .route("/api/v1/reporters/custom/:id/generate", post(generate_handler))
}

// ============================================================================
// Validators
// ============================================================================

async fn list_validators_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<CustomValidator>>> {
    let plugin_id = params.str("plugin_id");
    let category = params.str("category");
    let enabled_only = params.flag("enabled_only")?.unwrap_or(false);
    let search = params.str("search");
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;

    let store = state.store.read().await;
    let matching: Vec<CustomValidator> = store
        .validators
        .iter()
        .filter(|v| plugin_id.map_or(true, |p| v.plugin_id == p))
        .filter(|v| category.map_or(true, |c| v.category.eq_ignore_ascii_case(c)))
        .filter(|v| !enabled_only || v.is_enabled)
        .filter(|v| {
            search.map_or(true, |q| {
                matches_search(q, &[&v.name, &v.display_name, &v.description])
            })
        })
        .cloned()
        .collect();
    Ok(Json(ListResponse::paginate(matching, offset, limit)))
}

async fn get_validator_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CustomValidator>> {
    let store = state.store.read().await;
    Ok(Json(store.validators.require(&id)?.clone()))
}

async fn create_validator_handler(
    State(state): State<SharedState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<impl IntoResponse> {
    let plugin_id = required_str(&body, "plugin_id")?;
    let mut store = state.store.write().await;
    store.plugins.require(plugin_id)?;

    let base = factories::custom_validator(&mut store.rng, plugin_id);
    let mut validator: CustomValidator = merge_json(&base, &body)?;
    let now = Utc::now();
    validator.usage_count = 0;
    validator.is_verified = false;
    validator.created_at = now;
    validator.updated_at = now;

    let validator = store.validators.add(validator)?.clone();
    info!(validator_id = %validator.id, plugin_id = %validator.plugin_id, "Validator created");
    Ok(created(validator))
}

async fn update_validator_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<Value>,
) -> ApiResult<Json<CustomValidator>> {
    let mut store = state.store.write().await;
    let mut validator = merge_json(store.validators.require(&id)?, &patch)?;
    validator.updated_at = Utc::now();
    store.validators.replace(validator.clone())?;
    Ok(Json(validator))
}

async fn delete_validator_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write().await.validators.remove(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn test_validator_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    OptionalJsonBody(request): OptionalJsonBody<ValidatorTestRequest>,
) -> ApiResult<Json<ValidatorTestResult>> {
    let mut store = state.store.write().await;
    let validator = store.validators.require(&id)?.clone();
    let result = extensions::test_validator(&mut store.rng, &validator, &request);
    if result.success {
        store.validators.update(&id, |v| v.usage_count += 1)?;
    }
    Ok(Json(result))
}

async fn categories_handler(State(state): State<SharedState>) -> Json<Vec<CategoryCount>> {
    let store = state.store.read().await;
    Json(extensions::categories(store.validators.iter()))
}

// ============================================================================
// Reporters
// ============================================================================

async fn list_reporters_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<CustomReporter>>> {
    let plugin_id = params.str("plugin_id");
    let enabled_only = params.flag("enabled_only")?.unwrap_or(false);
    let search = params.str("search");
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;

    let store = state.store.read().await;
    let matching: Vec<CustomReporter> = store
        .reporters
        .iter()
        .filter(|r| plugin_id.map_or(true, |p| r.plugin_id == p))
        .filter(|r| !enabled_only || r.is_enabled)
        .filter(|r| {
            search.map_or(true, |q| {
                matches_search(q, &[&r.name, &r.display_name, &r.description])
            })
        })
        .cloned()
        .collect();
    Ok(Json(ListResponse::paginate(matching, offset, limit)))
}

async fn get_reporter_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CustomReporter>> {
    let store = state.store.read().await;
    Ok(Json(store.reporters.require(&id)?.clone()))
}

async fn create_reporter_handler(
    State(state): State<SharedState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<impl IntoResponse> {
    let plugin_id = required_str(&body, "plugin_id")?;
    let mut store = state.store.write().await;
    store.plugins.require(plugin_id)?;

    let base = factories::custom_reporter(&mut store.rng, plugin_id);
    let mut reporter: CustomReporter = merge_json(&base, &body)?;
    if reporter.output_formats.is_empty() {
        return Err(ApiError::bad_request("output_formats must not be empty"));
    }
    let now = Utc::now();
    reporter.usage_count = 0;
    reporter.is_verified = false;
    reporter.created_at = now;
    reporter.updated_at = now;

    let reporter = store.reporters.add(reporter)?.clone();
    info!(reporter_id = %reporter.id, plugin_id = %reporter.plugin_id, "Reporter created");
    Ok(created(reporter))
}

async fn update_reporter_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<Value>,
) -> ApiResult<Json<CustomReporter>> {
    let mut store = state.store.write().await;
    let mut reporter = merge_json(store.reporters.require(&id)?, &patch)?;
    reporter.updated_at = Utc::now();
    store.reporters.replace(reporter.clone())?;
    Ok(Json(reporter))
}

async fn delete_reporter_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write().await.reporters.remove(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Rendering
// ============================================================================

async fn preview_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    OptionalJsonBody(request): OptionalJsonBody<PreviewRequest>,
) -> ApiResult<Json<PreviewResponse>> {
    let mut store = state.store.write().await;
    let reporter = store.reporters.require(&id)?.clone();
    let title = request.title.unwrap_or_else(|| reporter.display_name.clone());
    let figures = reports::figures(&mut store.rng, &title, None, SAMPLE_SOURCE);
    let report = reports::render(&reporter, request.format, &figures)?;
    Ok(Json(PreviewResponse {
        format: request.format,
        content_type: report.content_type,
        content: report.content,
    }))
}

async fn generate_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    OptionalJsonBody(request): OptionalJsonBody<GenerateRequest>,
) -> ApiResult<Response> {
    let mut store = state.store.write().await;
    let reporter = store.reporters.require(&id)?.clone();
    let source_name = match request.source_id.as_deref() {
        Some(source_id) => store.sources.require(source_id)?.name.clone(),
        None => SAMPLE_SOURCE.to_string(),
    };
    let title = request.title.unwrap_or_else(|| reporter.display_name.clone());
    let figures = reports::figures(
        &mut store.rng,
        &title,
        request.validation_id.as_deref(),
        &source_name,
    );
    let report = reports::render(&reporter, request.format, &figures)?;
    store.reporters.update(&id, |r| r.usage_count += 1)?;
    info!(reporter_id = %id, filename = %report.filename, "Report generated");

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", report.filename))
        .map_err(|e| ApiError::Internal {
            message: e.to_string(),
        })?;
    let length = report.content.len();
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(request.format.content_type())),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        report.content,
    )
        .into_response())
}
