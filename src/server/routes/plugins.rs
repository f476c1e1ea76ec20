//! Plugin marketplace, lifecycle, hooks and trust store.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{created, required_str};
use crate::error::{ApiError, ApiResult};
use crate::factories::{self, merge_json};
use crate::models::{
    matches_search, HookRegistration, HookType, HotReloadConfig, ListResponse, Plugin,
    PluginLifecycle, PluginStatus, PluginType, TrustedSigner,
};
use crate::plugins::{
    self, HotReloadResponse, InstallResponse, TransitionRequest, TransitionResponse,
    UninstallResponse, UpdateResponse,
};
use crate::server::{JsonBody, OptionalJsonBody, Params, SharedState};

const DEFAULT_LIMIT: usize = 20;
const HOOK_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstallRequest {
    version: Option<String>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/v1/plugins",
            get(list_plugins_handler).post(create_plugin_handler),
        )
        .route(
            "/api/v1/plugins/:id",
            get(get_plugin_handler).patch(update_plugin_handler),
        )
        .route("/api/v1/plugins/:id/install", post(install_handler))
        .route("/api/v1/plugins/:id/uninstall", post(uninstall_handler))
        .route("/api/v1/plugins/:id/enable", post(enable_handler))
        .route("/api/v1/plugins/:id/disable", post(disable_handler))
        .route("/api/v1/plugins/:id/update", post(upgrade_handler))
        .route("/api/v1/plugins/:id/lifecycle", get(lifecycle_handler))
        .route(
            "/api/v1/plugins/:id/lifecycle/transition",
            post(transition_handler),
        )
        .route(
            "/api/v1/plugins/:id/hot-reload",
            get(get_hot_reload_handler)
                .put(put_hot_reload_handler)
                .post(trigger_hot_reload_handler),
        )
        .route(
            "/api/v1/plugin-hooks",
            get(list_hooks_handler).post(create_hook_handler),
        )
        .route("/api/v1/plugin-hooks/:id", delete(delete_hook_handler))
        .route(
            "/api/v1/plugin-security/signers",
            get(list_signers_handler).post(create_signer_handler),
        )
        .route(
            "/api/v1/plugin-security/signers/:id",
            delete(delete_signer_handler),
        )
}

// ============================================================================
// Marketplace
// ============================================================================

async fn list_plugins_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<Plugin>>> {
    let plugin_type = params.enum_value::<PluginType>("type")?;
    let status = params.enum_value::<PluginStatus>("status")?;
    let search = params.str("search");
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;

    let store = state.store.read().await;
    let matching: Vec<Plugin> = store
        .plugins
        .iter()
        .filter(|p| plugin_type.map_or(true, |t| p.plugin_type == t))
        .filter(|p| status.map_or(true, |s| p.status == s))
        .filter(|p| {
            search.map_or(true, |q| {
                matches_search(q, &[&p.name, &p.display_name, &p.description])
            })
        })
        .cloned()
        .collect();
    Ok(Json(ListResponse::paginate(matching, offset, limit)))
}

async fn get_plugin_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Plugin>> {
    let store = state.store.read().await;
    Ok(Json(store.plugins.require(&id)?.clone()))
}

async fn create_plugin_handler(
    State(state): State<SharedState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<impl IntoResponse> {
    required_str(&body, "name")?;
    let mut store = state.store.write().await;
    let base = factories::new_plugin(&mut store.rng);
    let mut plugin = merge_json(&base, &body)?;
    if body.get("display_name").is_none() {
        plugin.display_name = plugin.name.clone();
    }
    plugin.updated_at = plugin.created_at;

    let plugin = store.plugins.add(plugin)?.clone();
    info!(plugin_id = %plugin.id, name = %plugin.name, "Plugin created");
    Ok(created(plugin))
}

async fn update_plugin_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<Value>,
) -> ApiResult<Json<Plugin>> {
    let mut store = state.store.write().await;
    let mut plugin = merge_json(store.plugins.require(&id)?, &patch)?;
    plugin.updated_at = Utc::now();
    store.plugins.replace(plugin.clone())?;
    Ok(Json(plugin))
}

// ============================================================================
// Actions
// ============================================================================

async fn install_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    OptionalJsonBody(body): OptionalJsonBody<InstallRequest>,
) -> Json<InstallResponse> {
    let mut store = state.store.write().await;
    Json(plugins::install(&mut store, &id, body.version))
}

async fn uninstall_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<UninstallResponse> {
    let mut store = state.store.write().await;
    Json(plugins::uninstall(&mut store, &id))
}

async fn enable_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Plugin>> {
    let mut store = state.store.write().await;
    Ok(Json(plugins::set_enabled(&mut store, &id, true)?))
}

async fn disable_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Plugin>> {
    let mut store = state.store.write().await;
    Ok(Json(plugins::set_enabled(&mut store, &id, false)?))
}

async fn upgrade_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<UpdateResponse> {
    let mut store = state.store.write().await;
    Json(plugins::update(&mut store, &id))
}

// ============================================================================
// Lifecycle and hot reload
// ============================================================================

async fn lifecycle_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PluginLifecycle>> {
    // Lazily created records need the write lock.
    let mut store = state.store.write().await;
    Ok(Json(plugins::lifecycle_mut(&mut store, &id)?.clone()))
}

async fn transition_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<TransitionRequest>,
) -> ApiResult<Json<TransitionResponse>> {
    let mut store = state.store.write().await;
    Ok(Json(plugins::transition_plugin(&mut store, &id, &request)?))
}

async fn get_hot_reload_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<HotReloadConfig>> {
    let mut store = state.store.write().await;
    Ok(Json(plugins::hot_reload_mut(&mut store, &id)?.clone()))
}

async fn put_hot_reload_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<Value>,
) -> ApiResult<Json<HotReloadConfig>> {
    let mut store = state.store.write().await;
    let current = plugins::hot_reload_mut(&mut store, &id)?;
    let mut updated: HotReloadConfig = merge_json(&*current, &patch)?;
    updated.plugin_id = id.clone();
    *current = updated.clone();
    info!(plugin_id = %id, enabled = updated.enabled, "Hot reload settings updated");
    Ok(Json(updated))
}

async fn trigger_hot_reload_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<HotReloadResponse>> {
    let mut store = state.store.write().await;
    Ok(Json(plugins::hot_reload(&mut store, &id)?))
}

// ============================================================================
// Hooks
// ============================================================================

async fn list_hooks_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<HookRegistration>>> {
    let plugin_id = params.str("plugin_id");
    let hook_type = params.enum_value::<HookType>("hook_type")?;
    let (offset, limit) = params.page(HOOK_LIMIT)?;

    let store = state.store.read().await;
    let mut matching: Vec<HookRegistration> = store
        .hooks
        .iter()
        .filter(|h| plugin_id.map_or(true, |p| h.plugin_id == p))
        .filter(|h| hook_type.map_or(true, |t| h.hook_type == t))
        .cloned()
        .collect();
    matching.sort_by_key(|h| h.priority);
    Ok(Json(ListResponse::paginate(matching, offset, limit)))
}

async fn create_hook_handler(
    State(state): State<SharedState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<impl IntoResponse> {
    let plugin_id = required_str(&body, "plugin_id")?;
    if body.get("hook_type").is_none() {
        return Err(ApiError::bad_request("hook_type is required"));
    }
    let mut store = state.store.write().await;
    store.plugins.require(plugin_id)?;
    let base = factories::hook(&mut store.rng, plugin_id);
    let mut hook: HookRegistration = merge_json(&base, &body)?;
    hook.created_at = Utc::now();
    let hook = store.hooks.add(hook)?.clone();
    info!(hook_id = %hook.id, plugin_id = %hook.plugin_id, "Hook registered");
    Ok(created(hook))
}

async fn delete_hook_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write().await.hooks.remove(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Trust store
// ============================================================================

async fn list_signers_handler(
    State(state): State<SharedState>,
) -> Json<Vec<TrustedSigner>> {
    Json(state.store.read().await.signers.all().to_vec())
}

async fn create_signer_handler(
    State(state): State<SharedState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<impl IntoResponse> {
    required_str(&body, "name")?;
    required_str(&body, "fingerprint")?;
    let mut store = state.store.write().await;
    let base = factories::signer(&mut store.rng);
    let mut signer: TrustedSigner = merge_json(&base, &body)?;
    signer.added_at = Utc::now();
    let signer = store.signers.add(signer)?.clone();
    info!(signer_id = %signer.id, name = %signer.name, "Signer added");
    Ok(created(signer))
}

async fn delete_signer_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write().await.signers.remove(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
