//! Storage tiers, tier policies, configurations and migrations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{created, required_str};
use crate::error::{ApiError, ApiResult};
use crate::factories::{self, merge_json};
use crate::models::{
    ListResponse, MigrationHistory, MigrationStatus, PolicyTree, PolicyType, StorageTier,
    TierPolicy, TieringConfig,
};
use crate::server::{JsonBody, OptionalJsonBody, Params, SharedState};
use crate::storage::FixtureStore;
use crate::tiering::executor::{self, ExecuteRequest, ExecutionResult, ProcessAllResult};
use crate::tiering::{self, TieringStats};

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct AttachRequest {
    child_policy_id: String,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/v1/tiering/tiers",
            get(list_tiers_handler).post(create_tier_handler),
        )
        .route(
            "/api/v1/tiering/tiers/:id",
            get(get_tier_handler)
                .put(update_tier_handler)
                .delete(delete_tier_handler),
        )
        .route(
            "/api/v1/tiering/policies",
            get(list_policies_handler).post(create_policy_handler),
        )
        .route(
            "/api/v1/tiering/policies/:id",
            get(get_policy_handler)
                .put(update_policy_handler)
                .delete(delete_policy_handler),
        )
        .route("/api/v1/tiering/policies/:id/tree", get(tree_handler))
        .route(
            "/api/v1/tiering/policies/:id/children",
            post(attach_child_handler),
        )
        .route(
            "/api/v1/tiering/policies/:id/children/:child_id",
            delete(detach_child_handler),
        )
        .route("/api/v1/tiering/policies/:id/execute", post(execute_handler))
        .route("/api/v1/tiering/process-all", post(process_all_handler))
        .route(
            "/api/v1/tiering/configs",
            get(list_configs_handler).post(create_config_handler),
        )
        .route(
            "/api/v1/tiering/configs/:id",
            get(get_config_handler)
                .put(update_config_handler)
                .delete(delete_config_handler),
        )
        .route("/api/v1/tiering/configs/:id/activate", post(activate_handler))
        .route("/api/v1/tiering/migrations", get(list_migrations_handler))
        .route("/api/v1/tiering/migrations/:id", get(get_migration_handler))
        .route("/api/v1/tiering/stats", get(stats_handler))
}

// ============================================================================
// Tiers
// ============================================================================

async fn list_tiers_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<StorageTier>>> {
    let active_only = params.flag("active_only")?.unwrap_or(false);
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;
    let store = state.store.read().await;
    let mut tiers: Vec<StorageTier> = store
        .tiers
        .iter()
        .filter(|t| !active_only || t.is_active)
        .cloned()
        .collect();
    tiers.sort_by_key(|t| t.priority);
    Ok(Json(ListResponse::paginate(tiers, offset, limit)))
}

async fn get_tier_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StorageTier>> {
    let store = state.store.read().await;
    Ok(Json(store.tiers.require(&id)?.clone()))
}

async fn create_tier_handler(
    State(state): State<SharedState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<impl IntoResponse> {
    required_str(&body, "name")?;
    let mut store = state.store.write().await;
    let next_priority = store
        .tiers
        .iter()
        .map(|t| t.priority + 1)
        .max()
        .unwrap_or(0);
    let base = factories::new_tier(&mut store.rng, next_priority);
    let tier: StorageTier = merge_json(&base, &body)?;
    let tier = store.tiers.add(tier)?.clone();
    info!(tier_id = %tier.id, name = %tier.name, priority = tier.priority, "Tier created");
    Ok(created(tier))
}

async fn update_tier_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<Value>,
) -> ApiResult<Json<StorageTier>> {
    let mut store = state.store.write().await;
    let mut tier = merge_json(store.tiers.require(&id)?, &patch)?;
    tier.id = id;
    tier.updated_at = Utc::now();
    store.tiers.replace(tier.clone())?;
    Ok(Json(tier))
}

async fn delete_tier_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let mut store = state.store.write().await;
    store.tiers.require(&id)?;
    let referenced = store
        .policies
        .iter()
        .filter(|p| p.from_tier_id == id || p.to_tier_id == id)
        .count();
    if referenced > 0 {
        return Err(ApiError::Conflict {
            message: format!("Tier {} is referenced by {} policies", id, referenced),
        });
    }
    store.tiers.remove(&id)?;
    info!(tier_id = %id, "Tier deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Policies
// ============================================================================

async fn list_policies_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<TierPolicy>>> {
    let policy_type = params.enum_value::<PolicyType>("policy_type")?;
    let is_active = params.flag("is_active")?;
    let root_only = params.flag("root_only")?.unwrap_or(false);
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;

    let store = state.store.read().await;
    let mut policies: Vec<TierPolicy> = store
        .policies
        .iter()
        .filter(|p| policy_type.map_or(true, |t| p.policy_type == t))
        .filter(|p| is_active.map_or(true, |a| p.is_active == a))
        .filter(|p| !root_only || p.parent_id.is_none())
        .map(|p| tiering::with_child_count(&store, p))
        .collect();
    policies.sort_by_key(|p| p.priority);
    Ok(Json(ListResponse::paginate(policies, offset, limit)))
}

async fn get_policy_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TierPolicy>> {
    let store = state.store.read().await;
    let policy = store.policies.require(&id)?;
    Ok(Json(tiering::with_child_count(&store, policy)))
}

async fn create_policy_handler(
    State(state): State<SharedState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<impl IntoResponse> {
    required_str(&body, "name")?;
    required_str(&body, "from_tier_id")?;
    required_str(&body, "to_tier_id")?;
    let strict = state.strict();
    let mut store = state.store.write().await;

    let base = factories::new_policy(&mut store.rng);
    let mut policy = tiering::normalize(merge_json(&base, &body)?);
    let parent_id = policy.parent_id.take();
    tiering::validate_policy(&store, &policy, strict)?;
    let id = store.policies.add(policy)?.id.clone();

    if let Some(parent_id) = parent_id {
        if let Err(err) = tiering::attach_child(&mut store, &parent_id, &id) {
            warn!(policy_id = %id, parent_id = %parent_id, "Attach failed, discarding new policy");
            store.policies.remove(&id)?;
            return Err(err);
        }
    }

    let policy = tiering::with_child_count(&store, store.policies.require(&id)?);
    info!(policy_id = %policy.id, policy_type = ?policy.policy_type, "Policy created");
    Ok(created(policy))
}

async fn update_policy_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<Value>,
) -> ApiResult<Json<TierPolicy>> {
    let strict = state.strict();
    let mut store = state.store.write().await;
    let current = store.policies.require(&id)?;
    let parent_id = current.parent_id.clone();
    let mut policy = tiering::normalize(merge_json(current, &patch)?);
    policy.id = id.clone();
    // Membership changes go through the children endpoints.
    policy.parent_id = parent_id;
    policy.updated_at = Utc::now();
    tiering::check_membership(&store, &policy)?;
    tiering::validate_policy(&store, &policy, strict)?;
    store.policies.replace(policy)?;
    let policy = tiering::with_child_count(&store, store.policies.require(&id)?);
    Ok(Json(policy))
}

async fn delete_policy_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let mut store = state.store.write().await;
    store.policies.remove(&id)?;
    let orphans: Vec<String> = store
        .policy_children(&id)
        .into_iter()
        .map(|p| p.id.clone())
        .collect();
    for child_id in &orphans {
        store.policies.update(child_id, |c| c.parent_id = None)?;
    }
    info!(policy_id = %id, detached = orphans.len(), "Policy deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn tree_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PolicyTree>> {
    let store = state.store.read().await;
    Ok(Json(tiering::tree(&store, &id)?))
}

async fn attach_child_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<AttachRequest>,
) -> ApiResult<Json<TierPolicy>> {
    let mut store = state.store.write().await;
    Ok(Json(tiering::attach_child(&mut store, &id, &request.child_policy_id)?))
}

async fn detach_child_handler(
    State(state): State<SharedState>,
    Path((id, child_id)): Path<(String, String)>,
) -> ApiResult<Json<TierPolicy>> {
    let mut store = state.store.write().await;
    Ok(Json(tiering::detach_child(&mut store, &id, &child_id)?))
}

async fn execute_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    OptionalJsonBody(request): OptionalJsonBody<ExecuteRequest>,
) -> ApiResult<Json<ExecutionResult>> {
    let strict = state.strict();
    let mut store = state.store.write().await;
    Ok(Json(executor::execute(&mut store, &id, request.dry_run, strict)?))
}

async fn process_all_handler(
    State(state): State<SharedState>,
    OptionalJsonBody(request): OptionalJsonBody<ExecuteRequest>,
) -> ApiResult<Json<ProcessAllResult>> {
    let strict = state.strict();
    let mut store = state.store.write().await;
    Ok(Json(executor::process_all(&mut store, request.dry_run, strict)?))
}

// ============================================================================
// Configs
// ============================================================================

async fn list_configs_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<TieringConfig>>> {
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;
    let store = state.store.read().await;
    let configs = store.tiering_configs.all().to_vec();
    Ok(Json(ListResponse::paginate(configs, offset, limit)))
}

async fn get_config_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TieringConfig>> {
    let store = state.store.read().await;
    Ok(Json(store.tiering_configs.require(&id)?.clone()))
}

fn check_default_tier(store: &FixtureStore, config: &TieringConfig) -> ApiResult<()> {
    match &config.default_tier_id {
        Some(tier_id) if !store.tiers.contains(tier_id) => Err(ApiError::bad_request(format!(
            "default_tier_id references an unknown tier: '{}'",
            tier_id
        ))),
        _ => Ok(()),
    }
}

async fn create_config_handler(
    State(state): State<SharedState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<impl IntoResponse> {
    let name = required_str(&body, "name")?;
    let mut store = state.store.write().await;
    let mut base = factories::tiering_config(&mut store.rng, name, None);
    let now = Utc::now();
    base.created_at = now;
    base.updated_at = now;
    let config: TieringConfig = merge_json(&base, &body)?;
    check_default_tier(&store, &config)?;

    let activate = config.is_active;
    let mut config = store.tiering_configs.add(config)?.clone();
    if activate {
        config = tiering::activate_config(&mut store, &config.id)?;
    }
    info!(config_id = %config.id, active = config.is_active, "Tiering config created");
    Ok(created(config))
}

async fn update_config_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<Value>,
) -> ApiResult<Json<TieringConfig>> {
    let mut store = state.store.write().await;
    let mut config = merge_json(store.tiering_configs.require(&id)?, &patch)?;
    config.id = id.clone();
    config.updated_at = Utc::now();
    check_default_tier(&store, &config)?;

    let activate = config.is_active;
    store.tiering_configs.replace(config.clone())?;
    if activate {
        config = tiering::activate_config(&mut store, &id)?;
    }
    Ok(Json(config))
}

async fn delete_config_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write().await.tiering_configs.remove(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn activate_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TieringConfig>> {
    let mut store = state.store.write().await;
    Ok(Json(tiering::activate_config(&mut store, &id)?))
}

// ============================================================================
// Migrations and stats
// ============================================================================

async fn list_migrations_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<MigrationHistory>>> {
    let policy_id = params.str("policy_id");
    let status = params.enum_value::<MigrationStatus>("status")?;
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;

    let store = state.store.read().await;
    let mut migrations: Vec<MigrationHistory> = store
        .migrations
        .iter()
        .filter(|m| policy_id.map_or(true, |p| m.policy_id == p))
        .filter(|m| status.map_or(true, |s| m.status == s))
        .cloned()
        .collect();
    migrations.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(Json(ListResponse::paginate(migrations, offset, limit)))
}

async fn get_migration_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MigrationHistory>> {
    let store = state.store.read().await;
    Ok(Json(store.migrations.require(&id)?.clone()))
}

async fn stats_handler(State(state): State<SharedState>) -> Json<TieringStats> {
    Json(tiering::stats(&*state.store.read().await))
}
