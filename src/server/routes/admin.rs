//! Health and fixture administration.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiResult;
use crate::server::{OptionalJsonBody, SharedState};
use crate::storage::StoreCounts;

/// Body of a reset request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetRequest {
    /// New seed; the current one when absent.
    pub seed: Option<u64>,
}

/// Store summary after a reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    /// Seed the store was rebuilt from.
    pub seed: u64,
    /// Records per collection.
    pub counts: StoreCounts,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/mock/reset", post(reset_handler))
        .route("/api/v1/mock/state", get(state_handler))
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn reset_handler(
    State(state): State<SharedState>,
    OptionalJsonBody(body): OptionalJsonBody<ResetRequest>,
) -> ApiResult<Json<ResetResponse>> {
    let mut store = state.store.write().await;
    match body.seed {
        Some(seed) => store.reinit(seed),
        None => store.reset(),
    }
    info!(seed = store.seed(), "Fixture store reset");
    Ok(Json(ResetResponse {
        seed: store.seed(),
        counts: store.counts(),
    }))
}

async fn state_handler(State(state): State<SharedState>) -> Json<StoreCounts> {
    Json(state.store.read().await.counts())
}
