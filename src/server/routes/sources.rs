use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::ApiResult;
use crate::models::{matches_search, ListResponse, Source, SourceType};
use crate::server::{Params, SharedState};

const DEFAULT_LIMIT: usize = 20;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/sources", get(list_sources_handler))
        .route("/api/v1/sources/:id", get(get_source_handler))
}

async fn list_sources_handler(
    State(state): State<SharedState>,
    params: Params,
) -> ApiResult<Json<ListResponse<Source>>> {
    let source_type = params.enum_value::<SourceType>("type")?;
    let search = params.str("search");
    let (offset, limit) = params.page(DEFAULT_LIMIT)?;

    let store = state.store.read().await;
    let matching: Vec<Source> = store
        .sources
        .iter()
        .filter(|s| source_type.map_or(true, |t| s.source_type == t))
        .filter(|s| {
            search.map_or(true, |q| {
                matches_search(q, &[&s.name, s.description.as_deref().unwrap_or("")])
            })
        })
        .cloned()
        .collect();
    Ok(Json(ListResponse::paginate(matching, offset, limit)))
}

async fn get_source_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Source>> {
    let store = state.store.read().await;
    Ok(Json(store.sources.require(&id)?.clone()))
}
