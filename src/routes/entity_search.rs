//! Entity search backing the follow picker.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::EntityHit;
use crate::openalex::EntityKind;
use crate::routes::validate_limit;
use crate::services::AppState;

const DEFAULT_RESULTS: usize = 10;
const MAX_RESULTS: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new().route("/{kind}", get(search_entities))
}

#[derive(Debug, Deserialize)]
pub struct EntitySearchParams {
    q: String,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct EntitySearchResponse {
    pub results: Vec<EntityHit>,
}

#[instrument(skip(state, _auth))]
async fn search_entities(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(kind): Path<String>,
    Query(params): Query<EntitySearchParams>,
) -> Result<Json<EntitySearchResponse>, AppError> {
    let kind: EntityKind = kind.parse().map_err(AppError::validation)?;
    if params.q.trim().is_empty() {
        return Err(AppError::validation("query string cannot be empty"));
    }
    let limit = validate_limit(params.limit, DEFAULT_RESULTS, MAX_RESULTS)?;

    let results = state
        .index
        .search_entities(kind, params.q.trim(), limit as u32)
        .await?;
    Ok(Json(EntitySearchResponse { results }))
}
