//! Follow management and the "following" feed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{EntityType, Follow, Paper};
use crate::routes::validate_limit;
use crate::services::follows::{DEFAULT_PER_ENTITY, DEFAULT_TOTAL};
use crate::services::AppState;

const MAX_PER_ENTITY: usize = 200;
const MAX_TOTAL: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_follows).post(follow_entity))
        .route("/papers", get(followed_papers))
        .route("/{entity_type}/{entity_id}", axum::routing::delete(unfollow_entity))
}

#[derive(Debug, Serialize)]
pub struct FollowsResponse {
    pub follows: Vec<Follow>,
}

#[instrument(skip(state, auth))]
async fn list_follows(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<FollowsResponse>, AppError> {
    let follows = state.users.list_follows(&auth.user_id).await?;
    Ok(Json(FollowsResponse { follows }))
}

#[derive(Debug, Deserialize)]
pub struct FollowRequest {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(rename = "entityId", default)]
    pub entity_id: Option<String>,
    #[serde(rename = "entityName")]
    pub entity_name: String,
    #[serde(rename = "openalexId", default)]
    pub openalex_id: Option<String>,
}

/// Stable id for a free-text follow, derived from the query itself.
fn custom_entity_id(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.trim().to_lowercase().as_bytes());
    let digest = hasher.finalize();
    format!("q{}", hex::encode(&digest[..16]))
}

#[instrument(skip(state, auth, request))]
async fn follow_entity(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<FollowRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    if request.entity_name.trim().is_empty() {
        return Err(AppError::validation("entityName must not be empty"));
    }

    let (entity_id, openalex_id) = match request.entity_type {
        // Custom follows carry their query text; the id is derived so the
        // same query never creates a second edge.
        EntityType::Custom => (
            custom_entity_id(&request.entity_name),
            request.entity_name.trim().to_string(),
        ),
        _ => {
            let entity_id = request
                .entity_id
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| AppError::validation("entityId is required"))?;
            let openalex_id = request.openalex_id.unwrap_or_else(|| entity_id.clone());
            (entity_id, openalex_id)
        }
    };

    let (follow, created) = state
        .users
        .follow(
            &auth.user_id,
            request.entity_type,
            &entity_id,
            request.entity_name.trim(),
            &openalex_id,
        )
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({"success": true, "follow": follow}))))
}

#[instrument(skip(state, auth))]
async fn unfollow_entity(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let entity_type: EntityType = entity_type.parse().map_err(AppError::validation)?;
    state
        .users
        .unfollow(&auth.user_id, entity_type, &entity_id)
        .await?;
    Ok(Json(json!({"success": true})))
}

#[derive(Debug, Deserialize)]
pub struct FollowedPapersParams {
    limit_per_entity: Option<u32>,
    total_limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct FollowedPapersResponse {
    pub papers: Vec<Paper>,
    pub count: usize,
}

#[instrument(skip(state, auth))]
async fn followed_papers(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<FollowedPapersParams>,
) -> Result<Json<FollowedPapersResponse>, AppError> {
    let limit_per_entity = validate_limit(
        params.limit_per_entity,
        DEFAULT_PER_ENTITY as usize,
        MAX_PER_ENTITY,
    )?;
    let total_limit = validate_limit(params.total_limit, DEFAULT_TOTAL, MAX_TOTAL)?;

    let papers = state
        .follow_feed
        .followed_papers(&auth.user_id, limit_per_entity as u32, total_limit)
        .await?;
    let count = papers.len();
    Ok(Json(FollowedPapersResponse { papers, count }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_id_is_stable_and_case_insensitive() {
        let a = custom_entity_id("transformer circuits");
        let b = custom_entity_id("Transformer Circuits ");
        assert_eq!(a, b);
        assert!(a.starts_with('q'));
        assert_eq!(a.len(), 33);
    }
}
