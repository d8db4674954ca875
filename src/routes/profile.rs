//! Declared-interest profile endpoints.

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::routes::folders::FolderView;
use crate::services::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_profile).put(put_profile).delete(clear_profile))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub topics: Vec<String>,
    pub authors: Vec<String>,
    pub folders: Vec<FolderView>,
}

#[instrument(skip(state, auth))]
async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let profile = state.users.get_profile(&auth.user_id).await?;
    let folders = state.users.list_folders(&auth.user_id).await?;
    Ok(Json(ProfileResponse {
        topics: profile.topics,
        authors: profile.authors,
        folders: folders.into_iter().map(FolderView::from_folder).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PutProfileRequest {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

#[instrument(skip(state, auth, request))]
async fn put_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<PutProfileRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .users
        .put_profile(&auth.user_id, request.topics, request.authors)
        .await?;
    Ok(Json(json!({"status": "ok"})))
}

#[instrument(skip(state, auth))]
async fn clear_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.clear_profile(&auth.user_id).await?;
    Ok(Json(json!({"status": "ok"})))
}
