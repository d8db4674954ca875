//! Folder management endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{Folder, Paper};
use crate::services::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_folders).post(create_folder))
        .route("/{folder_id}", get(get_folder).delete(delete_folder))
        .route("/{folder_id}/papers", axum::routing::post(add_paper))
        .route("/{folder_id}/papers/{paper_id}", delete(remove_paper))
}

/// Folder as rendered to the client; papers are embedded only on the
/// single-folder fetch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub paper_ids: Vec<String>,
    pub paper_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub papers: Option<Vec<Paper>>,
}

impl FolderView {
    pub fn from_folder(folder: Folder) -> Self {
        Self {
            paper_count: folder.paper_ids.len(),
            id: folder.id,
            name: folder.name,
            description: folder.description,
            paper_ids: folder.paper_ids,
            created_at: folder.created_at,
            updated_at: folder.updated_at,
            papers: None,
        }
    }

    pub fn with_papers(folder: Folder, papers: Vec<Paper>) -> Self {
        let mut view = Self::from_folder(folder);
        view.papers = Some(papers);
        view
    }
}

#[instrument(skip(state, auth))]
async fn list_folders(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<FolderView>>, AppError> {
    let folders = state.users.list_folders(&auth.user_id).await?;
    Ok(Json(folders.into_iter().map(FolderView::from_folder).collect()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFolderRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[instrument(skip(state, auth, request))]
async fn create_folder(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateFolderRequest>,
) -> Result<(StatusCode, Json<FolderView>), AppError> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let folder = state
        .users
        .create_folder(&auth.user_id, &request.name, request.description)
        .await?;
    Ok((StatusCode::CREATED, Json(FolderView::from_folder(folder))))
}

#[instrument(skip(state, auth))]
async fn get_folder(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(folder_id): Path<String>,
) -> Result<Json<FolderView>, AppError> {
    let folder = state.users.get_folder(&auth.user_id, &folder_id).await?;
    let papers = state.papers.get_many(&folder.paper_ids).await;
    Ok(Json(FolderView::with_papers(folder, papers)))
}

#[instrument(skip(state, auth))]
async fn delete_folder(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(folder_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.users.delete_folder(&auth.user_id, &folder_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AddPaperRequest {
    pub paper_id: String,
    #[serde(default)]
    pub paper_data: Option<Paper>,
}

#[instrument(skip(state, auth, request))]
async fn add_paper(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(folder_id): Path<String>,
    Json(request): Json<AddPaperRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if request.paper_id.trim().is_empty() {
        return Err(AppError::validation("paper_id must not be empty"));
    }
    // The snapshot lands in the paper cache first so the folder link
    // always resolves.
    if let Some(snapshot) = request.paper_data {
        state.papers.put(snapshot).await?;
    }
    state
        .users
        .add_paper(&auth.user_id, &folder_id, &request.paper_id)
        .await?;
    Ok(Json(json!({"status": "ok"})))
}

#[instrument(skip(state, auth))]
async fn remove_paper(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((folder_id, paper_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .users
        .remove_paper(&auth.user_id, &folder_id, &paper_id)
        .await?;
    Ok(Json(json!({"status": "ok"})))
}
