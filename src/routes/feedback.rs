//! Like/dislike endpoints.
//!
//! A snapshot in the body is upserted into the paper cache before the
//! user-side mutation commits, so feedback always resolves to renderable
//! metadata.

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{FeedbackSummary, Paper};
use crate::services::AppState;
use crate::store::FeedbackScope;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_feedback).delete(clear_all))
        .route("/like", post(like_paper))
        .route("/like/{paper_id}", delete(unlike_paper))
        .route("/dislike", post(dislike_paper))
        .route("/dislike/{paper_id}", delete(undislike_paper))
        .route("/liked", delete(clear_liked))
        .route("/disliked", delete(clear_disliked))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub paper_id: String,
    #[serde(default)]
    pub paper_data: Option<Paper>,
}

fn status_ok() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

#[instrument(skip(state, auth))]
async fn get_feedback(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<FeedbackSummary>, AppError> {
    Ok(Json(state.users.feedback_summary(&auth.user_id).await?))
}

#[instrument(skip(state, auth, body))]
async fn like_paper(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<FeedbackBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.paper_id.trim().is_empty() {
        return Err(AppError::validation("paper_id must not be empty"));
    }
    if let Some(snapshot) = body.paper_data {
        state.papers.put(snapshot).await?;
    }
    state.users.like(&auth.user_id, &body.paper_id).await?;
    Ok(status_ok())
}

#[instrument(skip(state, auth))]
async fn unlike_paper(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(paper_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.unlike(&auth.user_id, &paper_id).await?;
    Ok(status_ok())
}

#[instrument(skip(state, auth, body))]
async fn dislike_paper(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<FeedbackBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.paper_id.trim().is_empty() {
        return Err(AppError::validation("paper_id must not be empty"));
    }
    if let Some(snapshot) = body.paper_data {
        state.papers.put(snapshot).await?;
    }
    state.users.dislike(&auth.user_id, &body.paper_id).await?;
    Ok(status_ok())
}

#[instrument(skip(state, auth))]
async fn undislike_paper(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(paper_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.undislike(&auth.user_id, &paper_id).await?;
    Ok(status_ok())
}

#[instrument(skip(state, auth))]
async fn clear_all(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .users
        .clear_feedback(&auth.user_id, FeedbackScope::All)
        .await?;
    Ok(status_ok())
}

#[instrument(skip(state, auth))]
async fn clear_liked(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .users
        .clear_feedback(&auth.user_id, FeedbackScope::Liked)
        .await?;
    Ok(status_ok())
}

#[instrument(skip(state, auth))]
async fn clear_disliked(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .users
        .clear_feedback(&auth.user_id, FeedbackScope::Disliked)
        .await?;
    Ok(status_ok())
}
