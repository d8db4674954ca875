//! Paper search, retrieval, and recommendation endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::instrument;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::Paper;
use crate::openalex::filter::SortOrder;
use crate::query::ParsedQuery;
use crate::routes::{split_csv, validate_limit, validate_page, validate_per_page};
use crate::services::recommend::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::services::search::{SearchRequest, DEFAULT_PER_PAGE};
use crate::services::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", get(search_papers))
        .route("/search/query", get(search_by_query))
        .route("/recommendations", get(recommendations))
        .route("/parse-query", get(parse_query))
        .route("/bulk/by-ids", get(papers_by_ids))
        .route("/{paper_id}", get(get_paper))
        .route("/{paper_id}/similar", get(similar_papers))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    topics: Option<String>,
    authors: Option<String>,
    sort_by: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

fn parse_sort(sort_by: Option<&str>) -> Result<SortOrder, AppError> {
    match sort_by {
        None => Ok(SortOrder::Recency),
        Some(value) => value
            .parse::<SortOrder>()
            .map_err(AppError::validation),
    }
}

#[instrument(skip(state, auth))]
async fn search_papers(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Paper>>, AppError> {
    let topics = split_csv(params.topics.as_deref());
    let authors = split_csv(params.authors.as_deref());
    if topics.is_empty() && authors.is_empty() {
        return Err(AppError::validation(
            "at least one of 'topics' or 'authors' must be provided",
        ));
    }

    let request = SearchRequest {
        topics,
        authors,
        sort: parse_sort(params.sort_by.as_deref())?,
        page: validate_page(params.page)?,
        per_page: validate_per_page(params.per_page, DEFAULT_PER_PAGE)?,
        ..Default::default()
    };

    let papers = state.search.search(&auth.user_id, request).await?;
    Ok(Json(papers))
}

#[derive(Debug, Deserialize)]
pub struct QuerySearchParams {
    q: String,
    sort_by: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

#[instrument(skip(state, auth))]
async fn search_by_query(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<QuerySearchParams>,
) -> Result<Json<Vec<Paper>>, AppError> {
    if params.q.trim().is_empty() {
        return Err(AppError::validation("query string cannot be empty"));
    }

    let papers = state
        .search
        .search_query(
            &auth.user_id,
            params.q.trim(),
            parse_sort(params.sort_by.as_deref())?,
            validate_page(params.page)?,
            validate_per_page(params.per_page, DEFAULT_PER_PAGE)?,
        )
        .await?;
    Ok(Json(papers))
}

/// Cache-first single-paper lookup; misses fall through to the upstream
/// and are cached for the next reader.
#[instrument(skip(state, _auth))]
async fn get_paper(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(paper_id): Path<String>,
) -> Result<Json<Paper>, AppError> {
    if let Some(paper) = state.papers.get(&paper_id).await {
        state.papers.touch(&paper_id).await;
        return Ok(Json(paper));
    }

    match state.index.fetch_work(&paper_id).await? {
        Some(paper) => {
            state.papers.put(paper.clone()).await?;
            Ok(Json(paper))
        }
        None => Err(AppError::not_found("paper", &paper_id)),
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkParams {
    paper_ids: String,
}

/// Bulk lookup; ids unknown to both the cache and the upstream are
/// omitted from the response.
#[instrument(skip(state, _auth))]
async fn papers_by_ids(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(params): Query<BulkParams>,
) -> Result<Json<Vec<Paper>>, AppError> {
    let ids = split_csv(Some(&params.paper_ids));
    if ids.is_empty() {
        return Err(AppError::validation("at least one paper ID must be provided"));
    }

    let cached = state.papers.get_many(&ids).await;
    let mut by_id: HashMap<String, Paper> = cached
        .into_iter()
        .map(|paper| (paper.paper_id.clone(), paper))
        .collect();

    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !by_id.contains_key(*id))
        .cloned()
        .collect();
    if !missing.is_empty() {
        let fetched = state.index.fetch_works_by_ids(&missing).await?;
        state.papers.put_many(fetched.clone()).await?;
        by_id.extend(fetched.into_iter().map(|p| (p.paper_id.clone(), p)));
    }

    let papers: Vec<Paper> = ids.iter().filter_map(|id| by_id.remove(id)).collect();
    Ok(Json(papers))
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    limit: Option<u32>,
}

#[instrument(skip(state, _auth))]
async fn similar_papers(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(paper_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<Paper>>, AppError> {
    let limit = validate_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT)?;
    let papers = state.index.related_works(&paper_id, limit as u32).await?;
    state.papers.put_many(papers.clone()).await?;
    Ok(Json(papers))
}

#[instrument(skip(state, auth))]
async fn recommendations(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<Paper>>, AppError> {
    let limit = validate_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT)?;
    let papers = state.recommend.recommendations(&auth.user_id, limit).await?;
    Ok(Json(papers))
}

#[derive(Debug, Deserialize)]
pub struct ParseQueryParams {
    q: String,
}

#[instrument(skip(state, _auth))]
async fn parse_query(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(params): Query<ParseQueryParams>,
) -> Result<Json<ParsedQuery>, AppError> {
    if params.q.trim().is_empty() {
        return Err(AppError::validation("query string cannot be empty"));
    }
    Ok(Json(state.parser.parse(params.q.trim()).await))
}
