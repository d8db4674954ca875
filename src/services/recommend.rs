//! The "for you" feed: candidates from the declared profile plus works
//! related to recent likes, minus everything already acted on.

use chrono::Datelike;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::Paper;
use crate::openalex::filter::SortOrder;
use crate::openalex::BibliographicIndex;
use crate::services::dedupe_papers;
use crate::services::search::{SearchRequest, SearchService};
use crate::store::{PaperStore, UserStore};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// How many recent likes seed the related-works expansion.
const MAX_RECENT_LIKES: usize = 10;
/// Related works pulled per liked paper.
const RELATED_PER_LIKE: u32 = 5;
/// Candidates requested from the profile search.
const PROFILE_PAGE_SIZE: u32 = 100;
const RELATED_CONCURRENCY: usize = 8;

// Ranking weights; recency ramps down linearly over ten years.
const W_TOPIC: f64 = 3.0;
const W_AUTHOR: f64 = 2.0;
const W_RECENCY: f64 = 1.0;

pub struct RecommendService {
    index: Arc<dyn BibliographicIndex>,
    papers: PaperStore,
    users: UserStore,
    search: Arc<SearchService>,
}

impl RecommendService {
    pub fn new(
        index: Arc<dyn BibliographicIndex>,
        papers: PaperStore,
        users: UserStore,
        search: Arc<SearchService>,
    ) -> Self {
        Self {
            index,
            papers,
            users,
            search,
        }
    }

    /// An empty profile with no likes yields an empty list, not an error.
    pub async fn recommendations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Paper>, AppError> {
        let doc = self.users.read(user_id).await?;
        let profile = doc.profile.clone();
        let summary = doc.feedback_summary();
        let seen: HashSet<String> = summary
            .liked
            .iter()
            .chain(summary.disliked.iter())
            .cloned()
            .collect();

        let recent_likes = self.users.recent_likes(user_id, MAX_RECENT_LIKES).await?;
        if profile.is_empty() && recent_likes.is_empty() {
            debug!(user_id, "No profile and no likes, nothing to recommend");
            return Ok(Vec::new());
        }

        let mut candidates: Vec<Paper> = Vec::new();
        let mut first_error: Option<AppError> = None;

        if !profile.is_empty() {
            let request = SearchRequest {
                topics: profile.topics.clone(),
                authors: profile.authors.clone(),
                sort: SortOrder::Recency,
                page: 1,
                per_page: PROFILE_PAGE_SIZE,
                ..Default::default()
            };
            match self.search.search(user_id, request).await {
                Ok(papers) => candidates.extend(papers),
                Err(err) => {
                    warn!(user_id, error = %err, "Profile search failed");
                    first_error = Some(err);
                }
            }
        }

        let related: Vec<Result<Vec<Paper>, AppError>> = stream::iter(recent_likes)
            .map(|paper_id| {
                let index = self.index.clone();
                async move { index.related_works(&paper_id, RELATED_PER_LIKE).await }
            })
            .buffer_unordered(RELATED_CONCURRENCY)
            .collect()
            .await;
        for result in related {
            match result {
                Ok(papers) => candidates.extend(papers),
                Err(err) => {
                    warn!(user_id, error = %err, "Related-works fetch failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        if candidates.is_empty() {
            return match first_error {
                Some(err) => Err(err),
                None => Ok(Vec::new()),
            };
        }

        let mut ranked: Vec<Paper> = dedupe_papers(candidates)
            .into_iter()
            .filter(|paper| !seen.contains(&paper.paper_id))
            .collect();

        let current_year = chrono::Utc::now().year();
        ranked.sort_by(|a, b| {
            score(b, &profile.topics, &profile.authors, current_year)
                .partial_cmp(&score(a, &profile.topics, &profile.authors, current_year))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.citation_count.cmp(&a.citation_count))
                .then_with(|| a.paper_id.cmp(&b.paper_id))
        });
        ranked.truncate(limit);

        self.papers.put_many(ranked.clone()).await?;
        Ok(ranked)
    }
}

fn score(paper: &Paper, topics: &[String], authors: &[String], current_year: i32) -> f64 {
    let haystack = format!(
        "{} {}",
        paper.title.to_lowercase(),
        paper.abstract_text.as_deref().unwrap_or("").to_lowercase()
    );

    let topic_match = if topics.is_empty() {
        0.0
    } else {
        let hits = topics
            .iter()
            .filter(|topic| haystack.contains(&topic.to_lowercase()))
            .count();
        hits as f64 / topics.len() as f64
    };

    let author_match = if authors.is_empty() {
        0.0
    } else {
        let wanted: Vec<String> = authors.iter().map(|a| a.to_lowercase()).collect();
        let matched = paper
            .authors
            .iter()
            .any(|author| wanted.contains(&author.name.to_lowercase()));
        if matched {
            1.0
        } else {
            0.0
        }
    };

    let recency = paper
        .year
        .map(|year| {
            let age = (current_year - year) as f64;
            (1.0 - age / 10.0).max(0.0)
        })
        .unwrap_or(0.0);

    W_TOPIC * topic_match + W_AUTHOR * author_match + W_RECENCY * recency
}
