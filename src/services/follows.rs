//! The "following" feed: fan out over the user's follow set, merge by
//! recency, dedupe, cap.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::{EntityType, Follow, Paper};
use crate::openalex::filter::SortOrder;
use crate::openalex::{BibliographicIndex, EntityKind};
use crate::query::QueryParser;
use crate::services::dedupe_papers;
use crate::services::search::{SearchRequest, SearchService};
use crate::store::{PaperStore, RequestCache, UserStore};

/// Simultaneous per-entity fetches.
const FANOUT_CONCURRENCY: usize = 8;

pub const DEFAULT_PER_ENTITY: u32 = 50;
pub const DEFAULT_TOTAL: usize = 200;

pub struct FollowFeedService {
    index: Arc<dyn BibliographicIndex>,
    papers: PaperStore,
    users: UserStore,
    parser: Arc<dyn QueryParser>,
    search: Arc<SearchService>,
    request_cache: Arc<RequestCache>,
}

impl FollowFeedService {
    pub fn new(
        index: Arc<dyn BibliographicIndex>,
        papers: PaperStore,
        users: UserStore,
        parser: Arc<dyn QueryParser>,
        search: Arc<SearchService>,
        request_cache: Arc<RequestCache>,
    ) -> Self {
        Self {
            index,
            papers,
            users,
            parser,
            search,
            request_cache,
        }
    }

    /// Papers from every followed entity, newest first. The feed succeeds
    /// as long as one fan-out task does; with every task down, the last
    /// assembled feed answers instead.
    pub async fn followed_papers(
        &self,
        user_id: &str,
        limit_per_entity: u32,
        total_limit: usize,
    ) -> Result<Vec<Paper>, AppError> {
        let follows = self.users.list_follows(user_id).await?;
        if follows.is_empty() {
            return Ok(Vec::new());
        }

        let mut edge_keys: Vec<String> = follows
            .iter()
            .map(|f| format!("{}:{}", f.entity_type, f.entity_id))
            .collect();
        edge_keys.sort();
        let key = RequestCache::fingerprint(&[
            "follows",
            user_id,
            &limit_per_entity.to_string(),
            &total_limit.to_string(),
            &edge_keys.join(","),
        ]);

        debug!(user_id, count = follows.len(), "Fanning out over follows");
        let results: Vec<Result<Vec<Paper>, AppError>> = stream::iter(follows)
            .map(|follow| {
                metrics::counter!("scholarfeed_fanout_tasks_total").increment(1);
                self.fetch_for_follow(user_id, follow, limit_per_entity)
            })
            .buffer_unordered(FANOUT_CONCURRENCY)
            .collect()
            .await;

        let mut collected = Vec::new();
        let mut succeeded = 0usize;
        for result in results {
            match result {
                Ok(papers) => {
                    succeeded += 1;
                    collected.extend(papers);
                }
                Err(err) => {
                    warn!(user_id, error = %err, "Follow fan-out task failed");
                }
            }
        }

        if succeeded == 0 {
            if let Some(stale) = self.request_cache.any(&key) {
                warn!(user_id, "All fan-out tasks failed, serving cached feed");
                return Ok(stale);
            }
            return Err(AppError::UpstreamTransient {
                message: "all followed-entity fetches failed".to_string(),
            });
        }

        let mut merged = dedupe_papers(collected);
        merged.sort_by(|a, b| {
            b.year
                .cmp(&a.year)
                .then_with(|| b.paper_id.cmp(&a.paper_id))
        });
        merged.truncate(total_limit);

        self.papers.put_many(merged.clone()).await?;
        self.request_cache.store(&key, &merged);
        Ok(merged)
    }

    async fn fetch_for_follow(
        &self,
        user_id: &str,
        follow: Follow,
        limit: u32,
    ) -> Result<Vec<Paper>, AppError> {
        match follow.entity_type {
            EntityType::Custom => {
                // The raw query text travels in the edge; parse it fresh and
                // run it through the regular search plan.
                let query = follow.openalex_id.as_str();
                let parsed = self.parser.parse(query).await;
                let request =
                    SearchRequest::from_parsed(parsed, query, SortOrder::Recency, 1, limit);
                self.search.search(user_id, request).await
            }
            other => {
                let kind = EntityKind::from_entity_type(other)
                    .expect("non-custom follows map to an upstream entity kind");
                self.index
                    .works_by_entity(kind, &follow.entity_id, limit)
                    .await
            }
        }
    }
}
