use std::collections::HashSet;
use std::sync::Arc;

use crate::auth::{oauth::GoogleOAuth, SessionManager};
use crate::config::AppConfig;
use crate::models::Paper;
use crate::openalex::BibliographicIndex;
use crate::query::QueryParser;
use crate::store::{PaperStore, RequestCache, UserStore};

pub mod follows;
pub mod recommend;
pub mod search;

pub use follows::FollowFeedService;
pub use recommend::RecommendService;
pub use search::{SearchRequest, SearchService};

// A container for all services to be injected into routes
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub papers: PaperStore,
    pub users: UserStore,
    pub index: Arc<dyn BibliographicIndex>,
    pub parser: Arc<dyn QueryParser>,
    pub search: Arc<SearchService>,
    pub follow_feed: Arc<FollowFeedService>,
    pub recommend: Arc<RecommendService>,
    pub sessions: Arc<SessionManager>,
    pub oauth: Option<Arc<GoogleOAuth>>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        index: Arc<dyn BibliographicIndex>,
        parser: Arc<dyn QueryParser>,
        papers: PaperStore,
        users: UserStore,
    ) -> Self {
        let request_cache = Arc::new(RequestCache::new(config.request_cache_ttl()));
        let search = Arc::new(SearchService::new(
            index.clone(),
            papers.clone(),
            parser.clone(),
            request_cache.clone(),
        ));
        let follow_feed = Arc::new(FollowFeedService::new(
            index.clone(),
            papers.clone(),
            users.clone(),
            parser.clone(),
            search.clone(),
            request_cache.clone(),
        ));
        let recommend = Arc::new(RecommendService::new(
            index.clone(),
            papers.clone(),
            users.clone(),
            search.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            &config.auth.session_secret,
            config.auth.session_ttl_days,
        ));
        let oauth = match (&config.auth.google_client_id, &config.auth.google_client_secret) {
            (Some(id), Some(secret)) => {
                Some(Arc::new(GoogleOAuth::new(id.clone(), secret.clone())))
            }
            _ => None,
        };

        Self {
            config,
            papers,
            users,
            index,
            parser,
            search,
            follow_feed,
            recommend,
            sessions,
            oauth,
        }
    }
}

/// Keep-first dedupe by paper id; order of survivors is unchanged.
pub(crate) fn dedupe_papers(papers: Vec<Paper>) -> Vec<Paper> {
    let mut seen = HashSet::new();
    papers
        .into_iter()
        .filter(|paper| seen.insert(paper.paper_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let papers = vec![
            Paper::stub("W1", "first"),
            Paper::stub("W2", "second"),
            Paper::stub("W1", "duplicate"),
        ];
        let deduped = dedupe_papers(papers);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "first");
    }
}
