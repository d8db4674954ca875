//! Shared test fixtures: a scriptable in-memory upstream and state builders.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scholarfeed::auth::SESSION_COOKIE;
use scholarfeed::config::AppConfig;
use scholarfeed::errors::AppError;
use scholarfeed::models::{EntityHit, Paper};
use scholarfeed::openalex::filter::{SortOrder, WorksFilter};
use scholarfeed::openalex::{BibliographicIndex, EntityKind, WorksPage};
use scholarfeed::query::rules::RuleQueryParser;
use scholarfeed::services::AppState;
use scholarfeed::store::{PaperStore, UserStore};

/// Scriptable stand-in for the bibliographic index.
#[derive(Default)]
pub struct MockIndex {
    /// Works-search results keyed by page number.
    pub pages: Mutex<HashMap<u32, Vec<Paper>>>,
    /// Works per followed entity id.
    pub entity_works: Mutex<HashMap<String, Vec<Paper>>>,
    /// Entity-search hits keyed by query string.
    pub entity_hits: Mutex<HashMap<String, Vec<EntityHit>>>,
    /// Related works keyed by paper id.
    pub related: Mutex<HashMap<String, Vec<Paper>>>,
    /// Individually fetchable works.
    pub works: Mutex<HashMap<String, Paper>>,
    /// Entity ids whose works fetch fails.
    pub failing_entities: Mutex<HashSet<String>>,
    /// When set, every works search fails with a clone of this error.
    pub fail_search: Mutex<Option<AppError>>,
    pub search_calls: AtomicUsize,
    pub last_filter: Mutex<Option<WorksFilter>>,
    /// Artificial latency for works searches, for coalescing tests.
    pub search_delay_ms: AtomicU64,
}

impl MockIndex {
    pub fn set_page(&self, page: u32, papers: Vec<Paper>) {
        self.pages.lock().unwrap().insert(page, papers);
    }

    pub fn set_entity_works(&self, entity_id: &str, papers: Vec<Paper>) {
        self.entity_works
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), papers);
    }

    pub fn set_entity_hits(&self, query: &str, hits: Vec<EntityHit>) {
        self.entity_hits
            .lock()
            .unwrap()
            .insert(query.to_string(), hits);
    }

    pub fn set_related(&self, paper_id: &str, papers: Vec<Paper>) {
        self.related
            .lock()
            .unwrap()
            .insert(paper_id.to_string(), papers);
    }

    pub fn add_work(&self, paper: Paper) {
        self.works
            .lock()
            .unwrap()
            .insert(paper.paper_id.clone(), paper);
    }

    pub fn fail_entity(&self, entity_id: &str) {
        self.failing_entities
            .lock()
            .unwrap()
            .insert(entity_id.to_string());
    }

    pub fn fail_searches_with(&self, error: AppError) {
        *self.fail_search.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl BibliographicIndex for MockIndex {
    async fn search_works(
        &self,
        filter: &WorksFilter,
        _sort: SortOrder,
        page: u32,
        _per_page: u32,
    ) -> Result<WorksPage, AppError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_filter.lock().unwrap() = Some(filter.clone());

        let delay = self.search_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if let Some(error) = self.fail_search.lock().unwrap().clone() {
            return Err(error);
        }

        let pages = self.pages.lock().unwrap();
        let papers = pages.get(&page).cloned().unwrap_or_default();
        let has_more = pages.contains_key(&(page + 1));
        Ok(WorksPage { papers, has_more })
    }

    async fn fetch_work(&self, paper_id: &str) -> Result<Option<Paper>, AppError> {
        Ok(self.works.lock().unwrap().get(paper_id).cloned())
    }

    async fn fetch_works_by_ids(&self, ids: &[String]) -> Result<Vec<Paper>, AppError> {
        let works = self.works.lock().unwrap();
        Ok(ids.iter().filter_map(|id| works.get(id).cloned()).collect())
    }

    async fn search_entities(
        &self,
        _kind: EntityKind,
        query: &str,
        limit: u32,
    ) -> Result<Vec<EntityHit>, AppError> {
        let hits = self
            .entity_hits
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        Ok(hits.into_iter().take(limit as usize).collect())
    }

    async fn works_by_entity(
        &self,
        _kind: EntityKind,
        entity_id: &str,
        limit: u32,
    ) -> Result<Vec<Paper>, AppError> {
        if self.failing_entities.lock().unwrap().contains(entity_id) {
            return Err(AppError::UpstreamTransient {
                message: format!("mock failure for {entity_id}"),
            });
        }
        let works = self
            .entity_works
            .lock()
            .unwrap()
            .get(entity_id)
            .cloned()
            .unwrap_or_default();
        Ok(works.into_iter().take(limit as usize).collect())
    }

    async fn related_works(&self, paper_id: &str, limit: u32) -> Result<Vec<Paper>, AppError> {
        let related = self
            .related
            .lock()
            .unwrap()
            .get(paper_id)
            .cloned()
            .unwrap_or_default();
        Ok(related.into_iter().take(limit as usize).collect())
    }
}

pub fn paper(id: &str, title: &str, year: Option<i32>) -> Paper {
    let mut paper = Paper::stub(id, title);
    paper.year = year;
    paper
}

pub fn author_hit(id: &str, name: &str) -> EntityHit {
    EntityHit {
        id: id.to_string(),
        openalex_id: format!("https://openalex.org/{id}"),
        name: name.to_string(),
        works_count: 10,
        orcid: None,
        country_code: None,
        level: None,
        issn: None,
    }
}

pub fn test_state(mock: Arc<MockIndex>) -> AppState {
    let config = Arc::new(AppConfig::build().expect("test config"));
    AppState::new(
        config,
        mock,
        Arc::new(RuleQueryParser::new()),
        PaperStore::in_memory(),
        UserStore::in_memory(),
    )
}

/// Create the user and mint a Cookie header value for it.
pub async fn login(state: &AppState, user_id: &str) -> String {
    let user = state
        .users
        .upsert_user(user_id, &format!("{user_id}@example.com"), None, None)
        .await
        .expect("upsert test user");
    let token = state.sessions.issue(&user).expect("issue session");
    format!("{SESSION_COOKIE}={token}")
}
