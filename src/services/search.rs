//! Search planning and execution over the upstream index.
//!
//! Both entry shapes (structured filters and natural-language text)
//! converge on a `WorksFilter`, one upstream call per page, and a
//! write-through into the paper cache. Identical in-flight requests are
//! coalesced, and a previously served fingerprint answers for the upstream
//! when it is rate limited or down.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::Paper;
use crate::openalex::filter::{SortOrder, WorksFilter, YearFilter};
use crate::openalex::{BibliographicIndex, EntityKind};
use crate::query::{ParsedQuery, QueryParser};
use crate::services::dedupe_papers;
use crate::store::{PaperStore, RequestCache};

/// Upstream author ids taken per resolved author name.
const AUTHOR_IDS_PER_NAME: u32 = 3;

pub const DEFAULT_PER_PAGE: u32 = 200;

type Flight = Shared<BoxFuture<'static, Result<Vec<Paper>, AppError>>>;

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub topics: Vec<String>,
    pub authors: Vec<String>,
    pub years: Vec<String>,
    pub institutions: Vec<String>,
    pub sort: SortOrder,
    pub page: u32,
    pub per_page: u32,
}

impl SearchRequest {
    pub fn from_parsed(
        parsed: ParsedQuery,
        raw_query: &str,
        sort: SortOrder,
        page: u32,
        per_page: u32,
    ) -> Self {
        let mut request = Self {
            topics: parsed.keywords,
            authors: parsed.authors,
            years: parsed.years,
            institutions: parsed.institutions,
            sort,
            page,
            per_page,
        };
        // A parser that extracted nothing still leaves the raw text as the
        // keyword set.
        if request.topics.is_empty() && request.authors.is_empty() {
            request.topics = vec![raw_query.trim().to_string()];
        }
        request
    }
}

pub struct SearchService {
    index: Arc<dyn BibliographicIndex>,
    papers: PaperStore,
    parser: Arc<dyn QueryParser>,
    request_cache: Arc<RequestCache>,
    inflight: Mutex<HashMap<String, Flight>>,
}

impl SearchService {
    pub fn new(
        index: Arc<dyn BibliographicIndex>,
        papers: PaperStore,
        parser: Arc<dyn QueryParser>,
        request_cache: Arc<RequestCache>,
    ) -> Self {
        Self {
            index,
            papers,
            parser,
            request_cache,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Structured search: resolve author names, build the filter, run one
    /// upstream page, dedupe, and write through the paper cache.
    pub async fn search(
        self: &Arc<Self>,
        principal: &str,
        request: SearchRequest,
    ) -> Result<Vec<Paper>, AppError> {
        let filter = self.plan(&request).await?;
        let key = RequestCache::fingerprint(&[
            principal,
            &filter.canonical(request.sort, request.page, request.per_page),
        ]);

        if let Some(cached) = self.request_cache.fresh(&key) {
            debug!(fingerprint = %key, "Serving search from request cache");
            return Ok(cached);
        }

        metrics::counter!("scholarfeed_searches_total").increment(1);
        self.coalesced_fetch(key, filter, request.sort, request.page, request.per_page)
            .await
    }

    /// Natural-language search: parse the text, then run the same plan.
    pub async fn search_query(
        self: &Arc<Self>,
        principal: &str,
        query: &str,
        sort: SortOrder,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Paper>, AppError> {
        let parsed = self.parser.parse(query).await;
        debug!(?parsed, query, "Parsed search query");
        let request = SearchRequest::from_parsed(parsed, query, sort, page, per_page);
        self.search(principal, request).await
    }

    /// Resolve the request into an upstream filter expression. Author
    /// names resolve to their top ids; names the author index does not
    /// know degrade to title/abstract tokens.
    pub(crate) async fn plan(&self, request: &SearchRequest) -> Result<WorksFilter, AppError> {
        let mut filter = WorksFilter::default();

        for topic in &request.topics {
            let topic = topic.trim();
            if !topic.is_empty() {
                filter.keyword_groups.push(topic.to_string());
            }
        }

        for name in &request.authors {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            match self
                .index
                .search_entities(EntityKind::Author, name, AUTHOR_IDS_PER_NAME)
                .await
            {
                Ok(hits) if !hits.is_empty() => {
                    filter.author_ids.extend(hits.into_iter().map(|hit| hit.id));
                }
                Ok(_) => {
                    debug!(name, "Author not found upstream, searching by name");
                    filter.keyword_groups.push(name.to_string());
                }
                Err(err) => {
                    warn!(name, error = %err, "Author resolution failed, searching by name");
                    filter.keyword_groups.push(name.to_string());
                }
            }
        }

        for year in &request.years {
            match year.parse::<YearFilter>() {
                Ok(parsed) => filter.years.push(parsed),
                Err(reason) => warn!(year, %reason, "Dropping unparseable year constraint"),
            }
        }

        filter.institutions.extend(
            request
                .institutions
                .iter()
                .map(|inst| inst.trim().to_string())
                .filter(|inst| !inst.is_empty()),
        );

        if filter.is_empty() {
            return Err(AppError::validation(
                "at least one of topics or authors must be provided",
            ));
        }
        Ok(filter)
    }

    /// Single-flight around the upstream call: concurrent identical
    /// fingerprints share one future. The map lock is only held to read or
    /// insert; awaiting happens outside it.
    async fn coalesced_fetch(
        self: &Arc<Self>,
        key: String,
        filter: WorksFilter,
        sort: SortOrder,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Paper>, AppError> {
        let (flight, leader) = {
            let mut inflight = self.inflight.lock().expect("inflight map lock");
            if let Some(existing) = inflight.get(&key) {
                (existing.clone(), false)
            } else {
                let index = self.index.clone();
                let papers = self.papers.clone();
                let cache = self.request_cache.clone();
                let flight_key = key.clone();
                let flight: Flight = async move {
                    match index.search_works(&filter, sort, page, per_page).await {
                        Ok(works_page) => {
                            let results = dedupe_papers(works_page.papers);
                            papers.put_many(results.clone()).await?;
                            cache.store(&flight_key, &results);
                            Ok(results)
                        }
                        Err(
                            err @ (AppError::UpstreamRateLimited { .. }
                            | AppError::UpstreamTransient { .. }
                            | AppError::UpstreamTimeout { .. }),
                        ) => {
                            // Degrade to the last answer this fingerprint saw.
                            if let Some(stale) = cache.any(&flight_key) {
                                warn!(error = %err, "Upstream unavailable, serving cached results");
                                Ok(stale)
                            } else {
                                Err(err)
                            }
                        }
                        Err(err) => Err(err),
                    }
                }
                .boxed()
                .shared();
                inflight.insert(key.clone(), flight.clone());
                (flight, true)
            }
        };

        let result = flight.await;
        if leader {
            self.inflight
                .lock()
                .expect("inflight map lock")
                .remove(&key);
        }
        result
    }
}
