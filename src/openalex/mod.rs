//! Client for the OpenAlex bibliographic index.
//!
//! Stateless adapter: works search, by-id and bulk-by-ids fetch, entity
//! search, works-by-entity and related-works listing. Advertises a mailto
//! identity for polite-pool quota, rate-limits process-wide, and retries
//! transient failures with exponential backoff.

pub mod filter;
pub mod text;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::Rng;
use reqwest::StatusCode;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::OpenAlexConfig;
use crate::errors::AppError;
use crate::models::{EntityHit, EntityType, Paper, PaperAuthor};
use filter::{SortOrder, WorksFilter};

/// Fields fetched for every work; exactly what a paper card needs.
const WORK_SELECT: &str =
    "id,title,abstract_inverted_index,primary_location,doi,publication_year,cited_by_count,authorships";

/// Upstream cap on ids per bulk filter request.
const BULK_CHUNK: usize = 100;

/// Concurrent chunk fetches in a bulk request.
const BULK_CONCURRENCY: usize = 4;

const MAX_AUTHORS_PER_PAPER: usize = 10;

/// One page of a works search.
#[derive(Debug, Clone, Default)]
pub struct WorksPage {
    pub papers: Vec<Paper>,
    pub has_more: bool,
}

/// Entity kinds addressable in the upstream index (follows of kind
/// `custom` never reach the index directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Author,
    Institution,
    Topic,
    Source,
}

impl EntityKind {
    pub fn from_entity_type(entity_type: EntityType) -> Option<Self> {
        match entity_type {
            EntityType::Author => Some(EntityKind::Author),
            EntityType::Institution => Some(EntityKind::Institution),
            EntityType::Topic => Some(EntityKind::Topic),
            EntityType::Source => Some(EntityKind::Source),
            EntityType::Custom => None,
        }
    }

    fn api_path(&self) -> &'static str {
        match self {
            EntityKind::Author => "/authors",
            EntityKind::Institution => "/institutions",
            // Topics are concepts upstream.
            EntityKind::Topic => "/concepts",
            EntityKind::Source => "/sources",
        }
    }

    fn works_filter_key(&self) -> &'static str {
        match self {
            EntityKind::Author => "authorships.author.id",
            EntityKind::Institution => "authorships.institutions.id",
            EntityKind::Topic => "concepts.id",
            EntityKind::Source => "primary_location.source.id",
        }
    }

    fn select_fields(&self) -> &'static str {
        match self {
            EntityKind::Author => "id,display_name,works_count,orcid",
            EntityKind::Institution => "id,display_name,works_count,country_code",
            EntityKind::Topic => "id,display_name,works_count,level",
            EntityKind::Source => "id,display_name,works_count,issn",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authors" => Ok(EntityKind::Author),
            "institutions" => Ok(EntityKind::Institution),
            "topics" => Ok(EntityKind::Topic),
            "sources" => Ok(EntityKind::Source),
            other => Err(format!(
                "invalid entity kind '{other}'; expected authors, institutions, topics or sources"
            )),
        }
    }
}

/// Read surface of the bibliographic index. Object-safe so engines can be
/// exercised against a test double.
#[async_trait]
pub trait BibliographicIndex: Send + Sync {
    async fn search_works(
        &self,
        filter: &WorksFilter,
        sort: SortOrder,
        page: u32,
        per_page: u32,
    ) -> Result<WorksPage, AppError>;

    async fn fetch_work(&self, paper_id: &str) -> Result<Option<Paper>, AppError>;

    /// Bulk fetch; input order is not preserved and missing ids are
    /// silently dropped. A failed chunk drops only its own subset.
    async fn fetch_works_by_ids(&self, ids: &[String]) -> Result<Vec<Paper>, AppError>;

    async fn search_entities(
        &self,
        kind: EntityKind,
        query: &str,
        limit: u32,
    ) -> Result<Vec<EntityHit>, AppError>;

    async fn works_by_entity(
        &self,
        kind: EntityKind,
        entity_id: &str,
        limit: u32,
    ) -> Result<Vec<Paper>, AppError>;

    async fn related_works(&self, paper_id: &str, limit: u32) -> Result<Vec<Paper>, AppError>;
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct OpenAlexClient {
    http: reqwest::Client,
    base_url: String,
    mailto: Option<String>,
    limiter: DirectLimiter,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAlexClient {
    pub fn new(config: &OpenAlexConfig) -> Result<Self, AppError> {
        let user_agent = match &config.mailto {
            Some(email) => format!(
                "{}/{} (mailto:{})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                email
            ),
            None => format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        };

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::internal(format!("failed to create HTTP client: {e}")))?;

        let per_second = NonZeroU32::new(config.requests_per_second.max(1))
            .expect("max(1) keeps the quota non-zero");
        let limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            mailto: config.mailto.clone(),
            limiter,
            max_retries: config.max_retries.max(1),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Strip the id URL prefix and ensure the work id carries its `W`.
    pub fn normalize_work_id(paper_id: &str) -> String {
        let id = paper_id.rsplit('/').next().unwrap_or(paper_id);
        if id.starts_with('W') || id.starts_with('w') {
            id.to_uppercase()
        } else {
            format!("W{id}")
        }
    }

    fn short_entity_id(id: &str) -> String {
        id.rsplit('/').next().unwrap_or(id).to_string()
    }

    /// GET with rate limiting and bounded retries. 429 and 5xx responses
    /// and connect/timeout errors count against the attempt cap; other
    /// non-2xx statuses are returned to the caller unretried.
    async fn request(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.limiter.until_ready().await;
            metrics::counter!("scholarfeed_upstream_requests_total").increment(1);

            let mut request = self.http.get(&url).query(params);
            if let Some(email) = &self.mailto {
                request = request.query(&[("mailto", email.as_str())]);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable {
                        return Ok(response);
                    }

                    let retry_after = retry_after_secs(&response);
                    if attempt >= self.max_retries {
                        return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                            AppError::UpstreamRateLimited {
                                retry_after_secs: retry_after,
                            }
                        } else {
                            AppError::UpstreamTransient {
                                message: format!("upstream returned {status} for {path}"),
                            }
                        });
                    }

                    let delay = backoff_delay(attempt, retry_after);
                    metrics::counter!("scholarfeed_upstream_retries_total").increment(1);
                    warn!(
                        %status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        path,
                        "Upstream error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let transient = err.is_timeout() || err.is_connect() || err.is_request();
                    if !transient || attempt >= self.max_retries {
                        if err.is_timeout() {
                            return Err(AppError::UpstreamTimeout {
                                timeout_secs: self.timeout_secs,
                            });
                        }
                        return Err(err.into());
                    }
                    let delay = backoff_delay(attempt, None);
                    metrics::counter!("scholarfeed_upstream_retries_total").increment(1);
                    warn!(error = %err, attempt, path, "Upstream request failed, backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, AppError> {
        let response = self.request(path, params).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamTransient {
                message: format!("upstream returned {status} for {path}"),
            });
        }
        response.json().await.map_err(|e| AppError::UpstreamTransient {
            message: format!("failed to decode upstream response for {path}: {e}"),
        })
    }

    async fn fetch_chunk(&self, ids: Vec<String>) -> Result<Vec<Paper>, AppError> {
        let params = vec![
            ("filter".to_string(), format!("openalex_id:{}", ids.join("|"))),
            ("per-page".to_string(), ids.len().to_string()),
            ("select".to_string(), WORK_SELECT.to_string()),
        ];
        let envelope: WorksEnvelope = self.request_json("/works", &params).await?;
        Ok(convert_works(envelope.results))
    }
}

#[async_trait]
impl BibliographicIndex for OpenAlexClient {
    async fn search_works(
        &self,
        filter: &WorksFilter,
        sort: SortOrder,
        page: u32,
        per_page: u32,
    ) -> Result<WorksPage, AppError> {
        let mut params = filter.to_query(sort, page, per_page);
        params.push(("select".to_string(), WORK_SELECT.to_string()));

        let envelope: WorksEnvelope = self.request_json("/works", &params).await?;
        let total = envelope.meta.count;
        let papers = convert_works(envelope.results);
        debug!(count = papers.len(), total, page, "Works search returned");

        Ok(WorksPage {
            papers,
            has_more: total > page as u64 * per_page as u64,
        })
    }

    async fn fetch_work(&self, paper_id: &str) -> Result<Option<Paper>, AppError> {
        let id = Self::normalize_work_id(paper_id);
        let params = vec![("select".to_string(), WORK_SELECT.to_string())];
        let response = self.request(&format!("/works/{id}"), &params).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamTransient {
                message: format!("upstream returned {status} for /works/{id}"),
            });
        }

        let work: WorkRecord = response.json().await.map_err(|e| AppError::UpstreamTransient {
            message: format!("failed to decode work {id}: {e}"),
        })?;
        Ok(convert_work(work))
    }

    async fn fetch_works_by_ids(&self, ids: &[String]) -> Result<Vec<Paper>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let chunks: Vec<Vec<String>> = ids
            .iter()
            .map(|id| Self::normalize_work_id(id))
            .collect::<Vec<_>>()
            .chunks(BULK_CHUNK)
            .map(|chunk| chunk.to_vec())
            .collect();

        let results: Vec<Result<Vec<Paper>, AppError>> = stream::iter(chunks)
            .map(|chunk| self.fetch_chunk(chunk))
            .buffer_unordered(BULK_CONCURRENCY)
            .collect()
            .await;

        let mut papers = Vec::new();
        for result in results {
            match result {
                Ok(chunk) => papers.extend(chunk),
                // A lost chunk drops its subset only; the rest is served.
                Err(err) => warn!(error = %err, "Bulk chunk fetch failed"),
            }
        }
        Ok(papers)
    }

    async fn search_entities(
        &self,
        kind: EntityKind,
        query: &str,
        limit: u32,
    ) -> Result<Vec<EntityHit>, AppError> {
        let params = vec![
            ("search".to_string(), query.to_string()),
            ("per-page".to_string(), limit.to_string()),
            ("select".to_string(), kind.select_fields().to_string()),
        ];
        let envelope: EntitiesEnvelope = self.request_json(kind.api_path(), &params).await?;

        Ok(envelope
            .results
            .into_iter()
            .filter_map(|record| {
                let openalex_id = record.id?;
                Some(EntityHit {
                    id: Self::short_entity_id(&openalex_id),
                    openalex_id,
                    name: record.display_name.unwrap_or_default(),
                    works_count: record.works_count.unwrap_or(0),
                    orcid: record.orcid,
                    country_code: record.country_code,
                    level: record.level,
                    issn: record.issn,
                })
            })
            .collect())
    }

    async fn works_by_entity(
        &self,
        kind: EntityKind,
        entity_id: &str,
        limit: u32,
    ) -> Result<Vec<Paper>, AppError> {
        let id = Self::short_entity_id(entity_id);
        let params = vec![
            (
                "filter".to_string(),
                format!("{}:{id}", kind.works_filter_key()),
            ),
            ("sort".to_string(), "publication_date:desc".to_string()),
            ("per-page".to_string(), limit.to_string()),
            ("page".to_string(), "1".to_string()),
            ("select".to_string(), WORK_SELECT.to_string()),
        ];
        let envelope: WorksEnvelope = self.request_json("/works", &params).await?;
        Ok(convert_works(envelope.results))
    }

    async fn related_works(&self, paper_id: &str, limit: u32) -> Result<Vec<Paper>, AppError> {
        let id = Self::normalize_work_id(paper_id);
        let params = vec![("select".to_string(), "id,related_works".to_string())];
        let response = self.request(&format!("/works/{id}"), &params).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamTransient {
                message: format!("upstream returned {status} for /works/{id}"),
            });
        }

        let detail: RelatedRecord = response.json().await.map_err(|e| AppError::UpstreamTransient {
            message: format!("failed to decode related works for {id}: {e}"),
        })?;

        let related_ids: Vec<String> = detail
            .related_works
            .unwrap_or_default()
            .into_iter()
            .take(limit as usize)
            .map(|url| Self::normalize_work_id(&url))
            .collect();

        if related_ids.is_empty() {
            debug!(paper_id = %id, "No related works listed");
            return Ok(Vec::new());
        }

        self.fetch_works_by_ids(&related_ids).await
    }
}

fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

/// Exponential backoff with jitter, floored by any upstream Retry-After.
fn backoff_delay(attempt: u32, retry_after: Option<u64>) -> Duration {
    let exp = Duration::from_millis(1000u64.saturating_mul(1 << (attempt - 1).min(6)));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
    let hinted = retry_after.map(Duration::from_secs).unwrap_or(Duration::ZERO);
    exp.max(hinted) + jitter
}

// ===== Upstream wire types =====

#[derive(Debug, Deserialize)]
struct WorksEnvelope {
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    results: Vec<WorkRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct WorkRecord {
    id: Option<String>,
    title: Option<String>,
    #[serde(default)]
    abstract_inverted_index: Option<serde_json::Value>,
    #[serde(default)]
    primary_location: Option<LocationRecord>,
    doi: Option<String>,
    publication_year: Option<i32>,
    cited_by_count: Option<i64>,
    #[serde(default)]
    authorships: Vec<AuthorshipRecord>,
}

#[derive(Debug, Deserialize)]
struct LocationRecord {
    #[serde(default)]
    source: Option<SourceRecord>,
    landing_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceRecord {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorshipRecord {
    #[serde(default)]
    author: Option<AuthorRecord>,
}

#[derive(Debug, Deserialize)]
struct AuthorRecord {
    id: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntitiesEnvelope {
    #[serde(default)]
    results: Vec<EntityRecord>,
}

#[derive(Debug, Deserialize)]
struct EntityRecord {
    id: Option<String>,
    display_name: Option<String>,
    works_count: Option<u64>,
    #[serde(default)]
    orcid: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    level: Option<u32>,
    #[serde(default)]
    issn: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RelatedRecord {
    #[serde(default)]
    related_works: Option<Vec<String>>,
}

fn convert_works(records: Vec<WorkRecord>) -> Vec<Paper> {
    records.into_iter().filter_map(convert_work).collect()
}

fn convert_work(work: WorkRecord) -> Option<Paper> {
    let paper_id = OpenAlexClient::short_entity_id(work.id.as_deref()?);
    if paper_id.is_empty() {
        return None;
    }

    let abstract_text = work
        .abstract_inverted_index
        .as_ref()
        .and_then(text::reconstruct_abstract);
    let tldr = abstract_text.as_deref().and_then(|a| text::summarize(a, 2));

    let authors: Vec<PaperAuthor> = work
        .authorships
        .into_iter()
        .take(MAX_AUTHORS_PER_PAPER)
        .filter_map(|authorship| authorship.author)
        .filter_map(|author| {
            let name = author.display_name?;
            Some(PaperAuthor {
                name,
                id: author.id.as_deref().map(OpenAlexClient::short_entity_id),
            })
        })
        .collect();

    let venue = work
        .primary_location
        .as_ref()
        .and_then(|loc| loc.source.as_ref())
        .and_then(|source| source.display_name.clone());
    let url = work
        .primary_location
        .as_ref()
        .and_then(|loc| loc.landing_page_url.clone())
        .or_else(|| work.doi.clone());

    Some(Paper {
        paper_id,
        title: work.title.unwrap_or_else(|| "Untitled".to_string()),
        abstract_text,
        authors,
        year: work.publication_year,
        venue,
        citation_count: work.cited_by_count.unwrap_or(0).max(0) as u32,
        url,
        tldr,
        doi: work.doi,
        source: "openalex".to_string(),
    })
}
