//! Shared paper cache keyed by paper id.
//!
//! Writes are last-writer-wins upserts; nothing is deleted on the hot
//! path. Entries carry freshness and access metadata so feed engines can
//! decide when a revisit should overwrite.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::AppError;
use crate::models::Paper;
use crate::store::snapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPaper {
    pub paper: Paper,
    pub cached_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub access_count: u64,
}

#[derive(Clone)]
pub struct PaperStore {
    inner: Arc<Inner>,
}

struct Inner {
    entries: RwLock<HashMap<String, CachedPaper>>,
    path: Option<PathBuf>,
    fresh_ttl: ChronoDuration,
}

impl PaperStore {
    pub fn new(path: Option<PathBuf>, fresh_ttl: Duration) -> Self {
        let entries: HashMap<String, CachedPaper> = match &path {
            Some(path) => snapshot::load(path),
            None => HashMap::new(),
        };
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(entries),
                path,
                fresh_ttl: ChronoDuration::from_std(fresh_ttl)
                    .unwrap_or_else(|_| ChronoDuration::hours(24)),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None, Duration::from_secs(24 * 3600))
    }

    pub async fn put(&self, paper: Paper) -> Result<(), AppError> {
        self.put_many(vec![paper]).await
    }

    /// Idempotent upsert; re-ingesting an id replaces fields but keeps the
    /// original `cached_at` and the access counter.
    pub async fn put_many(&self, papers: Vec<Paper>) -> Result<(), AppError> {
        if papers.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        {
            let mut entries = self.inner.entries.write().await;
            for paper in papers {
                match entries.entry(paper.paper_id.clone()) {
                    std::collections::hash_map::Entry::Occupied(mut occupied) => {
                        let cached = occupied.get_mut();
                        cached.paper = paper;
                        cached.updated_at = now;
                    }
                    std::collections::hash_map::Entry::Vacant(vacant) => {
                        vacant.insert(CachedPaper {
                            paper,
                            cached_at: now,
                            updated_at: now,
                            access_count: 0,
                        });
                    }
                }
            }
        }
        self.persist().await;
        Ok(())
    }

    pub async fn get(&self, paper_id: &str) -> Option<Paper> {
        let entries = self.inner.entries.read().await;
        let hit = entries.get(paper_id).map(|cached| cached.paper.clone());
        if hit.is_some() {
            metrics::counter!("scholarfeed_paper_cache_hits_total").increment(1);
        } else {
            metrics::counter!("scholarfeed_paper_cache_misses_total").increment(1);
        }
        debug!(paper_id, hit = hit.is_some(), "Paper cache lookup");
        hit
    }

    /// Found papers in input order; missing ids are dropped.
    pub async fn get_many(&self, ids: &[String]) -> Vec<Paper> {
        let entries = self.inner.entries.read().await;
        ids.iter()
            .filter_map(|id| entries.get(id).map(|cached| cached.paper.clone()))
            .collect()
    }

    /// Bump `updated_at` and the access counter for a served entry.
    pub async fn touch(&self, paper_id: &str) {
        let mut entries = self.inner.entries.write().await;
        if let Some(cached) = entries.get_mut(paper_id) {
            cached.access_count += 1;
            cached.updated_at = Utc::now();
        }
    }

    pub async fn is_fresh(&self, paper_id: &str) -> bool {
        let entries = self.inner.entries.read().await;
        entries
            .get(paper_id)
            .map(|cached| Utc::now() - cached.updated_at < self.inner.fresh_ttl)
            .unwrap_or(false)
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self) {
        if let Some(path) = &self.inner.path {
            let entries = self.inner.entries.read().await;
            snapshot::save(path, &*entries);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_many_then_get_many_round_trips() {
        let store = PaperStore::in_memory();
        let papers = vec![Paper::stub("W1", "One"), Paper::stub("W2", "Two")];
        store.put_many(papers.clone()).await.unwrap();

        // Order of the id list should not matter for membership.
        let fetched = store
            .get_many(&["W2".to_string(), "W1".to_string(), "W9".to_string()])
            .await;
        assert_eq!(fetched.len(), 2);
        assert!(fetched.iter().any(|p| *p == papers[0]));
        assert!(fetched.iter().any(|p| *p == papers[1]));
    }

    #[tokio::test]
    async fn upsert_replaces_fields_and_keeps_access_count() {
        let store = PaperStore::in_memory();
        store.put(Paper::stub("W1", "Old title")).await.unwrap();
        store.touch("W1").await;

        let mut updated = Paper::stub("W1", "New title");
        updated.citation_count = 5;
        store.put(updated).await.unwrap();

        let entries = store.inner.entries.read().await;
        let cached = entries.get("W1").unwrap();
        assert_eq!(cached.paper.title, "New title");
        assert_eq!(cached.access_count, 1);
    }

    #[tokio::test]
    async fn fresh_entries_are_reported_fresh() {
        let store = PaperStore::in_memory();
        store.put(Paper::stub("W1", "T")).await.unwrap();
        assert!(store.is_fresh("W1").await);
        assert!(!store.is_fresh("W404").await);
    }
}
