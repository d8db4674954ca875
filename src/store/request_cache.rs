//! Per-fingerprint cache of assembled feed responses.
//!
//! First tier of the cache: a fresh entry answers a repeat request without
//! touching the upstream; a stale entry is kept around as the degraded
//! answer when the upstream is rate limited or down.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::models::Paper;

/// How long stale entries stay eligible for degraded serving.
const MAX_STALE: Duration = Duration::from_secs(24 * 3600);

struct Entry {
    papers: Vec<Paper>,
    stored_at: Instant,
}

pub struct RequestCache {
    entries: Mutex<HashMap<String, Entry>>,
    fresh_ttl: Duration,
}

impl RequestCache {
    pub fn new(fresh_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fresh_ttl,
        }
    }

    /// Deterministic hash over everything that defines a response.
    pub fn fingerprint(parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update(b"\x00");
        }
        hex::encode(hasher.finalize())
    }

    pub fn fresh(&self, key: &str) -> Option<Vec<Paper>> {
        let entries = self.entries.lock().expect("request cache lock");
        let hit = entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.fresh_ttl)
            .map(|entry| entry.papers.clone());
        if hit.is_some() {
            metrics::counter!("scholarfeed_request_cache_hits_total").increment(1);
        } else {
            metrics::counter!("scholarfeed_request_cache_misses_total").increment(1);
        }
        hit
    }

    /// Any retained entry, fresh or stale. Used only for degradation.
    pub fn any(&self, key: &str) -> Option<Vec<Paper>> {
        let entries = self.entries.lock().expect("request cache lock");
        entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < MAX_STALE)
            .map(|entry| entry.papers.clone())
    }

    pub fn store(&self, key: &str, papers: &[Paper]) {
        let mut entries = self.entries.lock().expect("request cache lock");
        entries.retain(|_, entry| entry.stored_at.elapsed() < MAX_STALE);
        entries.insert(
            key.to_string(),
            Entry {
                papers: papers.to_vec(),
                stored_at: Instant::now(),
            },
        );
        debug!(key, count = papers.len(), "Request cache stored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_order_sensitive_and_stable() {
        let a = RequestCache::fingerprint(&["u1", "q=x"]);
        let b = RequestCache::fingerprint(&["u1", "q=x"]);
        let c = RequestCache::fingerprint(&["q=x", "u1"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fresh_entries_are_served_and_expire() {
        let cache = RequestCache::new(Duration::from_millis(0));
        cache.store("k", &[Paper::stub("W1", "T")]);
        // Zero TTL: immediately stale for the fresh path...
        assert!(cache.fresh("k").is_none());
        // ...but still eligible for degraded serving.
        assert_eq!(cache.any("k").unwrap().len(), 1);
    }

    #[test]
    fn fresh_hit_within_ttl() {
        let cache = RequestCache::new(Duration::from_secs(60));
        cache.store("k", &[Paper::stub("W1", "T")]);
        assert_eq!(cache.fresh("k").unwrap().len(), 1);
        assert!(cache.fresh("other").is_none());
    }
}
