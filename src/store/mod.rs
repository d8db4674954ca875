//! Durable state: shared paper cache, per-user aggregates, and the
//! per-fingerprint request cache.

pub mod papers;
pub mod request_cache;
pub mod snapshot;
pub mod users;

pub use papers::{CachedPaper, PaperStore};
pub use request_cache::RequestCache;
pub use users::{FeedbackScope, MemoryUserBackend, UserDoc, UserDocBackend, UserStore};
