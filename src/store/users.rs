//! Per-user aggregate: identity, profile, feedback, folders, follows.
//!
//! All mutations funnel through `transact`, an optimistic read-modify-write
//! over the whole aggregate. The likes folder and the feedback map are kept
//! mutually consistent inside the aggregate, so no cross-document
//! coordination exists anywhere else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::AppError;
use crate::models::{
    EntityType, FeedbackAction, FeedbackRecord, FeedbackSummary, Folder, Follow, Profile, User,
    LIKES_FOLDER_ID,
};
use crate::store::snapshot;

const TRANSACT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackScope {
    Liked,
    Disliked,
    All,
}

/// Everything the service knows about one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDoc {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub profile: Profile,
    /// paper id -> record; at most one per paper.
    #[serde(default)]
    pub feedback: BTreeMap<String, FeedbackRecord>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub follows: Vec<Follow>,
}

impl UserDoc {
    fn ensure_likes_folder(&mut self, now: DateTime<Utc>) {
        if !self.folders.iter().any(|f| f.is_likes()) {
            self.folders.insert(0, Folder::likes(now));
        }
    }

    fn likes_folder_mut(&mut self) -> &mut Folder {
        // ensure_likes_folder runs on every load, so the folder is present.
        let idx = self
            .folders
            .iter()
            .position(|f| f.is_likes())
            .expect("likes folder is materialized on load");
        &mut self.folders[idx]
    }

    /// Like: flips a dislike, and the paper enters the likes folder at the
    /// head if absent.
    fn apply_like(&mut self, paper_id: &str, now: DateTime<Utc>) {
        match self.feedback.get_mut(paper_id) {
            Some(record) if record.action == FeedbackAction::Liked => {}
            Some(record) => {
                record.action = FeedbackAction::Liked;
                record.updated_at = now;
            }
            None => {
                self.feedback
                    .insert(paper_id.to_string(), FeedbackRecord::new(FeedbackAction::Liked, now));
            }
        }
        self.likes_folder_mut().insert_head(paper_id, now);
    }

    /// Dislike: flips a like and evicts the paper from the likes folder.
    fn apply_dislike(&mut self, paper_id: &str, now: DateTime<Utc>) {
        match self.feedback.get_mut(paper_id) {
            Some(record) if record.action == FeedbackAction::Disliked => {}
            Some(record) => {
                record.action = FeedbackAction::Disliked;
                record.updated_at = now;
            }
            None => {
                self.feedback.insert(
                    paper_id.to_string(),
                    FeedbackRecord::new(FeedbackAction::Disliked, now),
                );
            }
        }
        self.likes_folder_mut().remove(paper_id, now);
    }

    /// Removes only a matching liked record.
    fn apply_unlike(&mut self, paper_id: &str, now: DateTime<Utc>) {
        if let Some(record) = self.feedback.get(paper_id) {
            if record.action == FeedbackAction::Liked {
                self.feedback.remove(paper_id);
            }
        }
        self.likes_folder_mut().remove(paper_id, now);
    }

    /// Removes only a matching disliked record.
    fn apply_undislike(&mut self, paper_id: &str) {
        if let Some(record) = self.feedback.get(paper_id) {
            if record.action == FeedbackAction::Disliked {
                self.feedback.remove(paper_id);
            }
        }
    }

    pub fn feedback_summary(&self) -> FeedbackSummary {
        let mut liked: Vec<(&String, &FeedbackRecord)> = Vec::new();
        let mut disliked: Vec<(&String, &FeedbackRecord)> = Vec::new();
        for (paper_id, record) in &self.feedback {
            match record.action {
                FeedbackAction::Liked => liked.push((paper_id, record)),
                FeedbackAction::Disliked => disliked.push((paper_id, record)),
            }
        }
        // Most recent first, id as the stable tiebreak.
        let order = |a: &(&String, &FeedbackRecord), b: &(&String, &FeedbackRecord)| {
            b.1.updated_at
                .cmp(&a.1.updated_at)
                .then_with(|| a.0.cmp(b.0))
        };
        liked.sort_by(order);
        disliked.sort_by(order);
        FeedbackSummary {
            liked: liked.into_iter().map(|(id, _)| id.clone()).collect(),
            disliked: disliked.into_iter().map(|(id, _)| id.clone()).collect(),
        }
    }
}

/// Versioned storage of user aggregates. The version is a plain monotonic
/// counter; `store` commits only when the caller saw the current value.
#[async_trait]
pub trait UserDocBackend: Send + Sync {
    /// Returns the aggregate and its version; absent users read as version 0.
    async fn load(&self, user_id: &str) -> Result<Option<(UserDoc, u64)>, AppError>;

    /// Conditional write: succeeds iff the stored version still equals
    /// `expected` (0 for a new user). Returns false on a lost race.
    async fn store(&self, user_id: &str, doc: UserDoc, expected: u64) -> Result<bool, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Versioned {
    doc: UserDoc,
    version: u64,
}

/// In-process backend with an optional JSON snapshot file.
pub struct MemoryUserBackend {
    docs: RwLock<HashMap<String, Versioned>>,
    path: Option<PathBuf>,
}

impl MemoryUserBackend {
    pub fn new(path: Option<PathBuf>) -> Self {
        let docs: HashMap<String, Versioned> = match &path {
            Some(path) => snapshot::load(path),
            None => HashMap::new(),
        };
        Self {
            docs: RwLock::new(docs),
            path,
        }
    }

    async fn persist(&self) {
        if let Some(path) = &self.path {
            let docs = self.docs.read().await;
            snapshot::save(path, &*docs);
        }
    }
}

#[async_trait]
impl UserDocBackend for MemoryUserBackend {
    async fn load(&self, user_id: &str) -> Result<Option<(UserDoc, u64)>, AppError> {
        let docs = self.docs.read().await;
        Ok(docs
            .get(user_id)
            .map(|entry| (entry.doc.clone(), entry.version)))
    }

    async fn store(&self, user_id: &str, doc: UserDoc, expected: u64) -> Result<bool, AppError> {
        {
            let mut docs = self.docs.write().await;
            let current = docs.get(user_id).map(|entry| entry.version).unwrap_or(0);
            if current != expected {
                return Ok(false);
            }
            docs.insert(
                user_id.to_string(),
                Versioned {
                    doc,
                    version: expected + 1,
                },
            );
        }
        self.persist().await;
        Ok(true)
    }
}

#[derive(Clone)]
pub struct UserStore {
    backend: Arc<dyn UserDocBackend>,
}

impl UserStore {
    pub fn new(backend: Arc<dyn UserDocBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryUserBackend::new(None)))
    }

    async fn load_or_default(&self, user_id: &str) -> Result<(UserDoc, u64), AppError> {
        let (mut doc, version) = self
            .backend
            .load(user_id)
            .await?
            .unwrap_or_else(|| (UserDoc::default(), 0));
        doc.ensure_likes_folder(Utc::now());
        Ok((doc, version))
    }

    /// Read-only view of the aggregate.
    pub async fn read(&self, user_id: &str) -> Result<UserDoc, AppError> {
        Ok(self.load_or_default(user_id).await?.0)
    }

    /// Read-modify-write with optimistic retry. The closure may run more
    /// than once and must not do I/O; an `Err` aborts without committing.
    pub async fn transact<T, F>(&self, user_id: &str, mutate: F) -> Result<T, AppError>
    where
        T: Send,
        F: Fn(&mut UserDoc) -> Result<T, AppError> + Send + Sync,
    {
        for attempt in 0..TRANSACT_RETRIES {
            let (mut doc, version) = self.load_or_default(user_id).await?;
            let value = mutate(&mut doc)?;
            if self.backend.store(user_id, doc, version).await? {
                return Ok(value);
            }
            debug!(user_id, attempt, "Optimistic write conflict, retrying");
        }
        Err(AppError::StoreConflict {
            user_id: user_id.to_string(),
        })
    }

    // ----- identity -----

    pub async fn upsert_user(
        &self,
        user_id: &str,
        email: &str,
        display_name: Option<String>,
        picture_url: Option<String>,
    ) -> Result<User, AppError> {
        let now = Utc::now();
        self.transact(user_id, move |doc| {
            let user = match doc.user.take() {
                Some(mut user) => {
                    user.email = email.to_string();
                    user.display_name = display_name.clone();
                    user.picture_url = picture_url.clone();
                    user.last_login_at = now;
                    user
                }
                None => User {
                    user_id: user_id.to_string(),
                    email: email.to_string(),
                    display_name: display_name.clone(),
                    picture_url: picture_url.clone(),
                    created_at: now,
                    last_login_at: now,
                },
            };
            doc.user = Some(user.clone());
            Ok(user)
        })
        .await
    }

    // ----- profile -----

    pub async fn get_profile(&self, user_id: &str) -> Result<Profile, AppError> {
        Ok(self.read(user_id).await?.profile.clone())
    }

    pub async fn put_profile(
        &self,
        user_id: &str,
        topics: Vec<String>,
        authors: Vec<String>,
    ) -> Result<Profile, AppError> {
        let topics = Profile::normalize(topics);
        let authors = Profile::normalize(authors);
        if topics.len() > Profile::MAX_ENTRIES || authors.len() > Profile::MAX_ENTRIES {
            return Err(AppError::validation(format!(
                "profile lists are limited to {} entries",
                Profile::MAX_ENTRIES
            )));
        }
        self.transact(user_id, move |doc| {
            doc.profile = Profile {
                topics: topics.clone(),
                authors: authors.clone(),
            };
            Ok(doc.profile.clone())
        })
        .await
    }

    pub async fn clear_profile(&self, user_id: &str) -> Result<(), AppError> {
        self.transact(user_id, |doc| {
            doc.profile = Profile::default();
            Ok(())
        })
        .await
    }

    // ----- feedback -----

    pub async fn feedback_summary(&self, user_id: &str) -> Result<FeedbackSummary, AppError> {
        Ok(self.read(user_id).await?.feedback_summary())
    }

    pub async fn like(&self, user_id: &str, paper_id: &str) -> Result<(), AppError> {
        let now = Utc::now();
        self.transact(user_id, move |doc| {
            doc.apply_like(paper_id, now);
            Ok(())
        })
        .await
    }

    pub async fn dislike(&self, user_id: &str, paper_id: &str) -> Result<(), AppError> {
        let now = Utc::now();
        self.transact(user_id, move |doc| {
            doc.apply_dislike(paper_id, now);
            Ok(())
        })
        .await
    }

    pub async fn unlike(&self, user_id: &str, paper_id: &str) -> Result<(), AppError> {
        let now = Utc::now();
        self.transact(user_id, move |doc| {
            doc.apply_unlike(paper_id, now);
            Ok(())
        })
        .await
    }

    pub async fn undislike(&self, user_id: &str, paper_id: &str) -> Result<(), AppError> {
        self.transact(user_id, move |doc| {
            doc.apply_undislike(paper_id);
            Ok(())
        })
        .await
    }

    pub async fn clear_feedback(&self, user_id: &str, scope: FeedbackScope) -> Result<(), AppError> {
        let now = Utc::now();
        self.transact(user_id, move |doc| {
            let drop_liked = matches!(scope, FeedbackScope::Liked | FeedbackScope::All);
            let drop_disliked = matches!(scope, FeedbackScope::Disliked | FeedbackScope::All);
            doc.feedback.retain(|_, record| match record.action {
                FeedbackAction::Liked => !drop_liked,
                FeedbackAction::Disliked => !drop_disliked,
            });
            if drop_liked {
                let likes = doc.likes_folder_mut();
                likes.paper_ids.clear();
                likes.updated_at = now;
            }
            Ok(())
        })
        .await
    }

    /// Ids of the most recently liked papers, newest first.
    pub async fn recent_likes(&self, user_id: &str, limit: usize) -> Result<Vec<String>, AppError> {
        let doc = self.read(user_id).await?;
        let mut liked: Vec<(&String, &FeedbackRecord)> = doc
            .feedback
            .iter()
            .filter(|(_, record)| record.action == FeedbackAction::Liked)
            .collect();
        liked.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at).then_with(|| a.0.cmp(b.0)));
        Ok(liked
            .into_iter()
            .take(limit)
            .map(|(id, _)| id.clone())
            .collect())
    }

    // ----- folders -----

    pub async fn list_folders(&self, user_id: &str) -> Result<Vec<Folder>, AppError> {
        let doc = self.read(user_id).await?;
        // Likes first, then creation order.
        let (mut likes, rest): (Vec<Folder>, Vec<Folder>) =
            doc.folders.into_iter().partition(|f| f.is_likes());
        likes.extend(rest);
        Ok(likes)
    }

    pub async fn get_folder(&self, user_id: &str, folder_id: &str) -> Result<Folder, AppError> {
        self.read(user_id)
            .await?
            .folders
            .into_iter()
            .find(|f| f.id == folder_id)
            .ok_or_else(|| AppError::not_found("folder", folder_id))
    }

    pub async fn create_folder(
        &self,
        user_id: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<Folder, AppError> {
        let name = name.trim().to_string();
        if name.is_empty() || name.len() > 120 {
            return Err(AppError::validation(
                "folder name must be between 1 and 120 characters",
            ));
        }
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        self.transact(user_id, move |doc| {
            if doc
                .folders
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(&name))
            {
                return Err(AppError::conflict(format!(
                    "folder named '{name}' already exists"
                )));
            }
            let folder = Folder::new(id.clone(), name.clone(), description.clone(), now);
            doc.folders.push(folder.clone());
            Ok(folder)
        })
        .await
    }

    pub async fn delete_folder(&self, user_id: &str, folder_id: &str) -> Result<(), AppError> {
        if folder_id == LIKES_FOLDER_ID {
            return Err(AppError::Forbidden {
                message: "the likes folder cannot be deleted".to_string(),
            });
        }
        self.transact(user_id, move |doc| {
            let before = doc.folders.len();
            doc.folders.retain(|f| f.id != folder_id);
            if doc.folders.len() == before {
                return Err(AppError::not_found("folder", folder_id));
            }
            Ok(())
        })
        .await
    }

    /// Adding to the likes folder is a like; anywhere else an idempotent
    /// ordered insert.
    pub async fn add_paper(
        &self,
        user_id: &str,
        folder_id: &str,
        paper_id: &str,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        self.transact(user_id, move |doc| {
            if folder_id == LIKES_FOLDER_ID {
                doc.apply_like(paper_id, now);
                return Ok(());
            }
            let folder = doc
                .folders
                .iter_mut()
                .find(|f| f.id == folder_id)
                .ok_or_else(|| AppError::not_found("folder", folder_id))?;
            folder.push_if_absent(paper_id, now);
            Ok(())
        })
        .await
    }

    /// Removing from the likes folder is an unlike.
    pub async fn remove_paper(
        &self,
        user_id: &str,
        folder_id: &str,
        paper_id: &str,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        self.transact(user_id, move |doc| {
            if folder_id == LIKES_FOLDER_ID {
                doc.apply_unlike(paper_id, now);
                return Ok(());
            }
            let folder = doc
                .folders
                .iter_mut()
                .find(|f| f.id == folder_id)
                .ok_or_else(|| AppError::not_found("folder", folder_id))?;
            folder.remove(paper_id, now);
            Ok(())
        })
        .await
    }

    // ----- follows -----

    pub async fn list_follows(&self, user_id: &str) -> Result<Vec<Follow>, AppError> {
        Ok(self.read(user_id).await?.follows)
    }

    /// Returns the edge and whether it was created; re-following is a
    /// no-op that hands back the existing edge.
    pub async fn follow(
        &self,
        user_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        entity_name: &str,
        openalex_id: &str,
    ) -> Result<(Follow, bool), AppError> {
        let now = Utc::now();
        self.transact(user_id, move |doc| {
            if let Some(existing) = doc
                .follows
                .iter()
                .find(|f| f.entity_type == entity_type && f.entity_id == entity_id)
            {
                return Ok((existing.clone(), false));
            }
            let follow = Follow {
                entity_type,
                entity_id: entity_id.to_string(),
                entity_name: entity_name.to_string(),
                openalex_id: openalex_id.to_string(),
                followed_at: now,
            };
            doc.follows.push(follow.clone());
            Ok((follow, true))
        })
        .await
    }

    pub async fn unfollow(
        &self,
        user_id: &str,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<(), AppError> {
        self.transact(user_id, move |doc| {
            let before = doc.follows.len();
            doc.follows
                .retain(|f| !(f.entity_type == entity_type && f.entity_id == entity_id));
            if doc.follows.len() == before {
                return Err(AppError::not_found(
                    "follow",
                    format!("{entity_type}/{entity_id}"),
                ));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> UserStore {
        UserStore::in_memory()
    }

    #[tokio::test]
    async fn like_then_unlike_round_trip() {
        let store = store();
        store.like("u1", "W1").await.unwrap();

        let summary = store.feedback_summary("u1").await.unwrap();
        assert_eq!(summary.liked, vec!["W1"]);
        assert!(summary.disliked.is_empty());
        let likes = store.get_folder("u1", LIKES_FOLDER_ID).await.unwrap();
        assert_eq!(likes.paper_ids, vec!["W1"]);

        store.unlike("u1", "W1").await.unwrap();
        let summary = store.feedback_summary("u1").await.unwrap();
        assert!(summary.liked.is_empty());
        let likes = store.get_folder("u1", LIKES_FOLDER_ID).await.unwrap();
        assert!(likes.paper_ids.is_empty());
    }

    #[tokio::test]
    async fn like_flips_dislike_and_fills_likes_folder() {
        let store = store();
        store.dislike("u1", "W2").await.unwrap();
        store.like("u1", "W2").await.unwrap();

        let summary = store.feedback_summary("u1").await.unwrap();
        assert_eq!(summary.liked, vec!["W2"]);
        assert!(summary.disliked.is_empty());
        let likes = store.get_folder("u1", LIKES_FOLDER_ID).await.unwrap();
        assert_eq!(likes.paper_ids, vec!["W2"]);
    }

    #[tokio::test]
    async fn dislike_evicts_from_likes_folder() {
        let store = store();
        store.like("u1", "W1").await.unwrap();
        store.dislike("u1", "W1").await.unwrap();

        let summary = store.feedback_summary("u1").await.unwrap();
        assert!(summary.liked.is_empty());
        assert_eq!(summary.disliked, vec!["W1"]);
        let likes = store.get_folder("u1", LIKES_FOLDER_ID).await.unwrap();
        assert!(likes.paper_ids.is_empty());
    }

    #[tokio::test]
    async fn unlike_leaves_dislikes_untouched() {
        let store = store();
        store.dislike("u1", "W1").await.unwrap();
        store.unlike("u1", "W1").await.unwrap();
        let summary = store.feedback_summary("u1").await.unwrap();
        assert_eq!(summary.disliked, vec!["W1"]);
    }

    #[tokio::test]
    async fn likes_folder_exists_and_is_protected() {
        let store = store();
        let folders = store.list_folders("fresh-user").await.unwrap();
        assert!(folders.iter().any(|f| f.is_likes()));

        let err = store.delete_folder("fresh-user", LIKES_FOLDER_ID).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn add_paper_to_likes_implies_like() {
        let store = store();
        store.add_paper("u1", LIKES_FOLDER_ID, "W7").await.unwrap();
        let summary = store.feedback_summary("u1").await.unwrap();
        assert_eq!(summary.liked, vec!["W7"]);

        store.remove_paper("u1", LIKES_FOLDER_ID, "W7").await.unwrap();
        let summary = store.feedback_summary("u1").await.unwrap();
        assert!(summary.liked.is_empty());
    }

    #[tokio::test]
    async fn folder_add_is_idempotent_and_preserves_position() {
        let store = store();
        let folder = store.create_folder("u1", "Reading list", None).await.unwrap();
        store.add_paper("u1", &folder.id, "W1").await.unwrap();
        store.add_paper("u1", &folder.id, "W2").await.unwrap();
        store.add_paper("u1", &folder.id, "W1").await.unwrap();

        let folder = store.get_folder("u1", &folder.id).await.unwrap();
        assert_eq!(folder.paper_ids, vec!["W1", "W2"]);
    }

    #[tokio::test]
    async fn duplicate_folder_name_conflicts() {
        let store = store();
        store.create_folder("u1", "Reading", None).await.unwrap();
        let err = store.create_folder("u1", "reading", None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn follow_is_unique_per_entity_and_refollow_returns_edge() {
        let store = store();
        let (first, created) = store
            .follow("u1", EntityType::Author, "A1", "Ada", "https://openalex.org/A1")
            .await
            .unwrap();
        assert!(created);

        let (second, created) = store
            .follow("u1", EntityType::Author, "A1", "Ada", "https://openalex.org/A1")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.followed_at, second.followed_at);
        assert_eq!(store.list_follows("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unfollow_missing_edge_is_not_found() {
        let store = store();
        let err = store
            .unfollow("u1", EntityType::Topic, "C1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn concurrent_likes_commit_exactly_once() {
        let store = store();
        // Seed the aggregate so both writers race on the same version.
        store.upsert_user("u1", "u@example.com", None, None).await.unwrap();

        let (a, b) = tokio::join!(store.like("u1", "W1"), store.like("u1", "W1"));
        a.unwrap();
        b.unwrap();

        let doc = store.read("u1").await.unwrap();
        assert_eq!(doc.feedback.len(), 1);
        let likes = store.get_folder("u1", LIKES_FOLDER_ID).await.unwrap();
        assert_eq!(likes.paper_ids, vec!["W1"]);
    }

    #[tokio::test]
    async fn profile_normalizes_and_caps() {
        let store = store();
        let profile = store
            .put_profile(
                "u1",
                vec!["ML".into(), "ml".into(), " robotics ".into()],
                vec![],
            )
            .await
            .unwrap();
        assert_eq!(profile.topics, vec!["ML", "robotics"]);

        let too_many: Vec<String> = (0..65).map(|i| format!("topic-{i}")).collect();
        let err = store.put_profile("u1", too_many, vec![]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn upsert_user_keeps_created_at() {
        let store = store();
        let first = store
            .upsert_user("u1", "a@example.com", Some("A".into()), None)
            .await
            .unwrap();
        let second = store
            .upsert_user("u1", "a@example.com", Some("A".into()), None)
            .await
            .unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert!(second.last_login_at >= first.last_login_at);
    }
}
