//! User-owned ordered paper collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved folder whose contents mirror the user's liked set. It always
/// exists and cannot be deleted or renamed.
pub const LIKES_FOLDER_ID: &str = "likes";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub paper_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description,
            paper_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn likes(now: DateTime<Utc>) -> Self {
        Self::new(LIKES_FOLDER_ID, "Likes", None, now)
    }

    pub fn is_likes(&self) -> bool {
        self.id == LIKES_FOLDER_ID
    }

    pub fn contains(&self, paper_id: &str) -> bool {
        self.paper_ids.iter().any(|id| id == paper_id)
    }

    /// Insert at the head unless already present. Returns whether the
    /// folder changed; the first position of an existing entry is kept.
    pub fn insert_head(&mut self, paper_id: &str, now: DateTime<Utc>) -> bool {
        if self.contains(paper_id) {
            return false;
        }
        self.paper_ids.insert(0, paper_id.to_string());
        self.updated_at = now;
        true
    }

    /// Append unless already present, preserving insertion order.
    pub fn push_if_absent(&mut self, paper_id: &str, now: DateTime<Utc>) -> bool {
        if self.contains(paper_id) {
            return false;
        }
        self.paper_ids.push(paper_id.to_string());
        self.updated_at = now;
        true
    }

    pub fn remove(&mut self, paper_id: &str, now: DateTime<Utc>) -> bool {
        let before = self.paper_ids.len();
        self.paper_ids.retain(|id| id != paper_id);
        if self.paper_ids.len() != before {
            self.updated_at = now;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_head_is_idempotent_and_keeps_first_position() {
        let now = Utc::now();
        let mut folder = Folder::likes(now);
        assert!(folder.insert_head("W1", now));
        assert!(folder.insert_head("W2", now));
        assert!(!folder.insert_head("W1", now));
        assert_eq!(folder.paper_ids, vec!["W2", "W1"]);
    }

    #[test]
    fn remove_reports_change() {
        let now = Utc::now();
        let mut folder = Folder::new("f1", "Reading", None, now);
        folder.push_if_absent("W1", now);
        assert!(folder.remove("W1", now));
        assert!(!folder.remove("W1", now));
    }
}
