//! User identity and declared interests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated principal, keyed by the OAuth subject so the id stays
/// stable across logins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub picture_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

/// Declared interests. Entries are ordered, unique case-insensitively,
/// and capped at [`Profile::MAX_ENTRIES`] per list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

impl Profile {
    pub const MAX_ENTRIES: usize = 64;

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.authors.is_empty()
    }

    /// Normalize an interest list: trim, drop empties, dedupe
    /// case-insensitively keeping the first occurrence.
    pub fn normalize(entries: Vec<String>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        entries
            .into_iter()
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .filter(|entry| seen.insert(entry.to_lowercase()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_dedupes_case_insensitively_keeping_first() {
        let entries = vec![
            " Machine Learning ".to_string(),
            "machine learning".to_string(),
            "".to_string(),
            "Robotics".to_string(),
        ];
        assert_eq!(
            Profile::normalize(entries),
            vec!["Machine Learning".to_string(), "Robotics".to_string()]
        );
    }
}
