//! Per-paper user feedback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Liked,
    Disliked,
}

/// At most one record exists per (user, paper); liking a disliked paper
/// flips it and vice versa.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub action: FeedbackAction,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(action: FeedbackAction, now: DateTime<Utc>) -> Self {
        Self {
            action,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Wire shape of `GET /api/feedback`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub liked: Vec<String>,
    pub disliked: Vec<String>,
}
