//! Durable subscriptions to upstream entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Author,
    Institution,
    Topic,
    Source,
    /// Free-text query follow; `entity_id` is a stable hash of the query
    /// and `openalex_id` holds the original text.
    Custom,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Author => "author",
            EntityType::Institution => "institution",
            EntityType::Topic => "topic",
            EntityType::Source => "source",
            EntityType::Custom => "custom",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "author" => Ok(EntityType::Author),
            "institution" => Ok(EntityType::Institution),
            "topic" => Ok(EntityType::Topic),
            "source" => Ok(EntityType::Source),
            "custom" => Ok(EntityType::Custom),
            other => Err(format!(
                "invalid entity type '{other}'; expected one of: author, institution, topic, source, custom"
            )),
        }
    }
}

/// Edge from a user to a followed entity, unique per
/// (user, type, entityId).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Follow {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub openalex_id: String,
    pub followed_at: DateTime<Utc>,
}
