//! Entity search hits backing the follow picker.

use serde::{Deserialize, Serialize};

/// One author/institution/topic/source match. The tail fields are
/// kind-specific and omitted when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityHit {
    /// Short-form id (e.g. `A5007856961`).
    pub id: String,
    /// Full upstream id URL.
    pub openalex_id: String,
    pub name: String,
    pub works_count: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub orcid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub issn: Option<Vec<String>>,
}
