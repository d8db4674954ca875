//! Paper metadata as served to the client.

use serde::{Deserialize, Serialize};

/// One entry of a paper's ordered author list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperAuthor {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// Immutable snapshot of a bibliographic record.
///
/// Wire format is camelCase; snake_case aliases are accepted on input so
/// client-supplied snapshots in either convention deserialize. Absent
/// optional fields serialize as `null`; `authors` defaults to empty and
/// `citationCount` to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    #[serde(alias = "paper_id")]
    pub paper_id: String,
    pub title: String,
    #[serde(rename = "abstract", alias = "abstract_text", default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Vec<PaperAuthor>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(alias = "citation_count", default)]
    pub citation_count: u32,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tldr: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "openalex".to_string()
}

impl Paper {
    /// Minimal paper with just an id and title; the rest defaulted.
    pub fn stub(paper_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            title: title.into(),
            abstract_text: None,
            authors: Vec::new(),
            year: None,
            venue: None,
            citation_count: 0,
            url: None,
            tldr: None,
            doi: None,
            source: default_source(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_and_snake_case() {
        let camel: Paper = serde_json::from_value(serde_json::json!({
            "paperId": "W1",
            "title": "T",
            "citationCount": 7,
        }))
        .unwrap();
        let snake: Paper = serde_json::from_value(serde_json::json!({
            "paper_id": "W1",
            "title": "T",
            "citation_count": 7,
        }))
        .unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.citation_count, 7);
        assert_eq!(camel.source, "openalex");
        assert!(camel.authors.is_empty());
    }

    #[test]
    fn serializes_abstract_under_wire_name() {
        let mut paper = Paper::stub("W2", "T");
        paper.abstract_text = Some("body".into());
        let value = serde_json::to_value(&paper).unwrap();
        assert_eq!(value["abstract"], "body");
        assert_eq!(value["paperId"], "W2");
        assert!(value["year"].is_null());
    }
}
