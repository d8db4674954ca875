//! Free-text query understanding.
//!
//! Parsing is advisory: implementations never fail the request. An empty
//! result means the caller should treat the whole text as keywords.

pub mod llm;
pub mod rules;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ParserConfig;

/// Entities extracted from a natural-language search query. `years`
/// entries use the surface forms `YYYY`, `>YYYY`, `<YYYY`, `YYYY-YYYY`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub years: Vec<String>,
    #[serde(default)]
    pub institutions: Vec<String>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
            && self.authors.is_empty()
            && self.years.is_empty()
            && self.institutions.is_empty()
    }
}

#[async_trait]
pub trait QueryParser: Send + Sync {
    async fn parse(&self, text: &str) -> ParsedQuery;
}

/// Rule-based parsing always works; the LLM extractor is layered on only
/// when a key is configured.
pub fn build_parser(config: &ParserConfig) -> Arc<dyn QueryParser> {
    match &config.api_key {
        Some(api_key) => Arc::new(llm::LlmQueryParser::new(
            config.api_url.clone(),
            api_key.clone(),
            config.model.clone(),
        )),
        None => Arc::new(rules::RuleQueryParser::new()),
    }
}
