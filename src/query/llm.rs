//! Model-backed entity extraction with a deterministic fallback.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use super::rules::RuleQueryParser;
use super::{ParsedQuery, QueryParser};

const SYSTEM_PROMPT: &str = "You extract structured entities from academic search queries. \
Return ONLY a JSON object of the form \
{\"keywords\": [..], \"authors\": [..], \"years\": [..], \"institutions\": [..]}. \
Keywords are research topics, never filler words like 'papers'. Authors are person names in \
proper case. Years are literals ('2020'), ranges ('2020-2023'), or bounds ('>2020', '<2020'). \
Institutions are universities or research organizations. Use [] for anything absent.";

/// Parser that asks an OpenAI-compatible chat endpoint for the extraction
/// and falls back to rule-based parsing whenever the call or its output is
/// unusable. The service never blocks on the model being reachable.
pub struct LlmQueryParser {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    fallback: RuleQueryParser,
}

impl LlmQueryParser {
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("default TLS backend is available"),
            api_url,
            api_key,
            model,
            fallback: RuleQueryParser::new(),
        }
    }

    async fn extract(&self, text: &str) -> Result<ParsedQuery, String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": format!("Extract entities from this search query: {text}")},
            ],
            "temperature": 0.1,
            "max_tokens": 500,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("API returned {}", response.status()));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("unreadable response: {e}"))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| "empty choices".to_string())?;

        let parsed: ParsedQuery =
            serde_json::from_str(&content).map_err(|e| format!("non-JSON content: {e}"))?;
        Ok(normalize(parsed))
    }
}

fn normalize(parsed: ParsedQuery) -> ParsedQuery {
    let clean = |entries: Vec<String>| -> Vec<String> {
        entries
            .into_iter()
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect()
    };
    ParsedQuery {
        keywords: clean(parsed.keywords),
        authors: clean(parsed.authors),
        years: clean(parsed.years),
        institutions: clean(parsed.institutions),
    }
}

#[async_trait]
impl QueryParser for LlmQueryParser {
    async fn parse(&self, text: &str) -> ParsedQuery {
        if text.trim().is_empty() {
            return ParsedQuery::default();
        }
        match self.extract(text).await {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(%reason, "Model extraction unavailable, using rule parser");
                self.fallback.parse(text).await
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_drops_empties() {
        let parsed = normalize(ParsedQuery {
            keywords: vec!["  ml ".into(), "".into()],
            authors: vec!["Jane Doe".into()],
            years: vec![" 2020".into()],
            institutions: vec![],
        });
        assert_eq!(parsed.keywords, vec!["ml"]);
        assert_eq!(parsed.years, vec!["2020"]);
    }
}
