//! Deterministic query parsing from surface heuristics: author markers,
//! capitalized name runs, digit runs for years, and institution suffixes.

use async_trait::async_trait;
use regex::Regex;

use super::{ParsedQuery, QueryParser};

pub struct RuleQueryParser {
    author_marker: Regex,
    leading_names: Regex,
    name_candidate: Regex,
    keyword_filler: Regex,
    year_range: Regex,
    year_after: Regex,
    year_before: Regex,
    year_bare: Regex,
    institution: Regex,
    institution_of: Regex,
}

impl RuleQueryParser {
    pub fn new() -> Self {
        Self {
            author_marker: Regex::new(r"(?i)\b(?:by|from|authors?)\s+").unwrap(),
            leading_names: Regex::new(
                r"^((?:[A-Z][a-z]+(?:\s+[A-Z]\.)?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?(?:\s*,\s*)?)+)",
            )
            .unwrap(),
            name_candidate: Regex::new(
                r"\b([A-Z][a-z]+(?:\s+[A-Z]\.)?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)\b",
            )
            .unwrap(),
            keyword_filler: Regex::new(
                r"(?i)\b(?:papers?|research|articles?|studies?)\s+(?:about|on|regarding|in)\s+",
            )
            .unwrap(),
            year_range: Regex::new(r"\b((?:19|20)\d{2})\s*[-–]\s*((?:19|20)\d{2})\b").unwrap(),
            year_after: Regex::new(r"(?i)\b(?:after|since)\s+((?:19|20)\d{2})\b|>\s*((?:19|20)\d{2})\b")
                .unwrap(),
            year_before: Regex::new(r"(?i)\b(?:before|until)\s+((?:19|20)\d{2})\b|<\s*((?:19|20)\d{2})\b")
                .unwrap(),
            year_bare: Regex::new(r"\b((?:19|20)\d{2})\b").unwrap(),
            institution: Regex::new(
                r"\b([A-Z][\w.&-]*(?:\s+[A-Z][\w.&-]*){0,3}\s+(?:University|Institute|Laboratory|College))\b",
            )
            .unwrap(),
            institution_of: Regex::new(
                r"\b((?:University|Institute)\s+of\s+[A-Z][\w-]+(?:\s+[A-Z][\w-]+){0,2})\b",
            )
            .unwrap(),
        }
    }

    fn extract_years(&self, text: &mut String) -> Vec<String> {
        let mut years = Vec::new();

        for caps in self.year_range.captures_iter(text) {
            years.push(format!("{}-{}", &caps[1], &caps[2]));
        }
        *text = self.year_range.replace_all(text, " ").to_string();

        for caps in self.year_after.captures_iter(text) {
            let year = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
            years.push(format!(">{year}"));
        }
        *text = self.year_after.replace_all(text, " ").to_string();

        for caps in self.year_before.captures_iter(text) {
            let year = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
            years.push(format!("<{year}"));
        }
        *text = self.year_before.replace_all(text, " ").to_string();

        for caps in self.year_bare.captures_iter(text) {
            years.push(caps[1].to_string());
        }
        *text = self.year_bare.replace_all(text, " ").to_string();

        years
    }

    fn extract_institutions(&self, text: &mut String) -> Vec<String> {
        let mut institutions = Vec::new();
        for regex in [&self.institution_of, &self.institution] {
            for caps in regex.captures_iter(text) {
                institutions.push(caps[1].trim().to_string());
            }
            *text = regex.replace_all(text, " ").to_string();
        }
        // Orphaned connective left behind by a removed institution.
        *text = Regex::new(r"(?i)\b(?:at|in)\s*$")
            .unwrap()
            .replace(text.trim(), "")
            .to_string();
        institutions
    }

    fn split_authors(author_text: &str) -> Vec<String> {
        let normalized = Regex::new(r"(?i)\s+and\s+|\s*&\s*")
            .unwrap()
            .replace_all(author_text, ", ");
        normalized
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()
    }

    fn split_keywords(&self, keyword_text: &str) -> Vec<String> {
        let cleaned = self.keyword_filler.replace_all(keyword_text, "");
        let cleaned = Regex::new(r"(?i)^\s*(?:about|on|regarding|in|papers?|research|articles?)\s+")
            .unwrap()
            .replace(cleaned.trim(), "");
        cleaned
            .split(',')
            .map(|part| {
                Regex::new(r"\s+")
                    .unwrap()
                    .replace_all(part.trim(), " ")
                    .trim()
                    .to_string()
            })
            .filter(|part| !part.is_empty() && *part != "papers")
            .collect()
    }

    /// Capitalized runs that look like names rather than capitalized topic
    /// terms (2-4 words, no common research vocabulary).
    fn is_likely_author_name(name: &str) -> bool {
        let vocab = Regex::new(
            r"(?i)\b(?:machine|deep|neural|artificial|quantum|classical|statistical|learning|networks?|computing|intelligence|analysis)\b",
        )
        .unwrap();
        if vocab.is_match(name) {
            return false;
        }
        let words: Vec<&str> = name.split_whitespace().collect();
        if !(2..=4).contains(&words.len()) {
            return false;
        }
        let first_upper = |w: &&str| w.chars().next().map(char::is_uppercase).unwrap_or(false);
        first_upper(words.first().unwrap()) && first_upper(words.last().unwrap())
    }

    fn parse_inner(&self, query: &str) -> ParsedQuery {
        let mut text = query.trim().to_string();
        if text.is_empty() {
            return ParsedQuery::default();
        }

        let years = self.extract_years(&mut text);
        let institutions = self.extract_institutions(&mut text);

        let (authors, keyword_text) = if let Some(marker) = self.author_marker.find(&text) {
            let before = text[..marker.start()].trim().to_string();
            let after = text[marker.end()..].trim().to_string();

            if !before.is_empty() {
                (Self::split_authors(&after), before)
            } else {
                // "by Jane Doe transformer circuits": names are capitalized,
                // so the first lowercase word past the name starts keywords.
                let words: Vec<&str> = after.split_whitespace().collect();
                let split_idx = words
                    .iter()
                    .enumerate()
                    .skip(2)
                    .find(|(_, word)| {
                        word.chars().next().map(char::is_lowercase).unwrap_or(false)
                    })
                    .map(|(i, _)| i);
                match split_idx {
                    Some(i) => (
                        Self::split_authors(&words[..i].join(" ")),
                        words[i..].join(" "),
                    ),
                    None => (Self::split_authors(&after), String::new()),
                }
            }
        } else if let Some(caps) = self.leading_names.captures(&text) {
            let author_part = caps[1].trim().to_string();
            if Self::split_authors(&author_part)
                .iter()
                .all(|name| Self::is_likely_author_name(name))
            {
                let rest = text[caps.get(1).unwrap().end()..].trim().to_string();
                (Self::split_authors(&author_part), rest)
            } else {
                (Vec::new(), text.clone())
            }
        } else {
            // Conservative scan: pull out anything that reads as a name and
            // leave the rest as keywords.
            let mut remaining = text.clone();
            let mut authors = Vec::new();
            for caps in self.name_candidate.captures_iter(&text) {
                let name = caps[1].to_string();
                if Self::is_likely_author_name(&name) {
                    remaining = remaining.replacen(&name, "", 1);
                    authors.push(name);
                }
            }
            (authors, remaining)
        };

        ParsedQuery {
            keywords: self.split_keywords(&keyword_text),
            authors,
            years,
            institutions,
        }
    }
}

impl Default for RuleQueryParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryParser for RuleQueryParser {
    async fn parse(&self, text: &str) -> ParsedQuery {
        self.parse_inner(text)
    }
}
