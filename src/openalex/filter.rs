//! Typed construction of upstream works queries.

use std::fmt;
use std::str::FromStr;

/// Requested ordering of a works search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Recency,
    Relevance,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recency" => Ok(SortOrder::Recency),
            "relevance" => Ok(SortOrder::Relevance),
            other => Err(format!(
                "invalid sort '{other}'; expected 'recency' or 'relevance'"
            )),
        }
    }
}

/// One publication-year constraint in its accepted surface forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearFilter {
    Exact(i32),
    After(i32),
    Before(i32),
    Range(i32, i32),
}

impl FromStr for YearFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse_year = |y: &str| {
            y.trim()
                .parse::<i32>()
                .map_err(|_| format!("invalid year '{y}'"))
        };
        if let Some(rest) = s.strip_prefix('>') {
            return Ok(YearFilter::After(parse_year(rest)?));
        }
        if let Some(rest) = s.strip_prefix('<') {
            return Ok(YearFilter::Before(parse_year(rest)?));
        }
        if let Some((lo, hi)) = s.split_once('-') {
            return Ok(YearFilter::Range(parse_year(lo)?, parse_year(hi)?));
        }
        Ok(YearFilter::Exact(parse_year(s)?))
    }
}

impl fmt::Display for YearFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearFilter::Exact(y) => write!(f, "{y}"),
            YearFilter::After(y) => write!(f, ">{y}"),
            YearFilter::Before(y) => write!(f, "<{y}"),
            YearFilter::Range(lo, hi) => write!(f, "{lo}-{hi}"),
        }
    }
}

/// Conjunction of constraints over the works index. Pipes mean OR inside a
/// single upstream filter clause; commas between clauses mean AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorksFilter {
    /// Free-text groups searched over title/abstract; ANDed together by the
    /// upstream search semantics.
    pub keyword_groups: Vec<String>,
    /// Resolved author ids, ORed.
    pub author_ids: Vec<String>,
    pub years: Vec<YearFilter>,
    /// Institution display names, ORed via display-name search.
    pub institutions: Vec<String>,
    /// Source (journal) ids, ORed.
    pub source_ids: Vec<String>,
    /// Concept/topic ids, ORed.
    pub concept_ids: Vec<String>,
}

impl WorksFilter {
    pub fn from_keywords(keywords: &[String]) -> Self {
        Self {
            keyword_groups: keywords.to_vec(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keyword_groups.is_empty()
            && self.author_ids.is_empty()
            && self.years.is_empty()
            && self.institutions.is_empty()
            && self.source_ids.is_empty()
            && self.concept_ids.is_empty()
    }

    fn search_text(&self) -> Option<String> {
        if self.keyword_groups.is_empty() {
            None
        } else {
            Some(self.keyword_groups.join(" "))
        }
    }

    fn sort_param(&self, sort: SortOrder) -> &'static str {
        match sort {
            SortOrder::Recency => "publication_date:desc",
            // The upstream rejects relevance sorts without search text, so
            // pure-filter queries fall back to citation order.
            SortOrder::Relevance if self.search_text().is_some() => "relevance_score:desc",
            SortOrder::Relevance => "cited_by_count:desc",
        }
    }

    /// Render the query pairs for a works search. The caller adds the
    /// `mailto` identity and the field selection.
    pub fn to_query(&self, sort: SortOrder, page: u32, per_page: u32) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), page.to_string()),
            ("per-page".to_string(), per_page.to_string()),
            ("sort".to_string(), self.sort_param(sort).to_string()),
        ];

        let mut filters: Vec<String> = Vec::new();

        if !self.author_ids.is_empty() {
            filters.push(format!(
                "authorships.author.id:{}",
                self.author_ids.join("|")
            ));
            // With author-id filters in play the text search rides along as
            // a filter clause instead of the search parameter.
            if let Some(text) = self.search_text() {
                filters.push(format!("default.search:{text}"));
            }
        } else if let Some(text) = self.search_text() {
            params.push(("search".to_string(), text));
        }

        let mut exact_years: Vec<String> = Vec::new();
        for year in &self.years {
            match year {
                YearFilter::Exact(y) => exact_years.push(y.to_string()),
                other => filters.push(format!("publication_year:{other}")),
            }
        }
        if !exact_years.is_empty() {
            filters.push(format!("publication_year:{}", exact_years.join("|")));
        }

        if !self.institutions.is_empty() {
            filters.push(format!(
                "institutions.display_name.search:\"{}\"",
                self.institutions.join("|")
            ));
        }

        if !self.source_ids.is_empty() {
            filters.push(format!(
                "primary_location.source.id:{}",
                self.source_ids.join("|")
            ));
        }

        if !self.concept_ids.is_empty() {
            filters.push(format!("concepts.id:{}", self.concept_ids.join("|")));
        }

        if !filters.is_empty() {
            params.push(("filter".to_string(), filters.join(",")));
        }

        params
    }

    /// Canonical string over every input that defines the response; feeds
    /// the request fingerprint.
    pub fn canonical(&self, sort: SortOrder, page: u32, per_page: u32) -> String {
        self.to_query(sort, page, per_page)
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}
