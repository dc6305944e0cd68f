use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::SearchResult;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("{0}")]
    InvalidParams(String),

    #[error("EXA API key must be provided or set in EXA_API_KEY environment variable")]
    MissingApiKey,

    #[error("EXA search failed: {0}")]
    Api(String),
}

impl From<SearchError> for sleuth_common::SleuthError {
    fn from(e: SearchError) -> Self {
        sleuth_common::SleuthError::Search(e.to_string())
    }
}

/// Exa retrieval strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Auto,
    Neural,
    Keyword,
}

impl FromStr for SearchType {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "neural" => Ok(Self::Neural),
            "keyword" => Ok(Self::Keyword),
            _ => Err(SearchError::InvalidParams(
                "search_type must be 'auto', 'neural', or 'keyword'".into(),
            )),
        }
    }
}

/// Data category the search should focus on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "company")]
    Company,
    #[serde(rename = "research paper")]
    ResearchPaper,
    #[serde(rename = "news")]
    News,
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "github")]
    Github,
    #[serde(rename = "tweet")]
    Tweet,
    #[serde(rename = "personal site")]
    PersonalSite,
    #[serde(rename = "linkedin profile")]
    LinkedinProfile,
    #[serde(rename = "financial report")]
    FinancialReport,
}

impl Category {
    const ALL: [Category; 9] = [
        Category::Company,
        Category::ResearchPaper,
        Category::News,
        Category::Pdf,
        Category::Github,
        Category::Tweet,
        Category::PersonalSite,
        Category::LinkedinProfile,
        Category::FinancialReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Company => "company",
            Category::ResearchPaper => "research paper",
            Category::News => "news",
            Category::Pdf => "pdf",
            Category::Github => "github",
            Category::Tweet => "tweet",
            Category::PersonalSite => "personal site",
            Category::LinkedinProfile => "linkedin profile",
            Category::FinancialReport => "financial report",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| SearchError::InvalidParams(format!("unknown category '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubpageTarget {
    #[default]
    Sources,
    Links,
}

/// Options for a single search. Defaults mirror a plain "auto" search for
/// five results with page text included.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub search_type: SearchType,
    pub category: Option<Category>,
    pub num_results: u32,
    pub include_domains: Vec<String>,
    pub exclude_domains: Vec<String>,
    /// ISO 8601 bounds.
    pub start_crawl_date: Option<String>,
    pub end_crawl_date: Option<String>,
    pub start_published_date: Option<String>,
    pub end_published_date: Option<String>,
    pub include_text: Vec<String>,
    pub exclude_text: Vec<String>,
    pub include_contents: bool,
    pub summary_query: Option<String>,
    pub subpages: u32,
    pub subpage_target: SubpageTarget,
    pub include_links: bool,
    pub include_image_links: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            search_type: SearchType::Auto,
            category: None,
            num_results: 5,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
            start_crawl_date: None,
            end_crawl_date: None,
            start_published_date: None,
            end_published_date: None,
            include_text: Vec::new(),
            exclude_text: Vec::new(),
            include_contents: true,
            summary_query: None,
            subpages: 0,
            subpage_target: SubpageTarget::Sources,
            include_links: false,
            include_image_links: false,
        }
    }
}

impl SearchParams {
    pub fn validate(&self, query: &str) -> Result<(), SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidParams("Query cannot be empty".into()));
        }
        self.validate_bounds()
    }

    /// The query-independent half of [`Self::validate`].
    pub fn validate_bounds(&self) -> Result<(), SearchError> {
        if !(1..=100).contains(&self.num_results) {
            return Err(SearchError::InvalidParams(
                "num_results must be between 1 and 100".into(),
            ));
        }
        if self.subpages > 5 {
            return Err(SearchError::InvalidParams(
                "subpages must be between 0 and 5".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn to_request<'a>(&'a self, query: &'a str) -> ExaSearchRequest<'a> {
        let extras = (self.include_links || self.include_image_links).then_some(ExaExtras {
            links: self.include_links.then_some(1),
            image_links: self.include_image_links.then_some(1),
        });

        ExaSearchRequest {
            query: query.trim(),
            search_type: self.search_type,
            category: self.category,
            num_results: self.num_results,
            include_domains: &self.include_domains,
            exclude_domains: &self.exclude_domains,
            start_crawl_date: self.start_crawl_date.as_deref(),
            end_crawl_date: self.end_crawl_date.as_deref(),
            start_published_date: self.start_published_date.as_deref(),
            end_published_date: self.end_published_date.as_deref(),
            include_text: &self.include_text,
            exclude_text: &self.exclude_text,
            contents: ExaContents {
                text: self.include_contents,
                summary: self
                    .summary_query
                    .as_deref()
                    .map(|query| ExaSummary { query }),
                subpages: (self.subpages > 0).then_some(self.subpages),
                subpage_target: (self.subpages > 0).then_some(self.subpage_target),
                extras,
            },
        }
    }
}

/// Either one query or a batch of queries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum QueryInput {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for QueryInput {
    fn from(q: &str) -> Self {
        QueryInput::One(q.to_string())
    }
}

impl From<Vec<String>> for QueryInput {
    fn from(qs: Vec<String>) -> Self {
        QueryInput::Many(qs)
    }
}

// ==============================
// Wire format
// ==============================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExaSearchRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    search_type: SearchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<Category>,
    num_results: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    include_domains: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    exclude_domains: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    start_crawl_date: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_crawl_date: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_published_date: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_published_date: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    include_text: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    exclude_text: &'a [String],
    contents: ExaContents<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExaContents<'a> {
    text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ExaSummary<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subpages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subpage_target: Option<SubpageTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extras: Option<ExaExtras>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExaSummary<'a> {
    query: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExaExtras {
    #[serde(skip_serializing_if = "Option::is_none")]
    links: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_links: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExaSearchResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExaResult {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

impl From<ExaResult> for SearchResult {
    fn from(r: ExaResult) -> Self {
        SearchResult {
            title: r
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "No title".to_string()),
            url: r.url,
            published_date: r.published_date,
            author: r.author,
            score: r.score.unwrap_or(0.0),
            text: r.text,
            summary: r.summary,
        }
    }
}
