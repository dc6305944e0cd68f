use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sleuth_common::{Result, SleuthError};
use sleuth_llm::agent::{Tool, ToolDeclaration};
use tracing::info;

use crate::crawler::ContentExtractor;
use crate::exa::{ExaSearch, QueryInput, SearchError, SearchParams};
use crate::extract::truncate_chars;
use crate::model::SearchResult;

pub const SEARCH_TOOL_NAME: &str = "search";

/// Agent tool: web search followed by content extraction of every hit.
pub struct SearchTool {
    exa: ExaSearch,
    extractor: ContentExtractor,
    defaults: SearchParams,
    content_filter: Option<String>,
    max_page_chars: usize,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: QueryInput,
    #[serde(default)]
    num_results: Option<i64>,
}

/// One successfully extracted page as handed to the model.
#[derive(Debug, Serialize)]
struct PageContent<'a> {
    url: &'a str,
    title: &'a str,
    published_date: Option<&'a str>,
    author: Option<&'a str>,
    content: &'a str,
}

impl SearchTool {
    pub fn new(exa: ExaSearch, extractor: ContentExtractor, defaults: SearchParams) -> Self {
        Self {
            exa,
            extractor,
            defaults,
            content_filter: None,
            max_page_chars: 12_000,
        }
    }

    /// Query used to prune page content before moderation.
    pub fn with_content_filter(mut self, filter: Option<String>) -> Self {
        self.content_filter = filter;
        self
    }

    pub fn with_max_page_chars(mut self, max: usize) -> Self {
        self.max_page_chars = max;
        self
    }

    fn params_for(&self, num_results: Option<i64>) -> std::result::Result<SearchParams, SearchError> {
        let mut params = self.defaults.clone();
        if let Some(n) = num_results {
            params.num_results = u32::try_from(n).map_err(|_| {
                SearchError::InvalidParams("num_results must be between 1 and 100".into())
            })?;
        }
        Ok(params)
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: SEARCH_TOOL_NAME.into(),
            description: "Search the web for the given query and return content from results.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "The original question followed by its sub-questions. A single query is also accepted."
                    },
                    "num_results": {
                        "type": "integer",
                        "description": "Number of search results to retrieve per query (1-100).",
                        "default": 5
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let args: SearchArgs = serde_json::from_value(args)
            .map_err(|e| SleuthError::Search(format!("invalid search arguments: {e}")))?;
        let params = self.params_for(args.num_results)?;

        info!(query = ?args.query, "Searching");
        let hits = self.exa.search_any(&args.query, &params).await?;

        let mut seen = HashSet::new();
        let hits: Vec<SearchResult> = hits
            .into_iter()
            .filter(|h| seen.insert(h.url.clone()))
            .collect();
        let urls: Vec<String> = hits.iter().map(|h| h.url.clone()).collect();

        info!(count = urls.len(), "Extracting content from search hits");
        let extracted = self
            .extractor
            .extract_multiple(&urls, self.content_filter.as_deref())
            .await;

        let pages: Vec<PageContent<'_>> = hits
            .iter()
            .filter_map(|hit| {
                let result = extracted.get(&hit.url)?;
                let content = result.content()?;
                Some(PageContent {
                    url: &hit.url,
                    title: result.title().unwrap_or(&hit.title),
                    published_date: hit.published_date.as_deref(),
                    author: hit.author.as_deref(),
                    content: truncate_chars(content, self.max_page_chars),
                })
            })
            .collect();

        let failed = urls.len() - pages.len();
        Ok(json!({ "results": pages, "failed": failed }))
    }
}
