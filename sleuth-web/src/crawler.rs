//! Concurrent page extraction with per-page moderation.
//!
//! Every URL is fetched, pruned, converted to Markdown, cleaned and then
//! screened by the [`ModerationGate`]. Failures never propagate: each URL
//! yields an [`ExtractionResult`], and a URL whose task dies is left out of
//! the batch without affecting its siblings.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use sleuth_common::{Result, SleuthError};
use sleuth_http::{HttpClient, RequestOpts};
use sleuth_llm::guard::ModerationGate;
use tracing::{debug, error, info, warn};

use crate::extract::{
    PruningFilter, clean_content, extract_title, html_to_markdown, prune_html, truncate_chars,
};
use crate::model::ExtractionResult;

const FETCH_FAILED: &str = "Failed to fetch content from URL";
const EMPTY_CONTENT: &str = "No content extracted from URL";
const BLOCKED: &str = "Content blocked by moderation";

/// A fetched page body.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub content_type: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// [`PageFetcher`] over plain HTTP GET.
pub struct HttpFetcher {
    http: HttpClient,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        // Page fetches always pass absolute URLs; the base is never joined.
        let http = HttpClient::new("http://localhost/")
            .and_then(|c| c.with_user_agent(user_agent))
            .map_err(|e| SleuthError::Config(format!("page fetcher init failed: {e}")))?
            .with_timeout(timeout)
            .with_retries(1);
        Ok(Self { http })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SleuthError::Extraction(format!("invalid URL '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SleuthError::Extraction(format!(
                "unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let page = self
            .http
            .get_text(
                parsed.as_str(),
                RequestOpts {
                    allow_absolute: true,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SleuthError::Extraction(e.to_string()))?;

        Ok(FetchedPage {
            url: page.final_url,
            content_type: page.content_type,
            body: page.body,
        })
    }
}

/// Knobs for the Markdown pruning pass.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub pruning: bool,
    pub min_block_words: usize,
    pub max_link_density: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        let filter = PruningFilter::default();
        Self {
            pruning: true,
            min_block_words: filter.min_words,
            max_link_density: filter.max_link_density,
        }
    }
}

#[derive(Clone)]
pub struct ContentExtractor {
    fetcher: Arc<dyn PageFetcher>,
    gate: ModerationGate,
    options: ExtractOptions,
}

impl ContentExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, gate: ModerationGate) -> Self {
        Self {
            fetcher,
            gate,
            options: ExtractOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Extract one URL. Never fails; problems are reported in the result.
    pub async fn extract_content(&self, url: &str, content_filter: Option<&str>) -> ExtractionResult {
        info!(%url, "Extracting content");

        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                warn!(%url, error = %e, "extract.fetch_failed");
                return ExtractionResult::failed(url, FETCH_FAILED);
            }
        };

        if let Some(ct) = page.content_type.as_deref() {
            if !is_textual(ct) {
                return ExtractionResult::failed(url, format!("Unsupported content type: {ct}"));
            }
        }

        let title = extract_title(&page.body);
        let markdown = match html_to_markdown(&prune_html(&page.body)) {
            Ok(md) => md,
            Err(e) => {
                error!(%url, error = %e, "Content extraction failed");
                return ExtractionResult::failed(url, e.to_string());
            }
        };

        let filtered = if self.options.pruning {
            let mut filter = PruningFilter::new(content_filter);
            filter.min_words = self.options.min_block_words;
            filter.max_link_density = self.options.max_link_density;
            filter.apply(&markdown)
        } else {
            markdown
        };

        let cleaned = clean_content(&filtered);
        if cleaned.is_empty() {
            return ExtractionResult::failed(url, EMPTY_CONTENT);
        }
        info!(%url, chars = cleaned.chars().count(), "Successfully extracted content");

        // Only text the gate actually screened may leave as a success.
        let cleaned = match self.gate.max_chars() {
            Some(max) if cleaned.chars().count() > max => {
                debug!(%url, max, "extract.trimmed_to_screening_window");
                truncate_chars(&cleaned, max).to_string()
            }
            _ => cleaned,
        };

        match self.gate.check(&cleaned).await {
            Ok(verdict) if verdict.is_blocked() => {
                warn!(%url, score = verdict.score(), "extract.blocked");
                ExtractionResult::failed(url, BLOCKED)
            }
            Ok(verdict) => {
                debug!(%url, score = verdict.score(), "extract.allowed");
                ExtractionResult::ok(url, cleaned, title)
            }
            Err(e) => {
                error!(%url, error = %e, "extract.moderation_failed");
                ExtractionResult::failed(url, e.to_string())
            }
        }
    }

    /// Extract many URLs concurrently, one task per distinct URL.
    pub async fn extract_multiple(
        &self,
        urls: &[String],
        content_filter: Option<&str>,
    ) -> BTreeMap<String, ExtractionResult> {
        if urls.is_empty() {
            return BTreeMap::new();
        }

        info!(count = urls.len(), "Extracting content from URLs");

        let distinct = distinct_urls(urls);
        let handles: Vec<_> = distinct
            .iter()
            .map(|url| {
                let this = self.clone();
                let url = url.to_string();
                let filter = content_filter.map(str::to_string);
                tokio::spawn(async move {
                    let result = this.extract_content(&url, filter.as_deref()).await;
                    (url, result)
                })
            })
            .collect();

        let mut results = BTreeMap::new();
        for joined in join_all(handles).await {
            match joined {
                Ok((url, result)) => {
                    results.insert(url, result);
                }
                Err(e) => error!(error = %e, "Extraction task failed"),
            }
        }

        let successful = results.values().filter(|r| r.is_success()).count();
        info!(
            "Content extraction completed: {}/{} successful",
            successful,
            distinct.len()
        );
        results
    }
}

/// First occurrence of each URL, in input order.
fn distinct_urls(urls: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    urls.iter()
        .map(String::as_str)
        .filter(|u| seen.insert(*u))
        .collect()
}

fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime.starts_with("text/") || mime.contains("html") || mime.contains("xml")
}
