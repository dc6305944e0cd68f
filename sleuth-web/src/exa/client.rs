use super::types::{ExaSearchResponse, QueryInput, SearchError, SearchParams};
use crate::model::SearchResult;
use futures::future::join_all;
use reqwest::header::{HeaderName, HeaderValue};
use sleuth_http::{Auth, HttpClient, RequestOpts};
use std::time::Instant;

pub const EXA_BASE_URL: &str = "https://api.exa.ai/";

/// Minimal client for Exa's `/search` endpoint with contents.
#[derive(Clone)]
pub struct ExaSearch {
    http: HttpClient,
    api_key: String,
}

impl ExaSearch {
    /// Build a client, falling back to `EXA_API_KEY` when no key is given.
    pub fn new(api_key: Option<String>) -> Result<Self, SearchError> {
        Self::with_base(EXA_BASE_URL, api_key)
    }

    pub fn with_base(base: &str, api_key: Option<String>) -> Result<Self, SearchError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("EXA_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or(SearchError::MissingApiKey)?;

        let http = HttpClient::new(base).map_err(|e| SearchError::Api(e.to_string()))?;
        tracing::info!(target: "web.exa", "exa.client.ready");
        Ok(Self { http, api_key })
    }

    pub async fn search(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>, SearchError> {
        params.validate(query)?;

        let started = Instant::now();
        tracing::info!(
            target: "web.exa",
            query = %query,
            num_results = params.num_results,
            search_type = ?params.search_type,
            "exa.search.start"
        );

        let value = HeaderValue::from_str(self.api_key.trim())
            .map_err(|e| SearchError::Api(format!("invalid api key header: {e}")))?;
        let opts = RequestOpts {
            auth: Some(Auth::Header {
                name: HeaderName::from_static("x-api-key"),
                value,
            }),
            ..Default::default()
        };

        let resp: ExaSearchResponse = match self
            .http
            .post_json_opts("search", &params.to_request(query), opts)
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(target: "web.exa", query = %query, error = %e, "exa.search.failed");
                return Err(SearchError::Api(e.to_string()));
            }
        };

        let results: Vec<SearchResult> = resp.results.into_iter().map(Into::into).collect();
        tracing::info!(
            target: "web.exa",
            query = %query,
            hits = results.len(),
            request_id = ?resp.request_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "exa.search.done"
        );
        Ok(results)
    }

    /// Run every query concurrently and flatten the hits in query order.
    ///
    /// Failed queries are logged and contribute nothing. Out-of-range
    /// params fail every query alike, so they short-circuit the batch.
    pub async fn multi_search(&self, queries: &[String], params: &SearchParams) -> Vec<SearchResult> {
        if queries.is_empty() {
            return Vec::new();
        }
        if let Err(e) = params.validate_bounds() {
            tracing::error!(target: "web.exa", error = %e, "exa.multi_search.invalid_params");
            return Vec::new();
        }

        tracing::info!(target: "web.exa", count = queries.len(), "exa.multi_search.start");
        let outcomes = join_all(queries.iter().map(|q| self.search(q, params))).await;

        let mut flattened = Vec::new();
        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(hits) => flattened.extend(hits),
                Err(e) => {
                    tracing::error!(target: "web.exa", query = %query, error = %e, "exa.multi_search.query_failed");
                }
            }
        }

        tracing::info!(target: "web.exa", results = flattened.len(), "exa.multi_search.done");
        flattened
    }

    /// A non-empty batch goes through [`Self::multi_search`], a single query
    /// through [`Self::search`].
    pub async fn search_any(
        &self,
        input: &QueryInput,
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>, SearchError> {
        match input {
            QueryInput::Many(queries) if !queries.is_empty() => {
                params.validate_bounds()?;
                Ok(self.multi_search(queries, params).await)
            }
            QueryInput::Many(_) => Err(SearchError::InvalidParams("Query cannot be empty".into())),
            QueryInput::One(query) => self.search(query, params).await,
        }
    }
}
