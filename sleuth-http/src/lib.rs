//! Minimal HTTP client with safe logging, retries, and flexible auth.
//!
//! - Request options: headers, `Auth`, query params, timeout, retries
//! - Redacts sensitive query params and never logs secret values
//! - Retries network failures, 429 and 5xx with exponential backoff and a bounded `Retry-After`
//! - JSON helpers for provider APIs and a text helper for fetching pages
//! - Optional *raw* request/response logging via `SLEUTH_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), sleuth_http::HttpError> {
//! let client = sleuth_http::HttpClient::new("https://api.example.com")?;
//! let got: serde_json::Value = client
//!     .get_json("v1/items", sleuth_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! Security: `Auth::Bearer` values are sanitized before use, and logs only
//! ever include the auth kind (bearer/header/query/none), not the secret.
//!
//! Observability: structured `tracing` events are emitted for request start,
//! response headers, body snippets (truncated), retries, final errors, and
//! (optionally) raw request/response lines (target `http.raw`).

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "SLEUTH_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;
const SNIPPET_MAX: usize = 500;
/// Upper bound on an honoured `Retry-After`; the request timeout bounds it too.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn is_secret_param(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "access_token"
            | "authorization"
            | "auth"
            | "key"
            | "api_key"
            | "apikey"
            | "x-api-key"
            | "token"
            | "secret"
            | "client_secret"
            | "bearer"
    )
}

fn redact_pairs(pairs: &[(&str, Cow<'_, str>)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| {
            let shown = if is_secret_param(k) {
                "<redacted>".to_string()
            } else {
                v.as_ref().to_string()
            };
            ((*k).to_string(), shown)
        })
        .collect()
}

/// Render a best-effort curl command for repro/debug, with secrets redacted.
fn make_curl(
    method: &Method,
    url: &Url,
    query: &[(String, String)],
    headers: &HeaderMap,
    body: Option<&[u8]>,
) -> String {
    let mut parts = vec!["curl".to_string(), format!("-X{}", method)];
    for (name, val) in headers.iter() {
        let v = if is_secret_param(name.as_str()) {
            "<redacted>".to_string()
        } else {
            val.to_str().unwrap_or("").to_string()
        };
        parts.push(format!(
            "-H '{}: {}'",
            name.as_str(),
            v.replace('\'', r"'\''")
        ));
    }
    if let Some(bytes) = body {
        if let Ok(s) = std::str::from_utf8(bytes) {
            let mut s = s.to_string();
            if s.len() > RAW_MAX_BODY {
                truncate_at_char_boundary(&mut s, RAW_MAX_BODY);
                s.push('…');
            }
            parts.push(format!("-d '{}'", s.replace('\'', r"'\''")));
        } else {
            parts.push(format!("--data-binary @- # ({} bytes)", bytes.len()));
        }
    }
    let mut shown = url.clone();
    if !query.is_empty() {
        shown
            .query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    parts.push(format!("'{}'", shown.as_str()));
    parts.join(" ")
}

/// Redact sensitive headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let val = if key.eq_ignore_ascii_case("set-cookie") || is_secret_param(&key) {
                "<redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    /// HTTP status for `Api` errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ==============================
// Auth & Request Options
// ==============================

/// Authentication strategies supported by the HTTP client helpers.
///
/// ```
/// use sleuth_http::Auth;
///
/// let bearer = Auth::Bearer("token");
/// match bearer {
///     Auth::Bearer(value) => assert_eq!(value, "token"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Authorization: Bearer <token>
    Bearer(&'a str),
    /// Custom header (e.g., Exa: x-api-key)
    Header {
        name: HeaderName,
        value: HeaderValue,
    },
    /// Auth via query param (e.g., Gemini: key=...)
    Query {
        name: &'a str,
        value: Cow<'a, str>,
    },
    None,
}

impl Auth<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Auth::Bearer(_) => "bearer",
            Auth::Header { .. } => "header",
            Auth::Query { .. } => "query",
            Auth::None => "none",
        }
    }
}

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use sleuth_http::{Auth, RequestOpts};
/// use std::borrow::Cow;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     retries: Some(1),
///     auth: Some(Auth::Query {
///         name: "key",
///         value: Cow::Borrowed("demo"),
///     }),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(!opts.allow_absolute);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
    /// If true and `path` is an absolute URL, use it as-is (ignore base).
    pub allow_absolute: bool,
}

/// Body of a successful non-JSON request.
#[derive(Clone, Debug)]
pub struct TextResponse {
    pub status: StatusCode,
    /// URL after redirects.
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: String,
}

struct RawResponse {
    status: StatusCode,
    final_url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
    req_id: String,
}

/// A request with its options resolved, replayed on each attempt.
struct Prepared<'a> {
    method: Method,
    url: Url,
    body: Option<Vec<u8>>,
    query: Vec<(&'a str, Cow<'a, str>)>,
    redacted_query: Vec<(String, String)>,
    headers: Option<HeaderMap>,
    auth: Option<Auth<'a>>,
    bearer: Option<String>,
    timeout: Duration,
    max_retries: usize,
    req_id: String,
}

enum Attempt {
    Done(RawResponse),
    Retry {
        error: HttpError,
        retry_after: Option<Duration>,
        rate_limited: bool,
    },
    Fail(HttpError),
}

impl Attempt {
    fn transport(err: reqwest::Error) -> Self {
        Attempt::Retry {
            error: HttpError::Network(err.to_string()),
            retry_after: None,
            rate_limited: false,
        }
    }
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    user_agent: Option<HeaderValue>,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use sleuth_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            user_agent: None,
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// Send a fixed `User-Agent` with every request.
    pub fn with_user_agent(mut self, agent: &str) -> Result<Self, HttpError> {
        let value = HeaderValue::from_str(agent)
            .map_err(|e| HttpError::Build(format!("invalid user agent: {e}")))?;
        self.user_agent = Some(value);
        Ok(self)
    }

    /// POST JSON using optional Bearer auth.
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let opts = RequestOpts {
            auth: bearer.map(Auth::Bearer),
            ..Default::default()
        };
        self.request_json(Method::POST, path, Some(body), opts).await
    }

    /// GET JSON with per-request options (headers/query/auth/timeout/retries).
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.request_json::<(), T>(Method::GET, path, None, opts)
            .await
    }

    /// POST JSON with per-request options (headers/query/auth/timeout/retries).
    pub async fn post_json_opts<B, T>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(Method::POST, path, Some(body), opts).await
    }

    /// GET a page as text. Non-2xx responses surface as [`HttpError::Api`].
    pub async fn get_text(
        &self,
        path: &str,
        opts: RequestOpts<'_>,
    ) -> Result<TextResponse, HttpError> {
        let raw = self.execute(Method::GET, path, None, opts).await?;
        let content_type = raw
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(TextResponse {
            status: raw.status,
            final_url: raw.final_url.to_string(),
            content_type,
            body: String::from_utf8_lossy(&raw.body).into_owned(),
        })
    }

    async fn request_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body_bytes = match body {
            Some(b) => Some(serde_json::to_vec(b).map_err(|e| HttpError::Build(e.to_string()))?),
            None => None,
        };

        let raw = self.execute(method, path, body_bytes, opts).await?;

        serde_json::from_slice::<T>(&raw.body).map_err(|e| {
            let snippet = snip_body(&raw.body);
            tracing::warn!(
                req_id=%raw.req_id,
                serde_line=%e.line(),
                serde_col=%e.column(),
                serde_err=%e,
                body_snippet=%snippet,
                "http.response.decode_error"
            );
            HttpError::Decode(e.to_string(), snippet)
        })
    }

    fn resolve(&self, path: &str, allow_absolute: bool) -> Result<Url, HttpError> {
        if allow_absolute {
            if let Ok(abs) = Url::parse(path) {
                return Ok(abs);
            }
        }
        self.base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))
    }

    // ==============================
    // Core request implementation
    // ==============================

    fn prepare<'a>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        opts: RequestOpts<'a>,
    ) -> Result<Prepared<'a>, HttpError> {
        let url = self.resolve(path, opts.allow_absolute)?;

        let mut query = opts.query.unwrap_or_default();
        if let Some(Auth::Query { name, value }) = &opts.auth {
            query.push((*name, value.clone()));
        }
        let bearer = match &opts.auth {
            Some(Auth::Bearer(tok)) => Some(sanitize_api_key(tok)?),
            _ => None,
        };

        Ok(Prepared {
            redacted_query: redact_pairs(&query),
            method,
            url,
            body,
            query,
            headers: opts.headers,
            auth: opts.auth,
            bearer,
            timeout: opts.timeout.unwrap_or(self.default_timeout),
            max_retries: opts.retries.unwrap_or(self.max_retries),
            req_id: format!("r-{}", uuid::Uuid::new_v4().simple()),
        })
    }

    fn build(&self, p: &Prepared<'_>) -> RequestBuilder {
        let mut rb = self
            .inner
            .request(p.method.clone(), p.url.clone())
            .timeout(p.timeout);

        if !p.query.is_empty() {
            let pairs: Vec<(&str, &str)> = p.query.iter().map(|(k, v)| (*k, v.as_ref())).collect();
            rb = rb.query(&pairs);
        }
        if let Some(ua) = &self.user_agent {
            rb = rb.header(USER_AGENT, ua.clone());
        }
        if let Some(bytes) = &p.body {
            rb = rb.header(CONTENT_TYPE, "application/json").body(bytes.clone());
        }
        if let Some(hdrs) = &p.headers {
            rb = rb.headers(hdrs.clone());
        }
        // Query auth already rides along in `p.query`.
        match (&p.auth, &p.bearer) {
            (Some(Auth::Header { name, value }), _) => rb.header(name, value),
            (_, Some(tok)) => rb.bearer_auth(tok),
            _ => rb,
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        opts: RequestOpts<'_>,
    ) -> Result<RawResponse, HttpError> {
        let p = self.prepare(method, path, body, opts)?;
        let mut attempt = 0usize;

        loop {
            match self.send_once(&p, attempt).await {
                Attempt::Done(raw) => return Ok(raw),
                Attempt::Retry {
                    error,
                    retry_after,
                    rate_limited,
                } if attempt < p.max_retries => {
                    attempt += 1;
                    let delay = match retry_after {
                        Some(d) => d.min(p.timeout).min(MAX_RETRY_AFTER),
                        None if rate_limited => backoff(attempt).max(Duration::from_millis(1100)),
                        None => backoff(attempt),
                    };
                    tracing::warn!(
                        req_id=%p.req_id,
                        attempt,
                        max_retries=p.max_retries,
                        backoff_ms=delay.as_millis() as u64,
                        error=%error,
                        "http.retrying"
                    );
                    sleep(delay).await;
                }
                Attempt::Retry { error, .. } | Attempt::Fail(error) => {
                    tracing::warn!(req_id=%p.req_id, attempt, error=%error, "http.failed");
                    return Err(error);
                }
            }
        }
    }

    async fn send_once(&self, p: &Prepared<'_>, attempt: usize) -> Attempt {
        tracing::debug!(
            req_id=%p.req_id,
            attempt=attempt + 1,
            method=%p.method,
            host_path=%format!("{}{}", p.url.host_str().unwrap_or("-"), p.url.path()),
            query=?p.redacted_query,
            timeout_ms=p.timeout.as_millis() as u64,
            auth_kind=p.auth.as_ref().map(Auth::kind).unwrap_or("none"),
            has_body=%p.body.is_some(),
            "http.request.start"
        );
        if raw_enabled() {
            let headers = p.headers.clone().unwrap_or_default();
            let curl = make_curl(&p.method, &p.url, &p.redacted_query, &headers, p.body.as_deref());
            tracing::debug!(target: "http.raw", req_id=%p.req_id, %curl, "request");
        }

        let started = Instant::now();
        let resp = match self.build(p).send().await {
            Ok(resp) => resp,
            Err(err) => return Attempt::transport(err),
        };
        let status = resp.status();
        let final_url = resp.url().clone();
        let headers = resp.headers().clone();
        let body = match resp.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => return Attempt::transport(err),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        let upstream_id = upstream_request_id(&headers);

        tracing::debug!(
            req_id=%p.req_id,
            %status,
            duration_ms,
            body_len=body.len(),
            x_request_id=%upstream_id,
            "http.response.headers"
        );
        if raw_enabled() {
            let end = body.len().min(RAW_MAX_BODY);
            tracing::info!(
                target: "http.raw",
                req_id=%p.req_id,
                %status,
                duration_ms,
                headers=?redact_headers(&headers),
                body=%String::from_utf8_lossy(&body[..end]),
                truncated=body.len() > RAW_MAX_BODY
            );
        }

        if status.is_success() {
            return Attempt::Done(RawResponse {
                status,
                final_url,
                headers,
                body,
                req_id: p.req_id.clone(),
            });
        }

        tracing::debug!(req_id=%p.req_id, %status, body_snippet=%snip_body(&body), "http.response.error_body");
        let error = HttpError::Api {
            status,
            message: extract_error_message(&body),
            request_id: upstream_id,
        };
        let rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
        if rate_limited || status.is_server_error() {
            Attempt::Retry {
                error,
                retry_after: retry_after_delay_secs(&headers).map(Duration::from_secs),
                rate_limited,
            }
        } else {
            Attempt::Fail(error)
        }
    }
}

// ==============================
// Helpers
// ==============================

fn backoff(attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    Duration::from_millis(200u64.saturating_mul(1u64 << shift))
}

fn extract_error_message(body: &[u8]) -> String {
    // OpenAI/Groq style: {"error":{"message":"..."}}
    #[derive(Deserialize)]
    struct Envelope {
        error: Detail,
    }
    #[derive(Deserialize)]
    struct Detail {
        message: String,
    }

    // Generic: {"message":"..."} or {"detail":"..."} or {"error":"..."}
    #[derive(Deserialize)]
    struct Msg {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        error: String,
    }

    if let Ok(env) = serde_json::from_slice::<Envelope>(body) {
        return env.error.message;
    }
    if let Ok(m) = serde_json::from_slice::<Msg>(body) {
        for candidate in [m.message, m.detail, m.error] {
            if !candidate.is_empty() {
                return candidate;
            }
        }
    }
    snip_body(body)
}

fn upstream_request_id(h: &HeaderMap) -> String {
    h.get("x-request-id")
        .or_else(|| h.get("x-correlation-id"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > SNIPPET_MAX {
        truncate_at_char_boundary(&mut snip, SNIPPET_MAX);
        snip.push_str("...");
    }
    snip
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();

    s.retain(|ch| !ch.is_ascii_whitespace());

    if !s.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }

    HeaderValue::from_str(&format!("Bearer {}", s))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(s)
}
