use serde::{Deserialize, Serialize};

/// One hit returned by the search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub published_date: Option<String>,
    pub author: Option<String>,
    pub score: f64,
    pub text: Option<String>,
    pub summary: Option<String>,
}

/// Outcome of extracting a single URL.
///
/// Built only through [`ExtractionResult::ok`] and [`ExtractionResult::failed`],
/// so a successful result always carries content and never an error, and a
/// failed one always carries an error and never content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    url: String,
    success: bool,
    content: Option<String>,
    title: Option<String>,
    error: Option<String>,
}

impl ExtractionResult {
    pub fn ok(url: impl Into<String>, content: String, title: Option<String>) -> Self {
        Self {
            url: url.into(),
            success: true,
            content: Some(content),
            title,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            success: false,
            content: None,
            title: None,
            error: Some(error.into()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
