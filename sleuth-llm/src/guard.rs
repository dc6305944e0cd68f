//! Moderation gate for prompts and retrieved pages.
//!
//! A [`Moderator`] turns text into an unsafe-content score. The
//! [`ModerationGate`] compares that score against a threshold and returns a
//! two-branch [`Verdict`]; the same gate screens the user's prompt and every
//! extracted page.

use crate::traits::LlmClient;
use async_trait::async_trait;
use sleuth_common::{Result, SleuthError};
use std::sync::Arc;

/// Scores strictly above this value are blocked.
pub const DEFAULT_BLOCK_THRESHOLD: f64 = 0.6;

/// Produces an unsafe-content likelihood for a piece of text.
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn score(&self, text: &str) -> Result<f64>;

    /// Longest text, in chars, the moderator can score in full. `None` means unbounded.
    fn max_chars(&self) -> Option<usize> {
        None
    }
}

/// Outcome of a moderation check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Allow { score: f64 },
    Block { score: f64 },
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Block { .. })
    }

    pub fn score(&self) -> f64 {
        match self {
            Verdict::Allow { score } | Verdict::Block { score } => *score,
        }
    }
}

#[derive(Clone)]
pub struct ModerationGate {
    moderator: Arc<dyn Moderator>,
    threshold: f64,
}

impl ModerationGate {
    pub fn new(moderator: Arc<dyn Moderator>, threshold: f64) -> Self {
        Self {
            moderator,
            threshold,
        }
    }

    /// Callers must not treat text past this many chars as screened.
    pub fn max_chars(&self) -> Option<usize> {
        self.moderator.max_chars()
    }

    /// Classify a score without calling the moderator.
    pub fn verdict(&self, score: f64) -> Verdict {
        if score > self.threshold {
            Verdict::Block { score }
        } else {
            Verdict::Allow { score }
        }
    }

    pub async fn check(&self, text: &str) -> Result<Verdict> {
        let score = self.moderator.score(text).await?;
        let verdict = self.verdict(score);
        tracing::debug!(score, threshold = self.threshold, blocked = verdict.is_blocked(), "moderation.check");
        Ok(verdict)
    }
}

/// [`Moderator`] backed by a prompt-guard classifier served over a chat API.
///
/// The classifier replies with a bare number. Text longer than `chunk_chars`
/// is scored chunk by chunk and the highest score wins; scoring stops at the
/// first chunk above `stop_above`. Text needing more than `max_chunks` chunks
/// is refused with a moderation error rather than partially screened.
pub struct PromptGuard {
    client: Arc<dyn LlmClient>,
    chunk_chars: usize,
    max_chunks: usize,
    stop_above: f64,
}

impl PromptGuard {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            chunk_chars: 2000,
            max_chunks: 8,
            stop_above: DEFAULT_BLOCK_THRESHOLD,
        }
    }

    pub fn with_chunking(mut self, chunk_chars: usize, max_chunks: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self.max_chunks = max_chunks.max(1);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.stop_above = threshold;
        self
    }

    async fn score_chunk(&self, chunk: &str) -> Result<f64> {
        let resp = self
            .client
            .generate(chunk, None, Some(100), Some(1.0))
            .await
            .map_err(|e| SleuthError::Moderation(format!("guard request failed: {e}")))?;
        parse_score(&resp.text)
    }
}

#[async_trait]
impl Moderator for PromptGuard {
    async fn score(&self, text: &str) -> Result<f64> {
        if text.trim().is_empty() {
            return Ok(0.0);
        }

        let chunks = split_chunks(text, self.chunk_chars);
        if chunks.len() > self.max_chunks {
            tracing::warn!(
                chunks = chunks.len(),
                max_chunks = self.max_chunks,
                "moderation.too_long"
            );
            return Err(SleuthError::Moderation(format!(
                "text exceeds the {} char screening window",
                self.chunk_chars * self.max_chunks
            )));
        }

        let mut max = 0.0_f64;
        for chunk in chunks {
            let score = self.score_chunk(chunk).await?;
            max = max.max(score);
            if max > self.stop_above {
                break;
            }
        }
        Ok(max)
    }

    fn max_chars(&self) -> Option<usize> {
        Some(self.chunk_chars.saturating_mul(self.max_chunks))
    }
}

/// Parse the classifier's reply as a finite float.
pub fn parse_score(reply: &str) -> Result<f64> {
    let trimmed = reply.trim();
    match trimmed.parse::<f64>() {
        Ok(score) if score.is_finite() => Ok(score),
        _ => Err(SleuthError::Moderation(format!(
            "guard returned a non-numeric score: {trimmed:?}"
        ))),
    }
}

fn split_chunks(text: &str, size: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (count, (idx, _)) in text.char_indices().enumerate() {
        if count > 0 && count % size == 0 {
            out.push(&text[start..idx]);
            start = idx;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}
