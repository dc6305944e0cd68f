//! Common types and utilities shared across Sleuth crates.
//!
//! This crate defines the shared error type and the logging bootstrap used by
//! every binary and integration test in the workspace. It is intentionally
//! lightweight so that all crates can depend on it without introducing heavy
//! transitive costs.
//!
//! # Overview
//!
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`SleuthError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! ```rust
//! use sleuth_common::SleuthError;
//!
//! let err = SleuthError::Search("query cannot be empty".into());
//! assert_eq!(err.to_string(), "Search error: query cannot be empty");
//! ```

pub mod observability;

/// Error types used across the Sleuth system.
#[derive(thiserror::Error, Debug)]
pub enum SleuthError {
    /// The agent loop or an LLM provider failed to complete a request.
    #[error("Agent error: {0}")]
    Agent(String),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The moderation model could not produce a usable score.
    #[error("Moderation error: {0}")]
    Moderation(String),

    /// The search provider rejected or failed a query.
    #[error("Search error: {0}")]
    Search(String),

    /// Page content could not be fetched or converted.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Operation exceeded the configured timeout.
    #[error("Timeout occurred")]
    Timeout,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenient alias for results that use [`SleuthError`].
pub type Result<T> = std::result::Result<T, SleuthError>;
