//! Web search and page acquisition.
//!
//! - Exa search API client (`exa`) for discovery
//! - HTML pruning, Markdown conversion and cleanup (`extract`)
//! - Concurrent, moderated page extraction (`crawler`)
//! - The `search` tool exposed to the agent (`tool`)

pub mod crawler;
pub mod exa;
pub mod extract;
pub mod model;
pub mod tool;

pub use crawler::{ContentExtractor, HttpFetcher, PageFetcher};
pub use model::{ExtractionResult, SearchResult};
pub use tool::SearchTool;
