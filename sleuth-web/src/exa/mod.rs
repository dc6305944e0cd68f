//! Exa web search.
//!
//! - `types`: request options, categories, validation, wire format
//! - `client`: HTTP client for `/search` with contents

pub mod client;
pub mod types;

pub use client::{EXA_BASE_URL, ExaSearch};
pub use types::{Category, QueryInput, SearchError, SearchParams, SearchType, SubpageTarget};
