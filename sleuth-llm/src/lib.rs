//! Provider-agnostic LLM integration for Sleuth.
//!
//! This crate exposes a common [`traits::LlmClient`] interface with Gemini
//! and OpenAI-compatible implementations, the prompt-guard moderation gate
//! in [`guard`], and the function-calling [`agent`] loop.
//!
//! # Examples
//! ```no_run
//! use sleuth_common::Result;
//! use sleuth_llm::guard::{ModerationGate, PromptGuard, DEFAULT_BLOCK_THRESHOLD};
//! use sleuth_llm::openai::OpenAiClient;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let groq = OpenAiClient::new("gsk-...".into(), "meta-llama/llama-prompt-guard-2-86m".into())?
//!     .with_top_p(1.0);
//! let gate = ModerationGate::new(
//!     Arc::new(PromptGuard::new(Arc::new(groq))),
//!     DEFAULT_BLOCK_THRESHOLD,
//! );
//! let verdict = gate.check("What is the boiling point of water?").await?;
//! assert!(!verdict.is_blocked());
//! # Ok(())
//! # }
//! ```
pub mod agent;
pub mod gemini;
pub mod guard;
pub mod openai;
pub mod traits;

pub use agent::{Agent, AgentResponse, Tool, ToolDeclaration, ToolModel};
pub use guard::{ModerationGate, Moderator, Verdict};
