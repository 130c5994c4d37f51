//! LLM completion client and types
//!
//! Supports both the Anthropic Messages API and OpenAI-compatible APIs.

mod client;
mod types;

use async_trait::async_trait;

use crate::Result;
use crate::session::Turn;

pub use client::LlmClient;
pub use types::*;

/// Produces an assistant reply for an ordered window of turns
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Any error is treated by callers as "unavailable now"
    async fn complete(&self, turns: &[Turn]) -> Result<String>;
}
