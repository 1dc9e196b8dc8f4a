//! The text-generation capability.

use async_trait::async_trait;

use crate::error::Result;

/// Opaque text generation, used both to score candidates and to answer.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Identifier recorded in model usage entries.
    fn model_id(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Rough token estimate: whitespace-separated words.
pub fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}
