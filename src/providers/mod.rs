//! External provider abstractions
//!
//! The LLM used for extraction and pruning, and the embedders, are
//! capability interfaces with an `available()` probe. When a provider is
//! unavailable the affected command degrades: embeddings stay queued,
//! recall falls back to keyword search, extraction is skipped cleanly.

mod embedding;
mod llm;

pub use embedding::{create_primary_embedder, LocalEmbedder};
pub use llm::CommandLlm;

use async_trait::async_trait;

use crate::error::Result;

/// A text-completion capability (the extractor and the prune judge)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Whether the provider can be invoked at all
    fn available(&self) -> bool;

    /// Run one prompt to completion
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// A dense-embedding capability for prose memories
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn available(&self) -> bool;

    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, one vector per input
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;
}
