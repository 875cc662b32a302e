//! Embedding provider abstraction used by the embedding service.
//!
//! Implementations call a remote OpenAI-compatible endpoint (`remote.rs`),
//! an in-process model (`local.rs`) or the deterministic hash embedder
//! (`placeholder.rs`). [`FallbackChain`] tries them in order. Every provider
//! of one chain must return vectors of the same dimensionality.

use anyhow::Result;
use async_trait::async_trait;

pub mod chain;
pub mod local;
pub mod placeholder;
pub mod remote;

pub use chain::{FallbackChain, TaggedBatch};
pub use local::LocalProvider;
pub use placeholder::PlaceholderProvider;
pub use remote::HttpProvider;

#[async_trait]
pub trait EmbedProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g., `remote:text-embedding-3-small:d1536`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    /// Compute embeddings for a batch of input texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Result of running one tier of the chain on one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Success(Vec<Vec<f32>>),
    /// Vectors were produced, but by a tier that carries no semantic meaning.
    Degraded(Vec<Vec<f32>>),
    Failed(String),
}
