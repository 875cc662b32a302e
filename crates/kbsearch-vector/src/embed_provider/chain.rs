use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use kbsearch_core::types::EmbeddingSource;

use super::{EmbedProvider, PlaceholderProvider, StrategyOutcome};

struct Strategy {
    source: EmbeddingSource,
    provider: Arc<dyn EmbedProvider>,
}

/// Vectors for one batch plus the tier that produced them.
#[derive(Debug, Clone)]
pub struct TaggedBatch {
    pub vectors: Vec<Vec<f32>>,
    pub source: EmbeddingSource,
    /// Provider calls made, including failed ones. Placeholder substitution is not a call.
    pub attempts: usize,
    pub failures: Vec<(EmbeddingSource, String)>,
}

/// Ordered list of embedding tiers, tried until one succeeds.
///
/// The hash placeholder always closes the chain, so [`FallbackChain::embed`]
/// cannot fail: when every configured tier fails each text gets a placeholder
/// vector tagged [`EmbeddingSource::Placeholder`].
pub struct FallbackChain {
    strategies: Vec<Strategy>,
    placeholder: PlaceholderProvider,
    dim: usize,
    timeout: Duration,
}

impl FallbackChain {
    pub fn new(dim: usize, timeout: Duration) -> Self {
        Self { strategies: Vec::new(), placeholder: PlaceholderProvider::new(dim), dim, timeout }
    }

    /// Append a tier. Providers with the wrong dimensionality are skipped.
    #[must_use]
    pub fn with_strategy(mut self, source: EmbeddingSource, provider: Arc<dyn EmbedProvider>) -> Self {
        if provider.dim() != self.dim {
            warn!(
                provider = provider.embedder_id(),
                dim = provider.dim(),
                expected = self.dim,
                "skipping embedding provider with mismatched dimension"
            );
            return self;
        }
        self.strategies.push(Strategy { source, provider });
        self
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Source tag and model id of the first tier. Only its vectors are worth caching.
    pub fn primary(&self) -> (EmbeddingSource, &str) {
        match self.strategies.first() {
            Some(s) => (s.source, s.provider.embedder_id()),
            None => (EmbeddingSource::Placeholder, self.placeholder.embedder_id()),
        }
    }

    pub fn tiers(&self) -> Vec<(EmbeddingSource, String)> {
        self.strategies.iter().map(|s| (s.source, s.provider.embedder_id().to_string())).collect()
    }

    async fn run_strategy(&self, strategy: &Strategy, texts: &[String]) -> StrategyOutcome {
        let vectors = match tokio::time::timeout(self.timeout, strategy.provider.embed_batch(texts)).await {
            Err(_) => return StrategyOutcome::Failed(format!("timed out after {:?}", self.timeout)),
            Ok(Err(e)) => return StrategyOutcome::Failed(e.to_string()),
            Ok(Ok(v)) => v,
        };
        if vectors.len() != texts.len() {
            return StrategyOutcome::Failed(format!("returned {} vectors for {} texts", vectors.len(), texts.len()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return StrategyOutcome::Failed(format!("returned {} dims, expected {}", bad.len(), self.dim));
        }
        if strategy.source.is_degraded() {
            StrategyOutcome::Degraded(vectors)
        } else {
            StrategyOutcome::Success(vectors)
        }
    }

    pub async fn embed(&self, texts: &[String]) -> TaggedBatch {
        let mut failures = Vec::new();
        let mut attempts = 0;
        for strategy in &self.strategies {
            attempts += 1;
            match self.run_strategy(strategy, texts).await {
                StrategyOutcome::Success(vectors) | StrategyOutcome::Degraded(vectors) => {
                    debug!(source = %strategy.source, n = texts.len(), "embedded batch");
                    return TaggedBatch { vectors, source: strategy.source, attempts, failures };
                }
                StrategyOutcome::Failed(reason) => {
                    warn!(source = %strategy.source, provider = strategy.provider.embedder_id(), %reason, "embedding tier failed");
                    failures.push((strategy.source, reason));
                }
            }
        }
        if !self.strategies.is_empty() {
            error!(n = texts.len(), "all embedding tiers failed; substituting placeholder vectors");
        }
        TaggedBatch {
            vectors: self.placeholder.embed(texts),
            source: EmbeddingSource::Placeholder,
            attempts,
            failures,
        }
    }
}
