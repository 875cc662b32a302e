use anyhow::Result;
use async_trait::async_trait;

use kbsearch_core::traits::Embedder;
use kbsearch_embed::HashEmbedder;

use super::EmbedProvider;

/// Last tier of every chain. Deterministic and infallible, but the vectors
/// only encode token overlap, so records carrying them are backfilled later.
#[derive(Debug, Clone)]
pub struct PlaceholderProvider {
    inner: HashEmbedder,
}

impl PlaceholderProvider {
    pub fn new(dim: usize) -> Self {
        Self { inner: HashEmbedder::new(dim) }
    }

    pub fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.inner.embed_text(t)).collect()
    }
}

#[async_trait]
impl EmbedProvider for PlaceholderProvider {
    fn embedder_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.embed(texts))
    }
}
