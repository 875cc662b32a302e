//! In-process embedding provider on top of a blocking [`Embedder`].
//!
//! Inference runs on the blocking thread pool so the async runtime stays responsive.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use kbsearch_core::traits::Embedder;
use kbsearch_embed::LocalModel;

use super::EmbedProvider;

pub struct LocalProvider {
    inner: Arc<dyn Embedder>,
    id: String,
}

impl LocalProvider {
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        let id = inner.model_id().to_string();
        Self { inner, id }
    }

    /// Load the XLM-RoBERTa model found under `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(LocalModel::load(model_dir)?)))
    }
}

#[async_trait]
impl EmbedProvider for LocalProvider {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || inner.embed_batch(&texts))
            .await
            .map_err(|e| anyhow!("local embedding task failed: {e}"))?
    }
}
