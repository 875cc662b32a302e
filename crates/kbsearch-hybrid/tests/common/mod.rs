#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kbsearch_core::types::{Chunk, EmbeddingSource};
use kbsearch_embed::HashEmbedder;
use kbsearch_vector::embed_provider::{EmbedProvider, FallbackChain};
use kbsearch_vector::{EmbeddingService, IndexType, VectorIndex, VectorIndexConfig, VectorRecord};

/// Fixed vectors for known texts, hash vectors for everything else.
pub struct ScriptedProvider {
    pub id: String,
    pub dim: usize,
    pub script: HashMap<String, Vec<f32>>,
    pub calls: AtomicUsize,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(id: &str, dim: usize) -> Self {
        Self { id: id.to_string(), dim, script: HashMap::new(), calls: AtomicUsize::new(0), fail: false, delay: None }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.script.insert(text.to_string(), vector);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbedProvider for ScriptedProvider {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("provider down");
        }
        let hash = HashEmbedder::new(self.dim);
        Ok(texts.iter().map(|t| self.script.get(t).cloned().unwrap_or_else(|| hash.embed_text(t))).collect())
    }
}

pub fn service(provider: Arc<ScriptedProvider>, timeout: Duration) -> EmbeddingService {
    let dim = provider.dim;
    let chain = FallbackChain::new(dim, timeout).with_strategy(EmbeddingSource::Remote, provider);
    EmbeddingService::new(chain, 32, 1000)
}

pub fn ip_index(dim: usize, threshold: f32) -> VectorIndex {
    VectorIndex::new(VectorIndexConfig {
        index_type: IndexType::FlatIp,
        dimension: dim,
        similarity_threshold: threshold,
        max_l2_distance: None,
    })
}

pub fn add_chunk(index: &mut VectorIndex, path: &str, title: &str, pos: usize, content: &str, vector: Vec<f32>) -> Chunk {
    let chunk = Chunk::new(path, title, pos, content.to_string());
    index
        .add(vec![VectorRecord {
            embedding: vector,
            content: chunk.content.clone(),
            metadata: chunk.metadata(EmbeddingSource::Remote),
        }])
        .unwrap();
    chunk
}

pub fn shared(index: VectorIndex) -> Arc<RwLock<VectorIndex>> {
    Arc::new(RwLock::new(index))
}
