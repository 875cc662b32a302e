//! Embedding service: cache first, then the fallback chain, in batches.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use kbsearch_core::config::SearchSettings;
use kbsearch_core::types::{content_hash, EmbeddingSource};
use kbsearch_core::Result;

use crate::cache::{CacheSnapshot, EmbeddingCache, EmbeddingStats};
use crate::embed_provider::{FallbackChain, HttpProvider, LocalProvider};

/// One embedded text and the tier it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedded {
    pub vector: Vec<f32>,
    pub source: EmbeddingSource,
}

pub struct EmbeddingService {
    chain: FallbackChain,
    cache: Mutex<EmbeddingCache>,
    stats: Mutex<EmbeddingStats>,
    batch_size: usize,
}

impl EmbeddingService {
    pub fn new(chain: FallbackChain, batch_size: usize, cache_capacity: usize) -> Self {
        Self {
            chain,
            cache: Mutex::new(EmbeddingCache::new(cache_capacity)),
            stats: Mutex::new(EmbeddingStats::default()),
            batch_size: batch_size.max(1),
        }
    }

    /// Chain from settings: remote when an endpoint is configured and its key is
    /// present, local when a model directory resolves, placeholder always.
    pub fn from_settings(settings: &SearchSettings) -> Self {
        let timeout = Duration::from_secs(settings.provider_timeout_secs);
        let mut chain = FallbackChain::new(settings.embedding_dimension, timeout);

        if let Some(url) = settings.embedding_api_url.as_deref() {
            match std::env::var(&settings.embedding_api_key_env) {
                Ok(key) if !key.is_empty() => {
                    match HttpProvider::new(url, key, &settings.embedding_model, settings.embedding_dimension, timeout) {
                        Ok(p) => chain = chain.with_strategy(EmbeddingSource::Remote, Arc::new(p)),
                        Err(e) => warn!(error = %e, "remote embedding provider unavailable"),
                    }
                }
                _ => warn!(env = %settings.embedding_api_key_env, "no API key for remote embeddings"),
            }
        }

        let explicit = settings.local_model_dir.as_deref().map(kbsearch_core::config::expand_path);
        if let Some(dir) = kbsearch_embed::resolve_model_dir(explicit.as_deref()) {
            match LocalProvider::load(&dir) {
                Ok(p) => chain = chain.with_strategy(EmbeddingSource::Local, Arc::new(p)),
                Err(e) => warn!(dir = %dir.display(), error = %e, "local embedding model unavailable"),
            }
        }

        let tiers = chain.tiers();
        if tiers.is_empty() {
            warn!("no embedding provider configured; every vector will be a placeholder");
        } else {
            info!(tiers = ?tiers, "embedding chain ready");
        }
        Self::new(chain, settings.batch_size, settings.embedding_cache_capacity)
    }

    pub fn dim(&self) -> usize {
        self.chain.dim()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn model_id(&self) -> String {
        self.chain.primary().1.to_string()
    }

    /// Embed `texts` in order. Cached texts never reach a provider, duplicate
    /// misses are embedded once, and failures degrade to placeholder vectors.
    pub async fn embed(&self, texts: &[String]) -> Vec<Embedded> {
        let (primary, _) = self.chain.primary();
        let hashes: Vec<String> = texts.iter().map(|t| content_hash(t)).collect();
        let mut out: Vec<Option<Embedded>> = vec![None; texts.len()];
        let mut pending: Vec<usize> = Vec::new();
        let mut waiting: HashMap<&str, Vec<usize>> = HashMap::new();

        {
            let mut cache = self.cache.lock();
            let mut hits = 0u64;
            for (i, hash) in hashes.iter().enumerate() {
                if let Some(vector) = cache.get(hash) {
                    out[i] = Some(Embedded { vector, source: primary });
                    hits += 1;
                    continue;
                }
                let slots = waiting.entry(hash.as_str()).or_default();
                if slots.is_empty() {
                    pending.push(i);
                }
                slots.push(i);
            }
            self.stats.lock().cache_hits += hits;
        }

        for batch in pending.chunks(self.batch_size) {
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
            let tagged = self.chain.embed(&batch_texts).await;
            {
                let mut stats = self.stats.lock();
                stats.api_calls += tagged.attempts as u64;
                stats.errors += tagged.failures.len() as u64;
                stats.embeddings_generated += batch.len() as u64;
                if tagged.source.is_degraded() {
                    stats.placeholders += batch.len() as u64;
                }
            }
            let cacheable = tagged.source == primary && !tagged.source.is_degraded();
            let mut cache = self.cache.lock();
            for (&i, vector) in batch.iter().zip(tagged.vectors) {
                let hash = hashes[i].as_str();
                if cacheable {
                    cache.put(hash.to_string(), vector.clone());
                }
                for &slot in waiting.get(hash).map(Vec::as_slice).unwrap_or(&[]) {
                    out[slot] = Some(Embedded { vector: vector.clone(), source: tagged.source });
                }
            }
        }

        out.into_iter().flatten().collect()
    }

    pub async fn embed_one(&self, text: &str) -> Embedded {
        let mut embedded = self.embed(&[text.to_string()]).await;
        embedded.pop().unwrap_or_else(|| Embedded {
            vector: vec![0.0; self.dim()],
            source: EmbeddingSource::Placeholder,
        })
    }

    pub fn stats(&self) -> EmbeddingStats {
        let mut stats = self.stats.lock().clone();
        stats.evictions = self.cache.lock().evictions();
        stats
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.lock().capacity()
    }

    pub fn is_cached(&self, text: &str) -> bool {
        self.cache.lock().contains(&content_hash(text))
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn save_cache(&self, path: &Path) -> Result<()> {
        let stats = self.stats();
        let snapshot = self.cache.lock().snapshot(&self.model_id(), self.dim(), stats);
        snapshot.save(path)
    }

    /// Seed the cache from `path`. Returns `false` when there is no snapshot or
    /// it was written for another model or dimension.
    pub fn load_cache(&self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let snapshot = CacheSnapshot::load(path)?;
        let model_id = self.model_id();
        if !snapshot.is_valid_for(&model_id, self.dim()) {
            warn!(
                cached_model = %snapshot.model_id,
                cached_dim = snapshot.dimension,
                model = %model_id,
                dim = self.dim(),
                "discarding embedding cache built for another model"
            );
            return Ok(false);
        }
        let entries = snapshot.entries.len();
        *self.stats.lock() = snapshot.stats.clone();
        self.cache.lock().restore(snapshot);
        info!(path = %path.display(), entries, "loaded embedding cache");
        Ok(true)
    }
}
