//! Bounded, content-addressed embedding cache.
//!
//! Keys are content hashes of the embedded text; values are vectors from the
//! primary tier of the fallback chain. The cache is snapshotted to disk with
//! bincode and only reloaded when the model id and dimension still match.

use bincode::config::standard as bincode_config;
use bincode::{decode_from_slice, encode_to_vec, Decode, Encode};
use chrono::Utc;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::debug;

use kbsearch_core::{Error, Result};

/// Counters of the embedding service, persisted with the cache snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct EmbeddingStats {
    pub embeddings_generated: u64,
    pub cache_hits: u64,
    pub api_calls: u64,
    pub errors: u64,
    pub placeholders: u64,
    pub evictions: u64,
}

impl EmbeddingStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.embeddings_generated;
        if lookups == 0 { 0.0 } else { self.cache_hits as f64 / lookups as f64 }
    }
}

pub struct EmbeddingCache {
    entries: LruCache<String, Vec<f32>>,
    evictions: u64,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { entries: LruCache::new(cap), evictions: 0 }
    }

    pub fn get(&mut self, hash: &str) -> Option<Vec<f32>> {
        self.entries.get(hash).cloned()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains(hash)
    }

    pub fn put(&mut self, hash: String, vector: Vec<f32>) {
        if let Some((old, _)) = self.entries.push(hash.clone(), vector) {
            if old != hash {
                self.evictions += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries ordered least to most recently used, so a restore keeps recency.
    pub fn snapshot(&self, model_id: &str, dimension: usize, stats: EmbeddingStats) -> CacheSnapshot {
        let entries = self.entries.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();
        CacheSnapshot {
            version: CacheSnapshot::VERSION,
            model_id: model_id.to_string(),
            dimension: dimension as u64,
            saved_at_ms: Utc::now().timestamp_millis(),
            stats,
            entries,
        }
    }

    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        self.entries.clear();
        for (hash, vector) in snapshot.entries {
            self.entries.push(hash, vector);
        }
        self.evictions = snapshot.stats.evictions;
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct CacheSnapshot {
    pub version: u32,
    pub model_id: String,
    pub dimension: u64,
    pub saved_at_ms: i64,
    pub stats: EmbeddingStats,
    pub entries: Vec<(String, Vec<f32>)>,
}

impl CacheSnapshot {
    pub const VERSION: u32 = 1;

    /// Whether this snapshot may seed a cache for `model_id` at `dimension`.
    pub fn is_valid_for(&self, model_id: &str, dimension: usize) -> bool {
        self.version == Self::VERSION && self.model_id == model_id && self.dimension == dimension as u64
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = encode_to_vec(self, bincode_config()).map_err(|e| Error::index_io("encode embedding cache", e))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), entries = self.entries.len(), bytes = bytes.len(), "saved embedding cache");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let (snapshot, _) = decode_from_slice::<Self, _>(&bytes, bincode_config())
            .map_err(|e| Error::index_io("decode embedding cache", e))?;
        Ok(snapshot)
    }
}
