use anyhow::Result;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use kbsearch_core::traits::Embedder;

/// Deterministic bag-of-tokens hashing embedder.
///
/// No semantics beyond token overlap; it backs the placeholder tier of the
/// fallback chain so indexing never stalls, and gives tests a cheap stand-in.
#[derive(Debug, Clone)]
pub struct HashEmbedder { dim: usize, model_id: String }

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, model_id: format!("hash:xxh64:d{dim}") } }

    /// Empty for a zero-dimensional embedder.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        if self.dim == 0 { return Vec::new(); }
        let mut v = vec![0f32; self.dim];
        // The whole-text bucket keeps empty and whitespace-only inputs off the zero vector.
        let (idx, val) = self.bucket(text);
        v[idx] += val;
        for (i, token) in text.split_whitespace().enumerate() {
            let (idx, val) = self.bucket(&token.to_lowercase());
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let mut hasher = XxHash64::with_seed(0);
        token.hash(&mut hasher);
        let h = hasher.finish();
        ((h as usize) % self.dim, 0.1 + (((h >> 32) as u32) as f32) / (u32::MAX as f32))
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str { &self.model_id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
