//! Exact (flat) vector index over a contiguous `f32` buffer.
//!
//! Positions are dense and append-only: the n-th added vector is position n
//! for the lifetime of the index.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use kbsearch_core::config::SimilarityMetric;
use kbsearch_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    /// Inner product over unit vectors; higher is better.
    FlatIp,
    /// Euclidean distance; lower is better.
    FlatL2,
}

impl IndexType {
    pub fn from_metric(metric: SimilarityMetric) -> Self {
        match metric {
            SimilarityMetric::InnerProduct => Self::FlatIp,
            SimilarityMetric::L2 => Self::FlatL2,
        }
    }

    pub fn metric(self) -> SimilarityMetric {
        match self {
            Self::FlatIp => SimilarityMetric::InnerProduct,
            Self::FlatL2 => SimilarityMetric::L2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FlatIp => "flat_ip",
            Self::FlatL2 => "flat_l2",
        }
    }

    /// `Less` when score `a` ranks before score `b`.
    pub fn rank(self, a: f32, b: f32) -> Ordering {
        match self {
            Self::FlatIp => b.total_cmp(&a),
            Self::FlatL2 => a.total_cmp(&b),
        }
    }
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct FlatIndex {
    index_type: IndexType,
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(index_type: IndexType, dimension: usize) -> Self {
        Self { index_type, dimension, data: Vec::new() }
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 { 0 } else { self.data.len() / self.dimension }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check the dimension and, for inner product, normalize to unit length.
    pub fn prepare(&self, vector: &[f32]) -> Result<Vec<f32>> {
        if vector.len() != self.dimension {
            return Err(Error::Query(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimension
            )));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(Error::Query("vector contains non-finite values".to_string()));
        }
        let mut v = vector.to_vec();
        if self.index_type == IndexType::FlatIp {
            l2_normalize(&mut v);
        }
        Ok(v)
    }

    /// Append an already [`prepared`](Self::prepare) vector; returns its position.
    pub fn push_prepared(&mut self, vector: &[f32]) -> usize {
        debug_assert_eq!(vector.len(), self.dimension);
        let position = self.len();
        self.data.extend_from_slice(vector);
        position
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    fn score(&self, query: &[f32], candidate: &[f32]) -> f32 {
        match self.index_type {
            IndexType::FlatIp => {
                let dot: f32 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
                dot.clamp(-1.0, 1.0)
            }
            IndexType::FlatL2 => query.iter().zip(candidate).map(|(a, b)| (a - b) * (a - b)).sum::<f32>().sqrt(),
        }
    }

    /// Best `k` positions accepted by `keep(position, score)`, best first.
    /// Equal scores are ordered by position.
    pub fn search<F>(&self, query: &[f32], k: usize, keep: F) -> Result<Vec<(usize, f32)>>
    where
        F: Fn(usize, f32) -> bool,
    {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.prepare(query)?;
        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(pos, v)| (pos, self.score(&query, v)))
            .filter(|&(pos, score)| keep(pos, score))
            .collect();
        scored.sort_by(|a, b| self.index_type.rank(a.1, b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}
