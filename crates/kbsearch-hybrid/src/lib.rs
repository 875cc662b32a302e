//! kbsearch-hybrid
//!
//! Hybrid search engine, the cached search service in front of it, and the
//! [`SearchContext`] that owns index, embeddings and caches.

pub mod context;
pub mod engine;
pub mod service;

pub use context::{IndexReport, RebuildOutcome, SearchContext, Status, VectorCounts};
pub use engine::{semantic_similarity, FusionSettings, HybridSearchEngine};
pub use service::{normalize_query, ResponseCache, SearchRequest, SearchService, SearchStats};
