//! kbsearch-vector
//!
//! Embedding pipeline (provider fallback chain, bounded content-addressed
//! cache) and the flat vector index with its side table and persistence.

pub mod cache;
pub mod embed_provider;
pub mod embedding;
pub mod index;
pub mod index_build;
pub mod store;
pub mod table;
pub mod writer;

pub use cache::{EmbeddingCache, EmbeddingStats};
pub use embedding::{Embedded, EmbeddingService};
pub use index::{FlatIndex, IndexType};
pub use store::{VectorHit, VectorIndex, VectorIndexConfig, VectorRecord};
pub use table::StoredRecord;
pub use writer::{CancelToken, Generation};
