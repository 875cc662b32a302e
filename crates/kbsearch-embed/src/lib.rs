//! kbsearch-embed
//!
//! In-process embedders: the local XLM-RoBERTa model run through candle, and
//! the deterministic hashing embedder used for placeholder vectors.

pub mod device;
pub mod hash;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use hash::HashEmbedder;
pub use model::{resolve_model_dir, LocalModel};
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_on_device;
