//! Full rebuilds: re-embed the surviving records into a fresh index,
//! validate it on a small sample, then hand it back for the swap.

use indicatif::ProgressBar;
use tracing::{info, warn};

use kbsearch_core::types::Chunk;
use kbsearch_core::Result;

use crate::embedding::EmbeddingService;
use crate::store::{VectorIndex, VectorIndexConfig};
use crate::table::StoredRecord;
use crate::writer::{embed_chunks, CancelToken};

pub fn record_to_chunk(r: &StoredRecord) -> Chunk {
    let m = &r.metadata;
    Chunk {
        id: m.chunk_id.clone(),
        content: r.content.clone(),
        section_title: m.section_title.clone(),
        source_path: m.source_path.clone(),
        position_index: m.position_index,
        char_count: m.char_count,
        word_count: m.word_count,
    }
}

/// Live records as chunks, in position order. Tombstoned records are dropped.
pub fn survivors(index: &VectorIndex) -> Vec<Chunk> {
    index.records().map(|(_, r)| record_to_chunk(r)).collect()
}

/// Live records still carrying placeholder vectors.
pub fn degraded_chunks(index: &VectorIndex) -> Vec<Chunk> {
    index
        .records()
        .filter(|(_, r)| r.metadata.embedding_source.is_degraded())
        .map(|(_, r)| record_to_chunk(r))
        .collect()
}

/// Build a new index from `chunks`. `Ok(None)` means the build was cancelled.
pub async fn build_index(
    config: VectorIndexConfig,
    chunks: &[Chunk],
    service: &EmbeddingService,
    progress: &ProgressBar,
    cancel: &CancelToken,
) -> Result<Option<VectorIndex>> {
    let Some(records) = embed_chunks(service, chunks, progress, cancel).await else {
        return Ok(None);
    };
    if cancel.is_cancelled() {
        return Ok(None);
    }
    let mut index = VectorIndex::new(config);
    index.add(records)?;
    info!(vectors = index.len(), degraded = index.degraded_len(), "built index");
    Ok(Some(index))
}

/// Every sampled vector must find itself as its own best hit.
pub fn validate_index(index: &VectorIndex, sample: usize) -> bool {
    let positions: Vec<usize> = index.records().map(|(p, _)| p).take(sample).collect();
    for pos in positions {
        let Some(vector) = index.vector(pos) else { return false };
        let hits = match index.search(vector, 1) {
            Ok(h) => h,
            Err(e) => {
                warn!(position = pos, error = %e, "validation search failed");
                return false;
            }
        };
        let found = hits.first().is_some_and(|h| {
            h.position == pos || index.vector(h.position) == Some(vector)
        });
        if !found {
            warn!(position = pos, "vector does not retrieve itself");
            return false;
        }
    }
    true
}
