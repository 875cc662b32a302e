use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use kbsearch_core::types::Chunk;

use crate::embedding::EmbeddingService;
use crate::store::VectorRecord;

/// Source of cancellation tokens. Issuing a new token cancels all older ones.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn next(&self) -> CancelToken {
        let generation = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        CancelToken { current: Arc::clone(&self.0), generation }
    }

    /// Cancel every outstanding token.
    pub fn cancel_all(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl CancelToken {
    /// A token nothing can cancel.
    pub fn never() -> Self {
        Self { current: Arc::new(AtomicU64::new(0)), generation: 0 }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.current.load(Ordering::SeqCst) != self.generation
    }
}

pub fn progress_bar(len: usize, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Embed `chunks` batch by batch into index records.
///
/// Returns `None` if `cancel` fires; cancellation is checked between batches.
pub async fn embed_chunks(
    service: &EmbeddingService,
    chunks: &[Chunk],
    progress: &ProgressBar,
    cancel: &CancelToken,
) -> Option<Vec<VectorRecord>> {
    let mut records = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(service.batch_size()) {
        if cancel.is_cancelled() {
            debug!(generation = cancel.generation(), done = records.len(), "embedding cancelled");
            progress.abandon_with_message("cancelled");
            return None;
        }
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embedded = service.embed(&texts).await;
        for (chunk, e) in batch.iter().zip(embedded) {
            records.push(VectorRecord {
                embedding: e.vector,
                content: chunk.content.clone(),
                metadata: chunk.metadata(e.source),
            });
        }
        progress.inc(batch.len() as u64);
    }
    progress.finish_with_message("embedded");
    info!(chunks = records.len(), "embedded chunks");
    Some(records)
}
