//! [`SearchContext`]: everything the search subsystem owns, built once at
//! startup and passed by reference.
//!
//! Readers go through the `RwLock` around the index. Writers (incremental
//! indexing, rebuilds) additionally hold the async chunker mutex, so only one
//! of them runs at a time and a rebuild swaps in a complete index in one step.

use indicatif::ProgressBar;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use kbsearch_core::chunker::{ChunkingConfig, DocumentChunker, FileStats};
use kbsearch_core::config::SearchSettings;
use kbsearch_core::corpus::{Corpus, FsCorpus};
use kbsearch_core::types::{Chunk, SearchResponse};
use kbsearch_core::{Error, Result};
use kbsearch_vector::index_build::{build_index, survivors, validate_index};
use kbsearch_vector::store::write_atomic;
use kbsearch_vector::writer::{embed_chunks, progress_bar, CancelToken, Generation};
use kbsearch_vector::{EmbeddingService, EmbeddingStats, VectorIndex, VectorIndexConfig};

use crate::engine::{FusionSettings, HybridSearchEngine};
use crate::service::{SearchRequest, SearchService, SearchStats};

pub const FILE_STATS_FILE: &str = "file_stats.json";
pub const EMBEDDING_CACHE_FILE: &str = "embedding_cache.bin";
const VALIDATION_SAMPLE: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    pub changed_files: usize,
    pub unchanged_files: usize,
    pub failed_files: Vec<String>,
    pub removed_files: usize,
    pub chunks_added: usize,
    pub chunks_tombstoned: usize,
    pub degraded_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebuildOutcome {
    Rebuilt { vectors: usize, degraded: usize },
    /// A newer rebuild or a shutdown superseded this one.
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorCounts {
    pub total: usize,
    pub live: usize,
    pub removed: usize,
    pub degraded: usize,
    pub dimension: usize,
    pub index_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub search: SearchStats,
    pub embedding: EmbeddingStats,
    pub embedding_hit_rate: f64,
    pub embedding_cache_entries: usize,
    pub embedding_model: String,
    pub vectors: VectorCounts,
    pub indexed_files: usize,
    pub config_issues: Vec<String>,
    pub rebuild_running: bool,
}

pub struct SearchContext {
    settings: SearchSettings,
    index_dir: PathBuf,
    corpus: Arc<dyn Corpus>,
    index: Arc<RwLock<VectorIndex>>,
    embeddings: Arc<EmbeddingService>,
    service: SearchService,
    chunker: tokio::sync::Mutex<DocumentChunker>,
    generation: Generation,
    rebuild_running: AtomicBool,
    show_progress: AtomicBool,
    indexed_files: AtomicUsize,
}

impl SearchContext {
    /// Build the context from settings, resolving paths against `base`.
    ///
    /// Invalid settings or a missing corpus root are fatal. A missing or
    /// unreadable index is not: the context starts empty.
    pub fn init(settings: SearchSettings, base: &Path) -> Result<Arc<Self>> {
        settings.ensure_valid()?;
        let root = settings.corpus_root_path(base);
        if !root.is_dir() {
            return Err(Error::Configuration(format!("corpus root {} is not a directory", root.display())));
        }
        let corpus = Arc::new(FsCorpus::new(&root, &settings.corpus_extensions));
        let index_dir = settings.index_dir_path(base);
        let embeddings = EmbeddingService::from_settings(&settings);
        Self::with_parts(settings, index_dir, corpus, embeddings)
    }

    /// Assemble a context from explicit parts and load whatever was persisted
    /// under `index_dir`. Invalid settings are rejected here too.
    pub fn with_parts(
        settings: SearchSettings,
        index_dir: PathBuf,
        corpus: Arc<dyn Corpus>,
        embeddings: EmbeddingService,
    ) -> Result<Arc<Self>> {
        settings.ensure_valid()?;
        if embeddings.dim() != settings.embedding_dimension {
            return Err(Error::Configuration(format!(
                "embedding service produces {} dims, settings expect {}",
                embeddings.dim(),
                settings.embedding_dimension
            )));
        }
        let mut chunker = DocumentChunker::new(ChunkingConfig::from(&settings))?;
        let config = VectorIndexConfig::from(&settings);

        if let Err(e) = embeddings.load_cache(&index_dir.join(EMBEDDING_CACHE_FILE)) {
            warn!(error = %e, "ignoring unreadable embedding cache");
        }

        let index = if VectorIndex::exists(&index_dir) {
            match VectorIndex::load(&index_dir, config.clone()) {
                Ok(index) => {
                    match load_file_stats(&index_dir.join(FILE_STATS_FILE)) {
                        Ok(stats) => chunker.restore_stats(stats),
                        Err(e) => warn!(error = %e, "file stats unreadable; corpus will be reprocessed"),
                    }
                    index
                }
                Err(e) => {
                    warn!(dir = %index_dir.display(), error = %e, "treating index as absent");
                    VectorIndex::new(config)
                }
            }
        } else {
            info!(dir = %index_dir.display(), "no index yet");
            VectorIndex::new(config)
        };

        let indexed_files = AtomicUsize::new(chunker.file_stats().len());
        let index = Arc::new(RwLock::new(index));
        let embeddings = Arc::new(embeddings);
        let engine = HybridSearchEngine::new(Arc::clone(&index), Arc::clone(&embeddings), FusionSettings::from(&settings));
        let service = SearchService::new(engine, &settings);
        Ok(Arc::new(Self {
            settings,
            index_dir,
            corpus,
            index,
            embeddings,
            service,
            chunker: tokio::sync::Mutex::new(chunker),
            generation: Generation::default(),
            rebuild_running: AtomicBool::new(false),
            show_progress: AtomicBool::new(false),
            indexed_files,
        }))
    }

    /// Show indicatif progress bars while embedding. Off by default.
    pub fn show_progress(&self, on: bool) {
        self.show_progress.store(on, Ordering::Relaxed);
    }

    fn progress(&self, len: usize) -> ProgressBar {
        progress_bar(len, !self.show_progress.load(Ordering::Relaxed))
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn service(&self) -> &SearchService {
        &self.service
    }

    pub fn engine(&self) -> &HybridSearchEngine {
        self.service.engine()
    }

    pub fn embeddings(&self) -> &EmbeddingService {
        &self.embeddings
    }

    pub async fn search(&self, request: &SearchRequest) -> SearchResponse {
        self.service.search(request).await
    }

    /// Chunk new and modified documents, embed them and append them to the
    /// index. Chunks of modified and deleted files are tombstoned.
    pub async fn index_corpus(&self) -> Result<IndexReport> {
        let mut chunker = self.chunker.lock().await;
        let chunks = chunker.process_corpus(self.corpus.as_ref())?;
        let summary = chunker.summary().clone();

        let pb = self.progress(chunks.len());
        let records = embed_chunks(&self.embeddings, &chunks, &pb, &CancelToken::never()).await.unwrap_or_default();
        let degraded_chunks = records.iter().filter(|r| r.metadata.embedding_source.is_degraded()).count();

        let (chunks_tombstoned, chunks_added) = {
            let mut index = self.index.write();
            let tombstoned: usize = summary.changed.iter().chain(&summary.removed).map(|p| index.mark_removed(p)).sum();
            match index.add(records) {
                Ok(range) => (tombstoned, range.len()),
                Err(e) => {
                    drop(index);
                    for path in &summary.changed {
                        chunker.forget(path);
                    }
                    return Err(e);
                }
            }
        };

        if chunks_added + chunks_tombstoned > 0 {
            self.service.invalidate();
            self.persist(&chunker)?;
        }
        let report = IndexReport {
            changed_files: summary.changed.len(),
            unchanged_files: summary.unchanged.len(),
            failed_files: summary.failed,
            removed_files: summary.removed.len(),
            chunks_added,
            chunks_tombstoned,
            degraded_chunks,
        };
        info!(
            added = report.chunks_added,
            tombstoned = report.chunks_tombstoned,
            degraded = report.degraded_chunks,
            "indexed corpus"
        );
        Ok(report)
    }

    /// Start a background rebuild, superseding any rebuild still running.
    ///
    /// Without `force` the surviving records are re-embedded, which drops
    /// tombstones and backfills placeholder vectors. With `force` the whole
    /// corpus is rechunked first.
    pub fn rebuild_index(self: &Arc<Self>, force: bool) -> JoinHandle<Result<RebuildOutcome>> {
        let token = self.generation.next();
        let ctx = Arc::clone(self);
        tokio::spawn(async move { ctx.run_rebuild(force, token).await })
    }

    async fn run_rebuild(&self, force: bool, token: CancelToken) -> Result<RebuildOutcome> {
        let mut chunker = self.chunker.lock().await;
        if token.is_cancelled() {
            return Ok(RebuildOutcome::Cancelled);
        }
        self.rebuild_running.store(true, Ordering::SeqCst);
        let previous_stats = chunker.file_stats().clone();
        let outcome = self.rebuild_locked(&mut chunker, force, &token).await;
        if !matches!(outcome, Ok(RebuildOutcome::Rebuilt { .. })) {
            chunker.restore_stats(previous_stats);
        }
        self.rebuild_running.store(false, Ordering::SeqCst);
        outcome
    }

    async fn rebuild_locked(&self, chunker: &mut DocumentChunker, force: bool, token: &CancelToken) -> Result<RebuildOutcome> {
        let chunks: Vec<Chunk> = if force {
            chunker.reset();
            chunker.process_corpus(self.corpus.as_ref())?
        } else {
            survivors(&self.index.read())
        };
        info!(force, chunks = chunks.len(), generation = token.generation(), "rebuilding index");

        let config = self.index.read().config().clone();
        let pb = self.progress(chunks.len());
        let Some(rebuilt) = build_index(config, &chunks, &self.embeddings, &pb, token).await? else {
            info!(generation = token.generation(), "rebuild superseded");
            return Ok(RebuildOutcome::Cancelled);
        };
        if !validate_index(&rebuilt, VALIDATION_SAMPLE) {
            return Err(Error::IndexIo("rebuilt index failed validation".to_string()));
        }
        if token.is_cancelled() {
            return Ok(RebuildOutcome::Cancelled);
        }

        let outcome = RebuildOutcome::Rebuilt { vectors: rebuilt.len(), degraded: rebuilt.degraded_len() };
        *self.index.write() = rebuilt;
        self.service.invalidate();
        self.persist(chunker)?;
        info!(?outcome, "index swapped");
        Ok(outcome)
    }

    pub fn status(&self) -> Status {
        let vectors = {
            let index = self.index.read();
            VectorCounts {
                total: index.len(),
                live: index.live_len(),
                removed: index.removed_len(),
                degraded: index.degraded_len(),
                dimension: index.dimension(),
                index_type: index.index_type().as_str().to_string(),
            }
        };
        let embedding = self.embeddings.stats();
        Status {
            search: self.service.stats(),
            embedding_hit_rate: embedding.hit_rate(),
            embedding,
            embedding_cache_entries: self.embeddings.cache_len(),
            embedding_model: self.embeddings.model_id(),
            vectors,
            indexed_files: self.indexed_files.load(Ordering::SeqCst),
            config_issues: self.settings.validate(),
            rebuild_running: self.rebuild_running.load(Ordering::SeqCst),
        }
    }

    fn persist(&self, chunker: &DocumentChunker) -> Result<()> {
        self.index.read().save(&self.index_dir)?;
        let stats = serde_json::to_vec_pretty(chunker.file_stats())?;
        write_atomic(&self.index_dir.join(FILE_STATS_FILE), &stats)?;
        self.embeddings.save_cache(&self.index_dir.join(EMBEDDING_CACHE_FILE))?;
        self.indexed_files.store(chunker.file_stats().len(), Ordering::SeqCst);
        Ok(())
    }

    /// Persist index, file stats and embedding cache. Waits for the current writer.
    pub async fn flush(&self) -> Result<()> {
        let chunker = self.chunker.lock().await;
        self.persist(&chunker)
    }

    /// Cancel background rebuilds, then flush.
    pub async fn shutdown(&self) -> Result<()> {
        self.generation.cancel_all();
        self.flush().await?;
        info!(dir = %self.index_dir.display(), "search context shut down");
        Ok(())
    }
}

fn load_file_stats(path: &Path) -> Result<BTreeMap<String, FileStats>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}
