//! Domain types shared by the chunker, the vector index and the search engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;

/// Hex blake3 digest of `text`. Used for embedding cache keys and file change detection.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// A raw corpus document as handed over by a [`crate::corpus::Corpus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub path: String,
    pub content: String,
    pub mtime: Option<DateTime<Utc>>,
    pub size: u64,
}

/// A retrieval-sized span of one document.
///
/// - `id`: blake3 of `(source_path, section_title, position_index)`, stable across runs
/// - `section_title`: heading text, or the document title for window chunks
/// - `position_index`: order of the chunk within its document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub content: String,
    pub section_title: String,
    pub source_path: String,
    pub position_index: usize,
    pub char_count: usize,
    pub word_count: usize,
}

impl Chunk {
    pub fn new(source_path: &str, section_title: &str, position_index: usize, content: String) -> Self {
        Self {
            id: Self::derive_id(source_path, section_title, position_index),
            char_count: content.chars().count(),
            word_count: content.split_whitespace().count(),
            content,
            section_title: section_title.to_string(),
            source_path: source_path.to_string(),
            position_index,
        }
    }

    pub fn derive_id(source_path: &str, section_title: &str, position_index: usize) -> ChunkId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(source_path.as_bytes());
        hasher.update(&[0x1f]);
        hasher.update(section_title.as_bytes());
        hasher.update(&[0x1f]);
        hasher.update(position_index.to_string().as_bytes());
        hasher.finalize().to_hex().as_str()[..32].to_string()
    }

    pub fn metadata(&self, embedding_source: EmbeddingSource) -> ChunkMetadata {
        ChunkMetadata {
            chunk_id: self.id.clone(),
            source_path: self.source_path.clone(),
            section_title: self.section_title.clone(),
            position_index: self.position_index,
            char_count: self.char_count,
            word_count: self.word_count,
            embedding_source,
        }
    }
}

/// Which tier of the embedding fallback chain produced a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingSource {
    Remote,
    Local,
    Placeholder,
}

impl EmbeddingSource {
    /// Placeholder vectors carry no meaning and must be backfilled.
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Placeholder)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
            Self::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for EmbeddingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured metadata stored next to every vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: ChunkId,
    pub source_path: String,
    pub section_title: String,
    pub position_index: usize,
    pub char_count: usize,
    pub word_count: usize,
    pub embedding_source: EmbeddingSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Semantic,
    Keyword,
    Hybrid,
}

impl SearchMode {
    pub const ALL: [SearchMode; 3] = [Self::Semantic, Self::Keyword, Self::Hybrid];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "keyword" => Ok(Self::Keyword),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(Error::Query(format!("unknown search mode '{other}'"))),
        }
    }
}

/// How a result's score came to be. Sub-scores absent from a modality are `None`
/// for single-mode searches and `Some(0.0)` after hybrid fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreProvenance {
    pub search_type: SearchMode,
    pub semantic_score: Option<f32>,
    pub keyword_score: Option<f32>,
    pub matched_terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub similarity_score: f32,
    pub provenance: ScoreProvenance,
}

/// What the search surface hands back to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: String,
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    pub fn new(query: &str, mode: &str, results: Vec<SearchResult>, elapsed_ms: u64) -> Self {
        Self {
            query: query.to_string(),
            mode: mode.to_string(),
            total: results.len(),
            results,
            elapsed_ms,
            timestamp: Utc::now(),
            from_cache: false,
            error: None,
        }
    }

    pub fn empty(query: &str, mode: &str) -> Self {
        Self::new(query, mode, Vec::new(), 0)
    }

    pub fn failed(query: &str, mode: &str, error: impl ToString, elapsed_ms: u64) -> Self {
        let mut resp = Self::new(query, mode, Vec::new(), elapsed_ms);
        resp.error = Some(error.to_string());
        resp
    }
}
