//! Hybrid search: semantic (vector) and keyword (lexical) retrieval fused
//! into one ranking.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use kbsearch_core::config::SearchSettings;
use kbsearch_core::filter::MetadataFilter;
use kbsearch_core::types::{ChunkMetadata, ScoreProvenance, SearchMode, SearchResult};
use kbsearch_core::Result;
use kbsearch_text::{KeywordMatch, KeywordScorer};
use kbsearch_vector::{EmbeddingService, IndexType, VectorHit, VectorIndex};

#[derive(Debug, Clone, PartialEq)]
pub struct FusionSettings {
    /// Weight of the semantic score; the keyword score gets `1 - hybrid_weight`.
    pub hybrid_weight: f32,
    pub keyword_boost_enabled: bool,
    pub keyword_boost: f32,
    pub relevance_threshold: f32,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self::from(&SearchSettings::default())
    }
}

impl From<&SearchSettings> for FusionSettings {
    fn from(s: &SearchSettings) -> Self {
        Self {
            hybrid_weight: s.hybrid_weight,
            keyword_boost_enabled: s.keyword_boost_enabled,
            keyword_boost: s.keyword_boost,
            relevance_threshold: s.relevance_threshold,
        }
    }
}

impl FusionSettings {
    pub fn boosted(&self, keyword: f32) -> f32 {
        if self.keyword_boost_enabled { keyword * self.keyword_boost } else { keyword }
    }

    pub fn combine(&self, semantic: f32, keyword: f32) -> f32 {
        self.hybrid_weight * semantic + (1.0 - self.hybrid_weight) * self.boosted(keyword)
    }
}

/// Semantic similarity in `[0, 1]`-ish space regardless of metric; L2
/// distances map to `1 / (1 + d)`.
pub fn semantic_similarity(index_type: IndexType, score: f32) -> f32 {
    match index_type {
        IndexType::FlatIp => score,
        IndexType::FlatL2 => 1.0 / (1.0 + score.max(0.0)),
    }
}

struct Fused {
    content: String,
    metadata: ChunkMetadata,
    semantic: f32,
    keyword: f32,
    matched_terms: Vec<String>,
}

pub struct HybridSearchEngine {
    index: Arc<RwLock<VectorIndex>>,
    embeddings: Arc<EmbeddingService>,
    scorer: KeywordScorer,
    fusion: FusionSettings,
}

impl HybridSearchEngine {
    pub fn new(index: Arc<RwLock<VectorIndex>>, embeddings: Arc<EmbeddingService>, fusion: FusionSettings) -> Self {
        Self { index, embeddings, scorer: KeywordScorer::new(), fusion }
    }

    pub fn fusion(&self) -> &FusionSettings {
        &self.fusion
    }

    /// Live (non-tombstoned) chunks in the index.
    pub fn live_chunks(&self) -> usize {
        self.index.read().live_len()
    }

    pub async fn search(&self, query: &str, mode: SearchMode, k: usize, filter: &MetadataFilter) -> Result<Vec<SearchResult>> {
        match mode {
            SearchMode::Semantic => self.semantic_search(query, k, filter).await,
            SearchMode::Keyword => Ok(self.keyword_search(query, k, filter)),
            SearchMode::Hybrid => self.hybrid_search(query, k, filter).await,
        }
    }

    async fn semantic_hits(&self, query: &str, k: usize, filter: &MetadataFilter) -> Result<Vec<VectorHit>> {
        if k == 0 || self.index.read().is_empty() {
            return Ok(Vec::new());
        }
        let embedded = self.embeddings.embed_one(query).await;
        if embedded.source.is_degraded() {
            debug!("query embedded with a placeholder vector");
        }
        self.index.read().search_filtered(&embedded.vector, k, filter)
    }

    /// Scores are raw index scores: inner product, or distance under L2.
    pub async fn semantic_search(&self, query: &str, k: usize, filter: &MetadataFilter) -> Result<Vec<SearchResult>> {
        let hits = self.semantic_hits(query, k, filter).await?;
        Ok(hits
            .into_iter()
            .map(|h| SearchResult {
                content: h.content,
                metadata: h.metadata,
                similarity_score: h.score,
                provenance: ScoreProvenance {
                    search_type: SearchMode::Semantic,
                    semantic_score: Some(h.score),
                    keyword_score: None,
                    matched_terms: Vec::new(),
                },
            })
            .collect())
    }

    fn keyword_hits(&self, query: &str, k: usize, filter: &MetadataFilter) -> Vec<(String, ChunkMetadata, KeywordMatch)> {
        let index = self.index.read();
        let docs = index
            .records()
            .filter(|(_, r)| filter.matches(&r.metadata))
            .map(|(pos, r)| (pos, r.content.as_str()));
        self.scorer
            .rank(query, docs, k)
            .into_iter()
            .filter_map(|(pos, m)| index.record(pos).map(|r| (r.content.clone(), r.metadata.clone(), m)))
            .collect()
    }

    /// Lexical scan over live chunks; tombstoned records are skipped.
    pub fn keyword_search(&self, query: &str, k: usize, filter: &MetadataFilter) -> Vec<SearchResult> {
        self.keyword_hits(query, k, filter)
            .into_iter()
            .map(|(content, metadata, m)| SearchResult {
                content,
                metadata,
                similarity_score: m.score,
                provenance: ScoreProvenance {
                    search_type: SearchMode::Keyword,
                    semantic_score: None,
                    keyword_score: Some(m.score),
                    matched_terms: m.matched_terms,
                },
            })
            .collect()
    }

    /// Both modalities with `2k` candidates each, merged by chunk id.
    ///
    /// `combined = w * semantic + (1 - w) * keyword * boost`; a modality that
    /// did not return the chunk contributes exactly 0. Stale semantic hits of a
    /// re-indexed chunk are dropped in favour of its live record. Equal combined scores
    /// keep first-encounter order (semantic candidates first).
    pub async fn hybrid_search(&self, query: &str, k: usize, filter: &MetadataFilter) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let candidates = k.saturating_mul(2);
        let semantic = self.semantic_hits(query, candidates, filter).await?;
        let keyword = self.keyword_hits(query, candidates, filter);
        let (semantic, index_type) = {
            let index = self.index.read();
            (without_superseded(&index, semantic), index.index_type())
        };

        let mut merged: Vec<Fused> = Vec::with_capacity(semantic.len() + keyword.len());
        let mut slot: HashMap<String, usize> = HashMap::new();
        for h in semantic {
            if slot.contains_key(&h.metadata.chunk_id) {
                continue;
            }
            slot.insert(h.metadata.chunk_id.clone(), merged.len());
            merged.push(Fused {
                semantic: semantic_similarity(index_type, h.score),
                content: h.content,
                metadata: h.metadata,
                keyword: 0.0,
                matched_terms: Vec::new(),
            });
        }
        for (content, metadata, m) in keyword {
            match slot.get(&metadata.chunk_id) {
                Some(&i) => {
                    merged[i].keyword = m.score;
                    merged[i].matched_terms = m.matched_terms;
                }
                None => {
                    slot.insert(metadata.chunk_id.clone(), merged.len());
                    merged.push(Fused { content, metadata, semantic: 0.0, keyword: m.score, matched_terms: m.matched_terms });
                }
            }
        }

        let mut scored: Vec<(usize, f32, Fused)> = merged
            .into_iter()
            .enumerate()
            .map(|(order, f)| (order, self.fusion.combine(f.semantic, f.keyword), f))
            .filter(|(_, combined, _)| *combined >= self.fusion.relevance_threshold)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        debug!(query, candidates, returned = scored.len(), "hybrid fusion");

        Ok(scored
            .into_iter()
            .map(|(_, combined, f)| SearchResult {
                content: f.content,
                metadata: f.metadata,
                similarity_score: combined,
                provenance: ScoreProvenance {
                    search_type: SearchMode::Hybrid,
                    semantic_score: Some(f.semantic),
                    keyword_score: Some(f.keyword),
                    matched_terms: f.matched_terms,
                },
            })
            .collect())
    }

    /// Every live chunk of one document, in document order.
    pub fn search_by_file(&self, source_path: &str) -> Vec<SearchResult> {
        let index = self.index.read();
        index
            .file_records(source_path)
            .into_iter()
            .map(|(_, r)| listing(&r.content, &r.metadata))
            .collect()
    }

    /// Live chunks whose section title contains `title`, case-insensitively.
    pub fn search_by_section(&self, title: &str, k: usize) -> Vec<SearchResult> {
        let needle = title.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let index = self.index.read();
        index
            .records()
            .filter(|(_, r)| r.metadata.section_title.to_lowercase().contains(&needle))
            .take(k)
            .map(|(_, r)| listing(&r.content, &r.metadata))
            .collect()
    }

    /// Section titles sharing the most keyword terms with `query`.
    /// Ties are broken by title, ascending.
    pub fn suggest_related_queries(&self, query: &str, n: usize) -> Vec<String> {
        let terms = self.scorer.terms(query);
        if terms.is_empty() || n == 0 {
            return Vec::new();
        }
        let index = self.index.read();
        let mut overlap: HashMap<&str, usize> = HashMap::new();
        for (_, r) in index.records() {
            let title = r.metadata.section_title.as_str();
            if overlap.contains_key(title) {
                continue;
            }
            let title_terms = self.scorer.terms(title);
            let shared = terms.iter().filter(|t| title_terms.contains(*t)).count();
            overlap.insert(title, shared);
        }
        let query_lower = query.trim().to_lowercase();
        let mut ranked: Vec<(&str, usize)> =
            overlap.into_iter().filter(|(t, shared)| *shared > 0 && t.to_lowercase() != query_lower).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().take(n).map(|(t, _)| t.to_string()).collect()
    }
}

/// Drop tombstoned hits whose chunk id was re-added at a live position, so a
/// fused result never pairs stale content with the live record's keyword score.
fn without_superseded(index: &VectorIndex, hits: Vec<VectorHit>) -> Vec<VectorHit> {
    hits.into_iter()
        .filter(|h| !h.removed || index.get_by_chunk_id(&h.metadata.chunk_id).is_none())
        .collect()
}

fn listing(content: &str, metadata: &ChunkMetadata) -> SearchResult {
    SearchResult {
        content: content.to_string(),
        metadata: metadata.clone(),
        similarity_score: 1.0,
        provenance: ScoreProvenance {
            search_type: SearchMode::Keyword,
            semantic_score: None,
            keyword_score: None,
            matched_terms: Vec::new(),
        },
    }
}
