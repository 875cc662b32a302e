//! Document chunker: turns corpus documents into retrieval-sized [`Chunk`]s.
//!
//! Documents with level 2–3 Markdown headings are split into one chunk per
//! section. Anything else falls back to a sliding character window with overlap.
//! Per-file content hashes are remembered so unchanged files are skipped on the
//! next run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::SearchSettings;
use crate::corpus::Corpus;
use crate::error::{Error, Result};
use crate::types::{content_hash, Chunk};

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200 }
    }
}

impl From<&SearchSettings> for ChunkingConfig {
    fn from(s: &SearchSettings) -> Self {
        Self { chunk_size: s.chunk_size, chunk_overlap: s.chunk_overlap }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub content_hash: String,
    pub chunk_count: usize,
    pub mtime: Option<DateTime<Utc>>,
    pub size: u64,
    pub processed_at: DateTime<Utc>,
}

/// Outcome of the last [`DocumentChunker::process_corpus`] run.
#[derive(Debug, Clone, Default)]
pub struct ProcessingSummary {
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<String>,
    /// Previously processed files that are no longer in the corpus.
    pub removed: Vec<String>,
    pub chunk_count: usize,
}

pub struct DocumentChunker {
    config: ChunkingConfig,
    file_stats: BTreeMap<String, FileStats>,
    summary: ProcessingSummary,
}

impl DocumentChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
            return Err(Error::Configuration(format!(
                "chunk_overlap ({}) must be smaller than a positive chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self { config, file_stats: BTreeMap::new(), summary: ProcessingSummary::default() })
    }

    /// Chunk every new or modified document of `corpus`.
    ///
    /// Unreadable documents are logged and skipped; an unreachable corpus is fatal.
    pub fn process_corpus(&mut self, corpus: &dyn Corpus) -> Result<Vec<Chunk>> {
        let paths = corpus.list()?;
        let mut summary = ProcessingSummary::default();
        let mut seen = HashSet::with_capacity(paths.len());
        let mut chunks = Vec::new();

        for path in paths {
            seen.insert(path.clone());
            let doc = match corpus.load(&path) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path, error = %e, "skipping unreadable document");
                    summary.failed.push(path);
                    continue;
                }
            };
            let hash = content_hash(&doc.content);
            if self.file_stats.get(&path).is_some_and(|s| s.content_hash == hash) {
                debug!(path = %path, "unchanged, skipping");
                summary.unchanged.push(path);
                continue;
            }
            let doc_chunks = self.chunk_document(&doc.path, &doc.content);
            debug!(path = %path, chunks = doc_chunks.len(), "chunked document");
            self.file_stats.insert(
                path.clone(),
                FileStats {
                    content_hash: hash,
                    chunk_count: doc_chunks.len(),
                    mtime: doc.mtime,
                    size: doc.size,
                    processed_at: Utc::now(),
                },
            );
            summary.changed.push(path);
            chunks.extend(doc_chunks);
        }

        let gone: Vec<String> = self.file_stats.keys().filter(|p| !seen.contains(*p)).cloned().collect();
        for path in gone {
            self.file_stats.remove(&path);
            summary.removed.push(path);
        }

        summary.chunk_count = chunks.len();
        info!(
            changed = summary.changed.len(),
            unchanged = summary.unchanged.len(),
            failed = summary.failed.len(),
            removed = summary.removed.len(),
            chunks = summary.chunk_count,
            "processed corpus"
        );
        self.summary = summary;
        Ok(chunks)
    }

    /// Pure chunking of one document; no stats are touched.
    pub fn chunk_document(&self, path: &str, content: &str) -> Vec<Chunk> {
        let title = document_title(path, content);
        let pieces = match split_sections(content, &title) {
            Some(sections) => sections,
            None => self.sliding_window(content).into_iter().map(|w| (title.clone(), w)).collect(),
        };
        pieces
            .into_iter()
            .enumerate()
            .map(|(i, (section_title, body))| Chunk::new(path, &section_title, i, body))
            .collect()
    }

    fn sliding_window(&self, content: &str) -> Vec<String> {
        let chars: Vec<char> = content.chars().collect();
        let step = self.config.chunk_size - self.config.chunk_overlap;
        let mut windows = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.config.chunk_size).min(chars.len());
            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                windows.push(piece.to_string());
            }
            if end >= chars.len() {
                break;
            }
            start += step;
        }
        windows
    }

    pub fn summary(&self) -> &ProcessingSummary {
        &self.summary
    }

    pub fn file_stats(&self) -> &BTreeMap<String, FileStats> {
        &self.file_stats
    }

    pub fn restore_stats(&mut self, stats: BTreeMap<String, FileStats>) {
        self.file_stats = stats;
    }

    /// Forget one file so the next run reprocesses it.
    pub fn forget(&mut self, path: &str) {
        self.file_stats.remove(path);
    }

    /// Forget everything; the next run reprocesses the whole corpus.
    pub fn reset(&mut self) {
        self.file_stats.clear();
    }
}

fn section_heading(line: &str) -> Option<String> {
    let line = line.trim_end();
    let rest = line.strip_prefix("### ").or_else(|| line.strip_prefix("## "))?;
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() { None } else { Some(title.to_string()) }
}

fn document_title(path: &str, content: &str) -> String {
    content
        .lines()
        .find_map(|l| l.trim_end().strip_prefix("# ").map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| {
            Path::new(path).file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| path.to_string())
        })
}

/// `(title, content)` per non-empty section, or `None` when there are no level 2–3 headings.
fn split_sections(content: &str, doc_title: &str) -> Option<Vec<(String, String)>> {
    let mut sections = Vec::new();
    let mut preamble: Vec<&str> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in content.lines() {
        if let Some(title) = section_heading(line) {
            if let Some((t, lines)) = current.take() {
                push_section(&mut sections, t, &lines);
            }
            current = Some((title, vec![line]));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        } else {
            preamble.push(line);
        }
    }
    let (t, lines) = current?;
    push_section(&mut sections, t, &lines);

    // Text before the first section survives only if it is more than an H1 title.
    let body: Vec<&str> = preamble.into_iter().filter(|l| !l.trim_start().starts_with("# ")).collect();
    let body = body.join("\n");
    let body = body.trim();
    if !body.is_empty() {
        sections.insert(0, (doc_title.to_string(), body.to_string()));
    }
    Some(sections)
}

fn push_section(sections: &mut Vec<(String, String)>, title: String, lines: &[&str]) {
    let has_body = lines.iter().skip(1).any(|l| !l.trim().is_empty());
    if has_body {
        sections.push((title, lines.join("\n").trim().to_string()));
    }
}
