//! [`VectorIndex`]: flat vectors plus side table, persisted as two artifacts.

use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use bincode::config::standard as bincode_config;
use bincode::{decode_from_slice, encode_to_vec, Decode, Encode};
use chrono::Utc;

use kbsearch_core::config::SearchSettings;
use kbsearch_core::filter::MetadataFilter;
use kbsearch_core::types::ChunkMetadata;
use kbsearch_core::{Error, Result};

use crate::index::{FlatIndex, IndexType};
use crate::table::{MetadataTable, SideTable, StoredRecord};

pub const VECTORS_FILE: &str = "vectors.bin";
pub const METADATA_FILE: &str = "metadata.json";

static SAVE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Contents of `vectors.bin`.
#[derive(Encode, Decode)]
struct VectorBlob {
    stamp: String,
    flat: FlatIndex,
}

/// Unique per save, so `load` can tell artifacts of different saves apart.
fn save_stamp() -> String {
    format!("{}-{}-{}", Utc::now().timestamp_micros(), std::process::id(), SAVE_SEQ.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndexConfig {
    pub index_type: IndexType,
    pub dimension: usize,
    /// Minimum inner product for a hit.
    pub similarity_threshold: f32,
    /// Maximum L2 distance for a hit; unbounded when `None`.
    pub max_l2_distance: Option<f32>,
}

impl From<&SearchSettings> for VectorIndexConfig {
    fn from(s: &SearchSettings) -> Self {
        Self {
            index_type: IndexType::from_metric(s.similarity_metric),
            dimension: s.embedding_dimension,
            similarity_threshold: s.similarity_threshold,
            max_l2_distance: s.max_l2_distance,
        }
    }
}

impl VectorIndexConfig {
    fn accepts(&self, score: f32) -> bool {
        match self.index_type {
            IndexType::FlatIp => score >= self.similarity_threshold,
            IndexType::FlatL2 => self.max_l2_distance.map_or(true, |max| score <= max),
        }
    }
}

/// Input to [`VectorIndex::add`].
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub embedding: Vec<f32>,
    pub content: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub position: usize,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Inner product for `flat_ip`, distance for `flat_l2`.
    pub score: f32,
    /// Tombstoned but still in the index until the next rebuild.
    pub removed: bool,
}

pub struct VectorIndex {
    config: VectorIndexConfig,
    flat: FlatIndex,
    table: MetadataTable,
    /// Latest live position of every chunk id.
    by_chunk: HashMap<String, usize>,
}

impl VectorIndex {
    pub fn new(config: VectorIndexConfig) -> Self {
        let flat = FlatIndex::new(config.index_type, config.dimension);
        Self { config, flat, table: MetadataTable::default(), by_chunk: HashMap::new() }
    }

    pub fn config(&self) -> &VectorIndexConfig {
        &self.config
    }

    /// Append a batch. Either every record is added or none is.
    ///
    /// Re-adding a chunk id tombstones its previous position.
    pub fn add(&mut self, records: Vec<VectorRecord>) -> Result<Range<usize>> {
        let prepared = records
            .iter()
            .map(|r| self.flat.prepare(&r.embedding))
            .collect::<Result<Vec<_>>>()?;
        let start = self.flat.len();
        for (record, vector) in records.into_iter().zip(prepared) {
            let position = self.flat.push_prepared(&vector);
            let chunk_id = record.metadata.chunk_id.clone();
            let table_pos = self.table.push(StoredRecord { content: record.content, metadata: record.metadata });
            debug_assert_eq!(position, table_pos);
            if let Some(old) = self.by_chunk.insert(chunk_id, position) {
                self.table.remove(old);
            }
        }
        let end = self.flat.len();
        debug!(added = end - start, total = end, "vectors added");
        Ok(start..end)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        self.search_filtered(query, k, &MetadataFilter::default())
    }

    /// Top `k` hits passing the score threshold and `filter`.
    pub fn search_filtered(&self, query: &[f32], k: usize, filter: &MetadataFilter) -> Result<Vec<VectorHit>> {
        let hits = self.flat.search(query, k, |pos, score| {
            self.config.accepts(score)
                && (filter.is_empty() || self.table.get(pos).is_some_and(|r| filter.matches(&r.metadata)))
        })?;
        Ok(hits
            .into_iter()
            .filter_map(|(position, score)| {
                self.table.get(position).map(|r| VectorHit {
                    position,
                    content: r.content.clone(),
                    metadata: r.metadata.clone(),
                    score,
                    removed: self.table.is_removed(position),
                })
            })
            .collect())
    }

    /// Tombstone every live record of `source_path`; returns how many were removed.
    pub fn mark_removed(&mut self, source_path: &str) -> usize {
        let positions: Vec<usize> =
            self.table.live().filter(|(_, r)| r.metadata.source_path == source_path).map(|(p, _)| p).collect();
        for &pos in &positions {
            if let Some(r) = self.table.get(pos) {
                let id = r.metadata.chunk_id.clone();
                if self.by_chunk.get(&id) == Some(&pos) {
                    self.by_chunk.remove(&id);
                }
            }
            self.table.remove(pos);
        }
        if !positions.is_empty() {
            debug!(path = source_path, removed = positions.len(), "tombstoned file");
        }
        positions.len()
    }

    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    pub fn live_len(&self) -> usize {
        self.len() - self.table.removed_len()
    }

    pub fn removed_len(&self) -> usize {
        self.table.removed_len()
    }

    /// Live records whose vector is a placeholder.
    pub fn degraded_len(&self) -> usize {
        self.records().filter(|(_, r)| r.metadata.embedding_source.is_degraded()).count()
    }

    pub fn dimension(&self) -> usize {
        self.flat.dimension()
    }

    pub fn index_type(&self) -> IndexType {
        self.flat.index_type()
    }

    /// Live records in position order.
    pub fn records(&self) -> impl Iterator<Item = (usize, &StoredRecord)> {
        self.table.live()
    }

    pub fn record(&self, position: usize) -> Option<&StoredRecord> {
        self.table.get(position)
    }

    pub fn is_removed(&self, position: usize) -> bool {
        self.table.is_removed(position)
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.flat.vector(position)
    }

    pub fn get_by_chunk_id(&self, chunk_id: &str) -> Option<(usize, &StoredRecord)> {
        let pos = *self.by_chunk.get(chunk_id)?;
        self.table.get(pos).map(|r| (pos, r))
    }

    /// Live records of one file, ordered by position within the document.
    pub fn file_records(&self, source_path: &str) -> Vec<(usize, &StoredRecord)> {
        let mut out: Vec<_> = self.records().filter(|(_, r)| r.metadata.source_path == source_path).collect();
        out.sort_by_key(|(pos, r)| (r.metadata.position_index, *pos));
        out
    }

    /// Write `vectors.bin` and `metadata.json` under `dir`, each via rename.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let stamp = save_stamp();
        let blob = VectorBlob { stamp: stamp.clone(), flat: self.flat.clone() };
        let blob = encode_to_vec(&blob, bincode_config()).map_err(|e| Error::index_io("encode vectors", e))?;
        let side = self.table.to_side_table(self.dimension(), self.index_type(), &stamp);
        let json = serde_json::to_vec_pretty(&side)?;
        write_atomic(&dir.join(VECTORS_FILE), &blob)?;
        write_atomic(&dir.join(METADATA_FILE), &json)?;
        info!(dir = %dir.display(), vectors = self.len(), removed = self.removed_len(), "saved vector index");
        Ok(())
    }

    /// Load both artifacts from `dir`. Anything missing or inconsistent is an
    /// [`Error::IndexIo`]; nothing is served from a partial index.
    pub fn load(dir: &Path, config: VectorIndexConfig) -> Result<Self> {
        let vectors_path = dir.join(VECTORS_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        let blob = fs::read(&vectors_path).map_err(|e| Error::index_io(&vectors_path.display().to_string(), e))?;
        let json = fs::read(&metadata_path).map_err(|e| Error::index_io(&metadata_path.display().to_string(), e))?;

        let (blob, _): (VectorBlob, usize) =
            decode_from_slice(&blob, bincode_config()).map_err(|e| Error::index_io("decode vectors", e))?;
        let side: SideTable = serde_json::from_slice(&json).map_err(|e| Error::index_io("parse metadata", e))?;
        if blob.stamp != side.stamp {
            return Err(Error::IndexIo(format!(
                "vectors.bin (save {}) and metadata.json (save {}) come from different saves",
                blob.stamp, side.stamp
            )));
        }
        let flat = blob.flat;

        if flat.index_type() != config.index_type || side.index_type != config.index_type {
            return Err(Error::IndexIo(format!(
                "index was built as {}, configured metric needs {}",
                side.index_type.as_str(),
                config.index_type.as_str()
            )));
        }
        if flat.dimension() != config.dimension || side.dimension != config.dimension {
            return Err(Error::IndexIo(format!(
                "index dimension {} does not match configured {}",
                flat.dimension(),
                config.dimension
            )));
        }
        if flat.len() != side.total_vectors {
            return Err(Error::IndexIo(format!(
                "{} vectors but metadata describes {}",
                flat.len(),
                side.total_vectors
            )));
        }
        let table = MetadataTable::from_side_table(side).map_err(|e| Error::index_io("metadata", e))?;

        let mut by_chunk = HashMap::new();
        for (pos, r) in table.live() {
            by_chunk.insert(r.metadata.chunk_id.clone(), pos);
        }
        info!(dir = %dir.display(), vectors = flat.len(), removed = table.removed_len(), "loaded vector index");
        Ok(Self { config, flat, table, by_chunk })
    }

    /// Whether both artifacts exist under `dir`.
    pub fn exists(dir: &Path) -> bool {
        dir.join(VECTORS_FILE).is_file() && dir.join(METADATA_FILE).is_file()
    }
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
