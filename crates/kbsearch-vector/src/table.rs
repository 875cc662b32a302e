//! Side table: content and metadata per vector position, plus tombstones.
//!
//! Persisted as `metadata.json` next to the vector blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use kbsearch_core::types::ChunkMetadata;

use crate::index::IndexType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// On-disk shape of the side table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideTable {
    pub records: BTreeMap<usize, StoredRecord>,
    #[serde(default)]
    pub removed: BTreeSet<usize>,
    pub total_vectors: usize,
    pub dimension: usize,
    pub index_type: IndexType,
    pub saved_at: DateTime<Utc>,
    /// Must equal the stamp inside `vectors.bin` written by the same save.
    #[serde(default)]
    pub stamp: String,
}

#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    records: Vec<StoredRecord>,
    removed: BTreeSet<usize>,
}

impl MetadataTable {
    pub fn push(&mut self, record: StoredRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    pub fn get(&self, position: usize) -> Option<&StoredRecord> {
        self.records.get(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_removed(&self, position: usize) -> bool {
        self.removed.contains(&position)
    }

    pub fn removed_len(&self) -> usize {
        self.removed.len()
    }

    /// Tombstone a position; returns `false` if it was already removed or out of range.
    pub fn remove(&mut self, position: usize) -> bool {
        position < self.records.len() && self.removed.insert(position)
    }

    /// All records, tombstoned ones included.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &StoredRecord)> {
        self.records.iter().enumerate()
    }

    pub fn live(&self) -> impl Iterator<Item = (usize, &StoredRecord)> {
        self.iter().filter(move |(pos, _)| !self.removed.contains(pos))
    }

    pub fn to_side_table(&self, dimension: usize, index_type: IndexType, stamp: &str) -> SideTable {
        SideTable {
            records: self.records.iter().cloned().enumerate().collect(),
            removed: self.removed.clone(),
            total_vectors: self.records.len(),
            dimension,
            index_type,
            saved_at: Utc::now(),
            stamp: stamp.to_string(),
        }
    }

    /// Rebuild from disk; positions must be exactly `0..total_vectors`.
    pub fn from_side_table(table: SideTable) -> Result<Self, String> {
        if table.records.len() != table.total_vectors {
            return Err(format!("{} records for {} vectors", table.records.len(), table.total_vectors));
        }
        let mut records = Vec::with_capacity(table.total_vectors);
        for (expected, (pos, record)) in table.records.into_iter().enumerate() {
            if pos != expected {
                return Err(format!("missing record for position {expected}"));
            }
            records.push(record);
        }
        if let Some(bad) = table.removed.iter().find(|&&p| p >= records.len()) {
            return Err(format!("tombstone {bad} past the last position"));
        }
        Ok(Self { records, removed: table.removed })
    }
}
