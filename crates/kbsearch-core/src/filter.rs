//! Typed metadata predicates: a conjunction of `(field, operator, value)` triples
//! evaluated against [`ChunkMetadata`].

use serde::{Deserialize, Serialize};

use crate::types::ChunkMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    SourcePath,
    SectionTitle,
    PositionIndex,
    CharCount,
    WordCount,
    EmbeddingSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Contains,
    StartsWith,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: MetadataField,
    pub op: FilterOp,
    pub value: FilterValue,
}

enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
}

impl Predicate {
    pub fn new(field: MetadataField, op: FilterOp, value: FilterValue) -> Self {
        Self { field, op, value }
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        let actual = match self.field {
            MetadataField::SourcePath => FieldValue::Text(&meta.source_path),
            MetadataField::SectionTitle => FieldValue::Text(&meta.section_title),
            MetadataField::EmbeddingSource => FieldValue::Text(meta.embedding_source.as_str()),
            MetadataField::PositionIndex => FieldValue::Number(meta.position_index as f64),
            MetadataField::CharCount => FieldValue::Number(meta.char_count as f64),
            MetadataField::WordCount => FieldValue::Number(meta.word_count as f64),
        };
        match (actual, &self.value) {
            (FieldValue::Text(a), FilterValue::Text(b)) => match self.op {
                FilterOp::Eq => a == b,
                FilterOp::Ne => a != b,
                FilterOp::Contains => a.to_lowercase().contains(&b.to_lowercase()),
                FilterOp::StartsWith => a.starts_with(b.as_str()),
                FilterOp::Gt => a > b.as_str(),
                FilterOp::Gte => a >= b.as_str(),
                FilterOp::Lt => a < b.as_str(),
                FilterOp::Lte => a <= b.as_str(),
            },
            (FieldValue::Number(a), FilterValue::Number(b)) => match self.op {
                FilterOp::Eq => (a - b).abs() < f64::EPSILON,
                FilterOp::Ne => (a - b).abs() >= f64::EPSILON,
                FilterOp::Gt => a > *b,
                FilterOp::Gte => a >= *b,
                FilterOp::Lt => a < *b,
                FilterOp::Lte => a <= *b,
                FilterOp::Contains | FilterOp::StartsWith => false,
            },
            // A type mismatch never matches.
            _ => false,
        }
    }
}

/// All predicates must hold. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub predicates: Vec<Predicate>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, field: MetadataField, op: FilterOp, value: FilterValue) -> Self {
        self.predicates.push(Predicate::new(field, op, value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        self.predicates.iter().all(|p| p.matches(meta))
    }

    /// Stable textual form, used as part of response cache keys.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(&self.predicates).unwrap_or_default()
    }
}
