//! kbsearch-text
//!
//! Lexical side of hybrid search: a tantivy text analyzer with a bilingual
//! (English/Spanish) stop-word list, and the keyword relevance score computed
//! over raw chunk content.

pub mod analyzer;
pub mod keyword;

pub use analyzer::{build_query_analyzer, tokenize};
pub use keyword::{KeywordMatch, KeywordScorer};
