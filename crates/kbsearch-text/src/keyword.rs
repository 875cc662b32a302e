use tantivy::tokenizer::TextAnalyzer;
use tracing::debug;

use crate::analyzer::{build_query_analyzer, tokenize};

/// Density is capped so one term repeated all over a chunk cannot dominate.
pub const MAX_DENSITY: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
	pub score: f32,
	pub matched_terms: Vec<String>,
}

/// Lexical scorer over raw chunk content.
///
/// `score = (matched terms / query terms) * min(occurrences / query terms, 2.0)`,
/// capped at 1.0.
#[derive(Clone)]
pub struct KeywordScorer {
	analyzer: TextAnalyzer,
}

impl Default for KeywordScorer {
	fn default() -> Self { Self::new() }
}

impl KeywordScorer {
	pub fn new() -> Self { Self { analyzer: build_query_analyzer() } }

	pub fn terms(&self, query: &str) -> Vec<String> {
		let mut analyzer = self.analyzer.clone();
		tokenize(&mut analyzer, query)
	}

	pub fn score(terms: &[String], content: &str) -> Option<KeywordMatch> {
		if terms.is_empty() { return None; }
		let lower = content.to_lowercase();
		let mut matched_terms = Vec::new();
		let mut occurrences = 0usize;
		for term in terms {
			let n = lower.matches(term.as_str()).count();
			if n > 0 { matched_terms.push(term.clone()); occurrences += n; }
		}
		if matched_terms.is_empty() { return None; }
		let n_terms = terms.len() as f32;
		let coverage = matched_terms.len() as f32 / n_terms;
		let density = (occurrences as f32 / n_terms).min(MAX_DENSITY);
		let score = (coverage * density).min(1.0);
		(score > 0.0).then_some(KeywordMatch { score, matched_terms })
	}

	/// Top `k` of `docs` by keyword score, ties kept in encounter order.
	pub fn rank<'a, K, I>(&self, query: &str, docs: I, k: usize) -> Vec<(K, KeywordMatch)>
	where
		I: IntoIterator<Item = (K, &'a str)>,
	{
		let terms = self.terms(query);
		if terms.is_empty() || k == 0 { return Vec::new(); }
		let mut scored: Vec<(usize, K, KeywordMatch)> = docs
			.into_iter()
			.enumerate()
			.filter_map(|(seq, (key, content))| Self::score(&terms, content).map(|m| (seq, key, m)))
			.collect();
		debug!(terms = ?terms, candidates = scored.len(), "keyword scan");
		scored.sort_by(|a, b| b.2.score.total_cmp(&a.2.score).then(a.0.cmp(&b.0)));
		scored.truncate(k);
		scored.into_iter().map(|(_, key, m)| (key, m)).collect()
	}
}
