use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

/// Terms this short never count as keywords.
pub const MIN_TERM_CHARS: usize = 3;

pub const ENGLISH_STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having","about","into","over","all","any","our","you","your","we","been","were","also",
];

pub const SPANISH_STOP_WORDS: &[&str] = &[
	"el","la","los","las","un","una","unos","unas","de","del","al","y","o","que","en","por","para","con","sin","sobre","entre","como","pero","más","mas","muy","este","esta","estos","estas","ese","esa","esos","esas","sus","nos","les","lo","se","es","son","fue","ser","está","están","hay","cuando","donde","cómo","qué","cual","cuál","quien","también","todo","todos","otro","otra","desde","hasta",
];

pub fn build_query_analyzer() -> TextAnalyzer {
	let stop_words = ENGLISH_STOP_WORDS.iter().chain(SPANISH_STOP_WORDS).map(|s| s.to_string());
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(64))
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words))
		.build()
}

/// Lower-cased, stop-word-free, de-duplicated terms of `text`, in first-seen order.
pub fn tokenize(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
	let mut stream = analyzer.token_stream(text);
	let mut terms: Vec<String> = Vec::new();
	while stream.advance() {
		let term = &stream.token().text;
		if term.chars().count() >= MIN_TERM_CHARS && !terms.contains(term) {
			terms.push(term.clone());
		}
	}
	terms
}
