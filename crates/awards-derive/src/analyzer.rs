use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer, TokenStream};

/// Splits on non-alphanumeric boundaries and lower-cases. No stemming, no stop words.
pub fn title_analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.build()
}

pub fn tokenize(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
	let mut words = Vec::new();
	let mut stream = analyzer.token_stream(text);
	while stream.advance() {
		let word = &stream.token().text;
		if !word.is_empty() { words.push(word.clone()); }
	}
	words
}

/// Character-wise lower-casing, the same mapping `LowerCaser` applies to tokens.
pub fn fold_case(text: &str) -> String {
	text.chars().flat_map(char::to_lowercase).collect()
}
