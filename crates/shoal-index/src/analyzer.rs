//! Text analysis for analyzed (`text`) fields and the `_all` catch-all field.
//!
//! Every analyzed field uses one pipeline, registered with each index under
//! [`SHOAL_TOKENIZER`]:
//! 1. `SimpleTokenizer` splits on whitespace and punctuation
//! 2. `LowerCaser` normalizes case
//! 3. `RemoveLongFilter` drops tokens longer than 40 bytes
//! 4. `Stemmer` applies the configured language's stemming
//!
//! The query compiler runs query text through the same pipeline so that query
//! terms line up with indexed terms.
//!
//! Text is also indexed under [`SHOAL_PREFIX_TOKENIZER`], the same pipeline
//! without the stemmer, so prefix queries see whole words.

use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer, TokenStream,
};

use crate::IndexError;

/// Name of the tokenizer registered with every shoal index.
pub const SHOAL_TOKENIZER: &str = "shoal_text";

/// Name of the unstemmed tokenizer behind prefix companion fields.
pub const SHOAL_PREFIX_TOKENIZER: &str = "shoal_prefix";

/// Maximum token length in bytes before filtering.
const MAX_TOKEN_LENGTH: usize = 40;

/// Stemmer languages accepted in `search.stemmer`.
const LANGUAGES: [(&str, Language); 18] = [
    ("arabic", Language::Arabic),
    ("danish", Language::Danish),
    ("dutch", Language::Dutch),
    ("english", Language::English),
    ("finnish", Language::Finnish),
    ("french", Language::French),
    ("german", Language::German),
    ("greek", Language::Greek),
    ("hungarian", Language::Hungarian),
    ("italian", Language::Italian),
    ("norwegian", Language::Norwegian),
    ("portuguese", Language::Portuguese),
    ("romanian", Language::Romanian),
    ("russian", Language::Russian),
    ("spanish", Language::Spanish),
    ("swedish", Language::Swedish),
    ("tamil", Language::Tamil),
    ("turkish", Language::Turkish),
];

/// Parses a stemmer language name, ignoring case.
pub fn parse_language(name: &str) -> Result<Language, IndexError> {
    let lowered = name.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == lowered)
        .map(|(_, language)| *language)
        .ok_or(IndexError::InvalidLanguage(lowered))
}

/// Builds the analyzer for the given stemmer language.
pub fn build_analyzer(language: Language) -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LENGTH))
        .filter(Stemmer::new(language))
        .build()
}

/// Builds the unstemmed analyzer used for prefix matching.
pub fn build_prefix_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LENGTH))
        .build()
}

/// Builds the analyzer from a language name.
pub fn build_analyzer_from_name(language_name: &str) -> Result<TextAnalyzer, IndexError> {
    Ok(build_analyzer(parse_language(language_name)?))
}

/// Runs `text` through the analyzer and returns the resulting terms in order.
pub fn analyze(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
    let mut stream = analyzer.token_stream(text);
    let mut terms = Vec::new();
    while stream.advance() {
        terms.push(stream.token().text.clone());
    }
    terms
}

#[cfg(test)]
mod test {
    use super::*;

    fn english() -> TextAnalyzer {
        build_analyzer(Language::English)
    }

    #[test]
    fn every_listed_language_parses() {
        for (name, expected) in LANGUAGES {
            assert_eq!(parse_language(name).unwrap(), expected, "{name}");
        }
    }

    #[test]
    fn language_names_ignore_case() {
        assert_eq!(parse_language("English").unwrap(), Language::English);
        assert_eq!(parse_language("GeRmAn").unwrap(), Language::German);
    }

    #[test]
    fn unknown_language_is_reported() {
        let err = parse_language("Klingon").unwrap_err();
        assert!(matches!(err, IndexError::InvalidLanguage(ref name) if name == "klingon"));
    }

    #[test]
    fn lowercases_and_stems() {
        assert_eq!(
            analyze(&mut english(), "HANDLING Running"),
            vec!["handl", "run"]
        );
    }

    #[test]
    fn splits_punctuation() {
        assert_eq!(
            analyze(&mut english(), "hello, world! foo-bar"),
            vec!["hello", "world", "foo", "bar"]
        );
    }

    #[test]
    fn drops_long_tokens() {
        let text = format!("short {} word", "a".repeat(50));
        assert_eq!(analyze(&mut english(), &text), vec!["short", "word"]);
    }

    #[test]
    fn punctuation_only_yields_nothing() {
        assert!(analyze(&mut english(), " ,.; ").is_empty());
    }

    #[test]
    fn prefix_analyzer_keeps_whole_words() {
        let mut analyzer = build_prefix_analyzer();
        assert_eq!(analyze(&mut analyzer, "Running Shoes"), vec!["running", "shoes"]);
    }

    #[test]
    fn build_from_name_rejects_unknown() {
        assert!(build_analyzer_from_name("english").is_ok());
        assert!(build_analyzer_from_name("invalid").is_err());
    }
}
