use serde::{Deserialize, Serialize};
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer, TokenStream,
};

use ragdb_core::config::LexicalConfig;

pub const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of", "on",
    "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them", "their", "there",
    "then", "than", "so", "if", "when", "where", "why", "how", "what", "which", "who", "whom", "whose", "can", "could",
    "should", "would", "may", "might", "must", "shall", "do", "does", "did", "have", "had", "having",
];

/// The analysis options a lexical index was built with. Stored alongside the
/// index so terms stay comparable after a configuration change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisSettings {
    pub stemming: bool,
    pub stop_words: bool,
    pub max_token_len: usize,
}

impl From<&LexicalConfig> for AnalysisSettings {
    fn from(c: &LexicalConfig) -> Self {
        Self { stemming: c.stemming, stop_words: c.stop_words, max_token_len: c.max_token_len }
    }
}

/// Lowercases, drops stop words and overly long tokens, and stems English words.
#[derive(Clone)]
pub struct Analyzer {
    settings: AnalysisSettings,
    inner: TextAnalyzer,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer").field("settings", &self.settings).finish()
    }
}

impl Analyzer {
    pub fn new(settings: AnalysisSettings) -> Self {
        let base = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(settings.max_token_len.max(1)))
            .filter(LowerCaser);
        let inner = match (settings.stop_words, settings.stemming) {
            (true, true) => base
                .filter(stop_word_filter())
                .filter(Stemmer::new(Language::English))
                .build(),
            (true, false) => base.filter(stop_word_filter()).build(),
            (false, true) => base.filter(Stemmer::new(Language::English)).build(),
            (false, false) => base.build(),
        };
        Self { settings, inner }
    }

    pub fn settings(&self) -> AnalysisSettings {
        self.settings
    }

    /// Index terms of `text`, in order, duplicates included.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let mut analyzer = self.inner.clone();
        let mut stream = analyzer.token_stream(text);
        let mut out = Vec::new();
        while stream.advance() {
            out.push(stream.token().text.clone());
        }
        out
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalysisSettings::from(&LexicalConfig::default()))
    }
}

fn stop_word_filter() -> StopWordFilter {
    StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_stems_and_drops_stop_words() {
        let analyzer = Analyzer::default();
        assert_eq!(analyzer.tokens("The Earnings of IT"), vec!["earn"]);
    }

    #[test]
    fn plain_analysis_keeps_everything() {
        let analyzer = Analyzer::new(AnalysisSettings { stemming: false, stop_words: false, max_token_len: 40 });
        assert_eq!(analyzer.tokens("The Q3 earnings"), vec!["the", "q3", "earnings"]);
    }
}
