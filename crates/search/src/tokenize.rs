//! Token extraction for the prefix index.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Default stop words; high-frequency English glue that would dominate
/// autocomplete without carrying retrieval signal.
static DEFAULT_STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "did", "do",
        "does", "for", "from", "had", "has", "have", "he", "her", "his", "if", "in", "is", "it",
        "its", "my", "no", "not", "of", "on", "or", "our", "she", "so", "than", "that", "the",
        "their", "then", "these", "they", "this", "those", "to", "too", "was", "we", "were",
        "will", "with", "you", "your",
    ]
    .into()
});

/// Tokenization policy: length bounds and the stop-word set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub min_len: usize,
    pub max_len: usize,
    pub stop_words: HashSet<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_len: 2,
            max_len: 50,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TokenizerConfig {
    pub fn with_stop_words(mut self, words: impl IntoIterator<Item = String>) -> Self {
        self.stop_words = words.into_iter().collect();
        self
    }
}

/// Lowercased alphanumeric tokens of `text`, duplicates preserved so the
/// caller can count frequency.
pub fn tokenize(text: &str, cfg: &TokenizerConfig) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_lowercase())
        .filter(|t| {
            let chars = t.chars().count();
            chars >= cfg.min_len && chars <= cfg.max_len && !cfg.stop_words.contains(t.as_str())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_non_alphanumerics_and_lowercases() {
        let tokens = tokenize("Neural-Network training, v2!", &TokenizerConfig::default());
        assert_eq!(tokens, vec!["neural", "network", "training", "v2"]);
    }

    #[test]
    fn drops_short_long_and_stop_words() {
        let cfg = TokenizerConfig::default();
        let long = "x".repeat(51);
        let text = format!("a I the sourdough {long}");
        assert_eq!(tokenize(&text, &cfg), vec!["sourdough"]);
    }

    #[test]
    fn duplicates_preserved_for_frequency() {
        let tokens = tokenize("cat cat dog", &TokenizerConfig::default());
        assert_eq!(tokens, vec!["cat", "cat", "dog"]);
    }

    #[test]
    fn custom_stop_words() {
        let cfg = TokenizerConfig::default().with_stop_words(vec!["dog".to_string()]);
        assert_eq!(tokenize("the dog barks", &cfg), vec!["the", "barks"]);
    }
}
