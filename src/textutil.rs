//! Shared text utilities: tokenization and stopwords.
//!
//! One tokenizer feeds the lexical index, the grounding checks, and the
//! evaluation metrics so their token universes agree.

use std::collections::HashSet;
use std::sync::LazyLock;

use unicode_segmentation::UnicodeSegmentation;

/// English stopwords stripped before grounding comparisons.
static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
        "her", "his", "i", "if", "in", "into", "is", "it", "its", "not", "of", "on", "or", "she",
        "that", "the", "their", "them", "they", "this", "to", "was", "were", "will", "with", "you",
    ]
    .into_iter()
    .collect()
});

/// Splits text into lowercase word tokens on unicode word boundaries.
///
/// Punctuation and whitespace are dropped; numbers survive.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(str::to_lowercase)
        .collect()
}

/// Tokenizes and removes stopwords.
#[must_use]
pub fn tokenize_content(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(t.as_str()))
        .collect()
}

/// Whether a token is a stopword.
#[must_use]
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Multiset-overlap F1 between two token lists.
///
/// Symmetric: `f1_overlap(a, b) == f1_overlap(b, a)`. Empty-vs-empty is
/// 1.0; empty-vs-nonempty is 0.0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn f1_overlap(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for token in a {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }
    let mut overlap = 0usize;
    for token in b {
        if let Some(count) = counts.get_mut(token.as_str())
            && *count > 0
        {
            *count -= 1;
            overlap += 1;
        }
    }
    if overlap == 0 {
        return 0.0;
    }

    let precision = overlap as f64 / b.len() as f64;
    let recall = overlap as f64 / a.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Token-level F1 between two texts, over all word tokens.
#[must_use]
pub fn token_f1(a: &str, b: &str) -> f64 {
    f1_overlap(&tokenize(a), &tokenize(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_strips_punctuation() {
        let tokens = tokenize("Paris is the Capital, of France!");
        assert_eq!(tokens, vec!["paris", "is", "the", "capital", "of", "france"]);
    }

    #[test]
    fn test_tokenize_keeps_numbers() {
        let tokens = tokenize("chapter 42 covers BM25");
        assert!(tokens.contains(&"42".to_string()));
        assert!(tokens.contains(&"bm25".to_string()));
    }

    #[test]
    fn test_tokenize_content_removes_stopwords() {
        let tokens = tokenize_content("Paris is the capital of France");
        assert_eq!(tokens, vec!["paris", "capital", "france"]);
    }

    #[test]
    fn test_is_stopword() {
        assert!(is_stopword("the"));
        assert!(!is_stopword("paris"));
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  \t\n ").is_empty());
    }

    #[test]
    fn test_token_f1_identical() {
        assert!((token_f1("paris capital", "paris capital") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_token_f1_disjoint() {
        assert!(token_f1("alpha beta", "gamma delta").abs() < 1e-9);
    }

    #[test]
    fn test_token_f1_partial() {
        // overlap 1, |a| 2, |b| 2: p = r = 0.5, f1 = 0.5.
        assert!((token_f1("paris capital", "paris city") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_token_f1_multiset_counts() {
        // "a a b" vs "a b b": overlap a(1) + b(1) = 2 of 3 each side.
        let f1 = token_f1("a a b", "a b b");
        assert!((f1 - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_token_f1_empty_cases() {
        assert!((token_f1("", "") - 1.0).abs() < 1e-9);
        assert!(token_f1("", "words").abs() < 1e-9);
    }

    proptest::proptest! {
        #[test]
        fn prop_token_f1_symmetric(a in "[a-c ]{0,20}", b in "[a-c ]{0,20}") {
            let forward = token_f1(&a, &b);
            let backward = token_f1(&b, &a);
            proptest::prop_assert!((forward - backward).abs() < 1e-12);
        }

        #[test]
        fn prop_token_f1_bounded(a in "[a-d ]{0,20}", b in "[a-d ]{0,20}") {
            let f1 = token_f1(&a, &b);
            proptest::prop_assert!((0.0..=1.0).contains(&f1));
        }
    }
}
