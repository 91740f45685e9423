//! Retrieval and generation metrics.
//!
//! Pure functions over per-sample data: Precision@k / Recall@k / MRR for
//! retrieval, ExactMatch / TokenF1 / BLEU-4 / ROUGE for generation, and
//! nearest-rank percentiles for latency.

use std::collections::HashMap;

use uuid::Uuid;

use crate::textutil::{f1_overlap, tokenize};

pub use crate::textutil::token_f1;

/// Precision@k: fraction of the first `k` retrieved documents that are
/// relevant. Empty retrieval or `k == 0` scores 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn precision_at_k(retrieved: &[Uuid], relevant: &[Uuid], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let considered: Vec<&Uuid> = retrieved.iter().take(k).collect();
    if considered.is_empty() {
        return 0.0;
    }
    let hits = considered
        .iter()
        .filter(|id| relevant.contains(id))
        .count();
    hits as f64 / considered.len() as f64
}

/// Recall@k: fraction of relevant documents found within the first `k`.
/// No relevant documents scores 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn recall_at_k(retrieved: &[Uuid], relevant: &[Uuid], k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let found = relevant
        .iter()
        .filter(|id| retrieved.iter().take(k).any(|r| r == *id))
        .count();
    found as f64 / relevant.len() as f64
}

/// Mean reciprocal rank of the first relevant document (1-based), 0 when
/// none is retrieved.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn reciprocal_rank(retrieved: &[Uuid], relevant: &[Uuid]) -> f64 {
    retrieved
        .iter()
        .position(|id| relevant.contains(id))
        .map_or(0.0, |rank| 1.0 / (rank + 1) as f64)
}

/// Normalizes for exact matching: lowercase, whitespace collapsed.
fn normalize_answer(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Alias-aware exact match: the prediction matches the expected answer or
/// any alias after case and whitespace normalization.
#[must_use]
pub fn exact_match(prediction: &str, expected: &str, aliases: &[String]) -> bool {
    let normalized = normalize_answer(prediction);
    if normalized == normalize_answer(expected) {
        return true;
    }
    aliases
        .iter()
        .any(|alias| normalized == normalize_answer(alias))
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts: HashMap<&[String], usize> = HashMap::new();
    if tokens.len() >= n {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

/// Smoothed BLEU-4 with brevity penalty.
///
/// Modified n-gram precisions for n = 1..4 with add-one smoothing on the
/// higher orders (so a single missing 4-gram does not zero the score),
/// geometric mean, and the standard `exp(1 - r/c)` brevity penalty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bleu_4(candidate: &str, reference: &str) -> f64 {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);
    if cand.is_empty() || refr.is_empty() {
        return 0.0;
    }

    let mut log_precision_sum = 0.0f64;
    for n in 1..=4usize {
        let cand_grams = ngram_counts(&cand, n);
        let ref_grams = ngram_counts(&refr, n);
        let total: usize = cand_grams.values().sum();
        let clipped: usize = cand_grams
            .iter()
            .map(|(gram, count)| (*count).min(ref_grams.get(gram).copied().unwrap_or(0)))
            .sum();

        let precision = if n == 1 {
            if total == 0 || clipped == 0 {
                return 0.0;
            }
            clipped as f64 / total as f64
        } else {
            (clipped + 1) as f64 / (total + 1) as f64
        };
        log_precision_sum += precision.ln();
    }

    let brevity_penalty = if cand.len() >= refr.len() {
        1.0
    } else {
        (1.0 - refr.len() as f64 / cand.len() as f64).exp()
    };

    brevity_penalty * (log_precision_sum / 4.0).exp()
}

/// Longest common subsequence length over token sequences.
fn lcs_len(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for token_a in a {
        for (j, token_b) in b.iter().enumerate() {
            current[j + 1] = if token_a == token_b {
                prev[j] + 1
            } else {
                prev[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// ROUGE-L F1: LCS-based precision/recall harmonic mean.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rouge_l(candidate: &str, reference: &str) -> f64 {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);
    if cand.is_empty() || refr.is_empty() {
        return 0.0;
    }
    let lcs = lcs_len(&cand, &refr) as f64;
    if lcs == 0.0 {
        return 0.0;
    }
    let precision = lcs / cand.len() as f64;
    let recall = lcs / refr.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// ROUGE-1 F1: unigram overlap.
#[must_use]
pub fn rouge_1(candidate: &str, reference: &str) -> f64 {
    f1_overlap(&tokenize(candidate), &tokenize(reference))
}

/// Nearest-rank percentile over a sample; `p` in (0, 100]. The input
/// need not be sorted.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// The composite benchmark scalar:
/// `0.15·P@10 + 0.15·R@10 + 0.2·MRR + 0.4·F1 − 0.1·(p95_ms/1000)`.
///
/// When p95 latency is unavailable the penalty is 0 and the second
/// return value says so (the report annotates it).
#[must_use]
pub fn composite_score(
    precision_at_10: f64,
    recall_at_10: f64,
    mrr: f64,
    token_f1: f64,
    p95_latency_ms: Option<f64>,
) -> (f64, bool) {
    let penalty = p95_latency_ms.map_or(0.0, |ms| 0.1 * (ms / 1000.0));
    let score = 0.4f64.mul_add(
        token_f1,
        0.2f64.mul_add(mrr, 0.15f64.mul_add(precision_at_10, 0.15 * recall_at_10)),
    ) - penalty;
    (score, p95_latency_ms.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|i| Uuid::from_u128(i as u128 + 1)).collect()
    }

    #[test]
    fn test_precision_at_k() {
        let docs = ids(4);
        let retrieved = vec![docs[0], docs[1], docs[2]];
        let relevant = vec![docs[0], docs[3]];
        assert!((precision_at_k(&retrieved, &relevant, 3) - 1.0 / 3.0).abs() < 1e-9);
        assert!((precision_at_k(&retrieved, &relevant, 1) - 1.0).abs() < 1e-9);
        assert!(precision_at_k(&[], &relevant, 10).abs() < 1e-9);
        assert!(precision_at_k(&retrieved, &relevant, 0).abs() < 1e-9);
    }

    #[test]
    fn test_recall_at_k() {
        let docs = ids(4);
        let retrieved = vec![docs[0], docs[1]];
        let relevant = vec![docs[0], docs[3]];
        assert!((recall_at_k(&retrieved, &relevant, 10) - 0.5).abs() < 1e-9);
        assert!(recall_at_k(&retrieved, &[], 10).abs() < 1e-9);
    }

    #[test]
    fn test_reciprocal_rank() {
        let docs = ids(3);
        assert!((reciprocal_rank(&[docs[1], docs[0]], &[docs[0]]) - 0.5).abs() < 1e-9);
        assert!((reciprocal_rank(&[docs[0]], &[docs[0]]) - 1.0).abs() < 1e-9);
        assert!(reciprocal_rank(&[docs[1]], &[docs[0]]).abs() < 1e-9);
    }

    #[test]
    fn test_exact_match_normalization() {
        assert!(exact_match("  Paris ", "paris", &[]));
        assert!(exact_match("The   City of Light", "the city of light", &[]));
        assert!(!exact_match("Paris", "Lyon", &[]));
    }

    #[test]
    fn test_exact_match_aliases() {
        let aliases = vec!["City of Light".to_string()];
        assert!(exact_match("city  of light", "Paris", &aliases));
        assert!(!exact_match("city of dark", "Paris", &aliases));
    }

    #[test]
    fn test_exact_match_reflexive() {
        assert!(exact_match("Any Answer Here", "any answer here", &[]));
    }

    #[test]
    fn test_bleu_identical() {
        let text = "the quick brown fox jumps over the lazy dog";
        assert!((bleu_4(text, text) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bleu_disjoint_is_zero() {
        assert!(bleu_4("alpha beta gamma delta", "one two three four").abs() < 1e-9);
    }

    #[test]
    fn test_bleu_partial_between_zero_and_one() {
        let score = bleu_4(
            "the quick brown fox jumps high",
            "the quick brown fox jumps over the lazy dog",
        );
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_bleu_brevity_penalty() {
        let reference = "one two three four five six seven eight";
        let short = bleu_4("one two three four", reference);
        let full = bleu_4(reference, reference);
        assert!(short < full);
    }

    #[test]
    fn test_rouge_l() {
        assert!((rouge_l("a b c d", "a b c d") - 1.0).abs() < 1e-9);
        assert!(rouge_l("x y z", "a b c").abs() < 1e-9);
        // "a c" is an LCS of length 2: p = 1.0, r = 0.5, f1 = 2/3.
        let score = rouge_l("a c", "a b c d");
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rouge_1() {
        assert!((rouge_1("b a", "a b") - 1.0).abs() < 1e-9);
        assert!(rouge_1("x", "y").abs() < 1e-9);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        assert!((percentile(&samples, 50.0) - 50.0).abs() < 1e-9);
        assert!((percentile(&samples, 95.0) - 95.0).abs() < 1e-9);
        assert!((percentile(&samples, 99.0) - 99.0).abs() < 1e-9);
        assert!((percentile(&samples, 100.0) - 100.0).abs() < 1e-9);

        let small = vec![10.0, 20.0, 30.0];
        assert!((percentile(&small, 50.0) - 20.0).abs() < 1e-9);
        assert!((percentile(&small, 95.0) - 30.0).abs() < 1e-9);
        assert!(percentile(&[], 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_composite_score() {
        let (score, note) = composite_score(1.0, 1.0, 1.0, 1.0, Some(1000.0));
        assert!((score - (0.15 + 0.15 + 0.2 + 0.4 - 0.1)).abs() < 1e-9);
        assert!(!note);

        let (score, note) = composite_score(1.0, 1.0, 1.0, 1.0, None);
        assert!((score - 0.9).abs() < 1e-9);
        assert!(note);
    }
}
