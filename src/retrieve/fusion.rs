//! Result fusion for the hybrid retriever.
//!
//! Two pure fusion functions over the BM25 and dense result lists:
//! weighted linear combination of min-max normalized scores, and
//! Reciprocal Rank Fusion (Cormack, Clarke, Buettcher 2009). Both
//! deduplicate by chunk id, keeping the first occurrence's payload with
//! the combined score, and sort descending with ascending-chunk-id
//! tie-breaking.

use std::collections::HashMap;

use uuid::Uuid;

use crate::core::{RetrievalOrigin, RetrievalResult};

/// Min-max normalizes a list's scores to [0, 1] over its own result set.
///
/// A degenerate list (all scores equal) maps to 1.0: its members are
/// mutually tied at the top of that list.
fn min_max(results: &[RetrievalResult]) -> HashMap<Uuid, f32> {
    let Some(max) = results
        .iter()
        .map(|r| r.score)
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    else {
        return HashMap::new();
    };
    let min = results
        .iter()
        .map(|r| r.score)
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or(max);

    results
        .iter()
        .map(|r| {
            let normalized = if max > min {
                (r.score - min) / (max - min)
            } else {
                1.0
            };
            (r.chunk_id, normalized)
        })
        .collect()
}

/// Materializes fused scores back into results, deduplicating by chunk id
/// with first occurrence (BM25 list first, then dense) winning the
/// payload.
fn materialize(
    scores: &HashMap<Uuid, f32>,
    bm25: &[RetrievalResult],
    dense: &[RetrievalResult],
    top_k: usize,
) -> Vec<RetrievalResult> {
    let mut fused: Vec<RetrievalResult> = Vec::with_capacity(scores.len());
    let mut seen: HashMap<Uuid, ()> = HashMap::new();

    for result in bm25.iter().chain(dense.iter()) {
        if seen.insert(result.chunk_id, ()).is_some() {
            continue;
        }
        if let Some(&score) = scores.get(&result.chunk_id) {
            let mut fused_result = result.clone();
            fused_result.score = score;
            fused_result.origin = RetrievalOrigin::Hybrid;
            fused.push(fused_result);
        }
    }

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused.truncate(top_k);
    fused
}

/// Weighted linear fusion: `alpha * bm25_norm + beta * dense_norm`, with
/// each side min-max normalized over its own list and a missing side
/// contributing 0.
#[must_use]
pub fn weighted_fusion(
    bm25: &[RetrievalResult],
    dense: &[RetrievalResult],
    alpha: f32,
    beta: f32,
    top_k: usize,
) -> Vec<RetrievalResult> {
    let bm25_norm = min_max(bm25);
    let dense_norm = min_max(dense);

    let mut scores: HashMap<Uuid, f32> = HashMap::new();
    for (id, score) in &bm25_norm {
        *scores.entry(*id).or_insert(0.0) += alpha * score;
    }
    for (id, score) in &dense_norm {
        *scores.entry(*id).or_insert(0.0) += beta * score;
    }

    materialize(&scores, bm25, dense, top_k)
}

/// Reciprocal Rank Fusion: `score(d) = Σ_lists 1 / (k + rank(d))` with
/// 1-based ranks; absence from a list contributes 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn reciprocal_rank_fusion(
    bm25: &[RetrievalResult],
    dense: &[RetrievalResult],
    k: u32,
    top_k: usize,
) -> Vec<RetrievalResult> {
    let mut scores: HashMap<Uuid, f32> = HashMap::new();
    for list in [bm25, dense] {
        for (rank, result) in list.iter().enumerate() {
            let rrf = 1.0 / (f64::from(k) + rank as f64 + 1.0);
            *scores.entry(result.chunk_id).or_insert(0.0) += rrf as f32;
        }
    }

    materialize(&scores, bm25, dense, top_k)
}
