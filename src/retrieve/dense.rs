//! Dense retrieval strategy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{CancelToken, RetrievalOrigin, RetrievalResult, StrategyType, TenantId};
use crate::embedding::Embedder;
use crate::error::{Error, ExternalError, Result};
use crate::index::VectorIndex;
use crate::retrieve::{Retrieval, Retriever, validate_search};

/// Retriever over the vector index.
///
/// The query is embedded as a single-element batch; raw cosine scores
/// `c ∈ [-1, 1]` map to `(c + 1) / 2 ∈ [0, 1]` and hits below the
/// configured threshold are dropped. Ties break by ascending chunk id for
/// determinism.
pub struct DenseRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    threshold: f32,
    max_top_k: usize,
    timeout: Duration,
}

impl DenseRetriever {
    /// Creates a dense retriever over the given embedder and index.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        threshold: f32,
        max_top_k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            threshold,
            max_top_k,
            timeout,
        }
    }

    /// Maps raw cosine similarity to [0, 1].
    #[must_use]
    pub fn normalize_cosine(cosine: f32) -> f32 {
        ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl Retriever for DenseRetriever {
    fn strategy(&self) -> StrategyType {
        StrategyType::Dense
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        tenant: &TenantId,
        cancel: &CancelToken,
    ) -> Result<Retrieval> {
        validate_search(query, top_k, self.max_top_k)?;
        cancel.check()?;

        let query_vec = self
            .embedder
            .embed(&[query.to_string()], cancel)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::internal("embedder returned empty batch"))?;

        let call = self.index.search(&query_vec, top_k, tenant, cancel);
        let hits = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = tokio::time::timeout(self.timeout, call) => outcome.map_err(|_| {
                Error::from(ExternalError::VectorUnavailable {
                    reason: format!("vector search timed out after {:?}", self.timeout),
                })
            })??,
        };

        let mut results: Vec<RetrievalResult> = hits
            .into_iter()
            .map(|hit| RetrievalResult {
                chunk_id: hit.chunk_id,
                document_id: hit.payload.document_id,
                score: Self::normalize_cosine(hit.score),
                text: hit.payload.text,
                highlight: None,
                origin: RetrievalOrigin::Dense,
            })
            .filter(|result| result.score >= self.threshold)
            .collect();

        // The index already orders by raw cosine; normalization is
        // monotone, so this re-sort only settles threshold-boundary ties.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        Ok(Retrieval {
            results,
            diagnostics: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DocumentChunk;
    use crate::embedding::HashEmbedder;
    use crate::index::{MemoryVectorIndex, VectorPayload};
    use uuid::Uuid;

    fn tenant() -> TenantId {
        TenantId::new("t1").unwrap()
    }

    async fn seeded_retriever(threshold: f32) -> DenseRetriever {
        let embedder = Arc::new(HashEmbedder::new(64, 32));
        let index = Arc::new(MemoryVectorIndex::new(64));
        let doc = Uuid::new_v4();
        let cancel = CancelToken::new();

        let texts = [
            "Paris is the capital of France.",
            "Berlin is the capital of Germany.",
            "A poem about mountains.",
        ];
        for (i, text) in texts.iter().enumerate() {
            let chunk = DocumentChunk::new(doc, tenant(), i, *text, 0, text.len());
            let vector = embedder
                .embed(&[text.to_string()], &cancel)
                .await
                .unwrap()
                .remove(0);
            index
                .upsert_vector(
                    chunk.id,
                    &vector,
                    VectorPayload {
                        tenant: tenant(),
                        document_id: doc,
                        text: text.to_string(),
                    },
                )
                .await
                .unwrap();
        }

        DenseRetriever::new(embedder, index, threshold, 100, Duration::from_secs(5))
    }

    #[test]
    fn test_normalize_cosine() {
        assert!((DenseRetriever::normalize_cosine(1.0) - 1.0).abs() < 1e-6);
        assert!((DenseRetriever::normalize_cosine(-1.0)).abs() < 1e-6);
        assert!((DenseRetriever::normalize_cosine(0.0) - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_exact_text_scores_highest() {
        let retriever = seeded_retriever(0.0).await;
        let retrieval = retriever
            .search(
                "Paris is the capital of France.",
                3,
                &tenant(),
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert!(!retrieval.results.is_empty());
        assert!(retrieval.results[0].text.contains("Paris"));
        assert!(retrieval.results[0].score > 0.9);
        assert_eq!(retrieval.results[0].origin, RetrievalOrigin::Dense);
    }

    #[tokio::test]
    async fn test_scores_in_unit_interval_and_sorted() {
        let retriever = seeded_retriever(0.0).await;
        let retrieval = retriever
            .search("capital city", 3, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        for result in &retrieval.results {
            assert!((0.0..=1.0).contains(&result.score));
        }
        for pair in retrieval.results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_threshold_filters() {
        let strict = seeded_retriever(0.99).await;
        let retrieval = strict
            .search("unrelated gibberish xyzzy", 3, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        assert!(retrieval.results.is_empty());
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let retriever = seeded_retriever(0.0).await;
        let other = TenantId::new("t2").unwrap();
        let retrieval = retriever
            .search("Paris", 3, &other, &CancelToken::new())
            .await
            .unwrap();
        assert!(retrieval.results.is_empty());
    }

    #[tokio::test]
    async fn test_validates_inputs() {
        let retriever = seeded_retriever(0.5).await;
        assert!(
            retriever
                .search("", 3, &tenant(), &CancelToken::new())
                .await
                .is_err()
        );
        assert!(
            retriever
                .search("q", 0, &tenant(), &CancelToken::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_strategy_tag() {
        let retriever = seeded_retriever(0.5).await;
        assert_eq!(retriever.strategy(), StrategyType::Dense);
    }
}
