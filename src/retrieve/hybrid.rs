//! Hybrid retrieval strategy.
//!
//! Launches the BM25 and dense legs concurrently at an intermediate
//! depth, fuses the survivors, and truncates to `top_k`. A single failed
//! leg degrades the search instead of failing it: the surviving leg's
//! results are returned with a `degraded=<leg>` diagnostic.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{CancelToken, FusionMethod, HybridConfig, StrategyType, TenantId};
use crate::error::{Error, Result};
use crate::retrieve::{
    Bm25Retriever, DenseRetriever, Retrieval, Retriever, fusion, validate_search,
};

/// Fused lexical + dense retriever.
pub struct HybridRetriever {
    bm25: Arc<Bm25Retriever>,
    dense: Arc<DenseRetriever>,
    config: HybridConfig,
    max_top_k: usize,
}

impl HybridRetriever {
    /// Creates a hybrid retriever over the two legs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the fusion configuration is
    /// inconsistent.
    pub fn new(
        bm25: Arc<Bm25Retriever>,
        dense: Arc<DenseRetriever>,
        config: HybridConfig,
        max_top_k: usize,
    ) -> Result<Self> {
        config.validate(1)?;
        Ok(Self {
            bm25,
            dense,
            config,
            max_top_k,
        })
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    fn strategy(&self) -> StrategyType {
        StrategyType::Hybrid
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        tenant: &TenantId,
        cancel: &CancelToken,
    ) -> Result<Retrieval> {
        validate_search(query, top_k, self.max_top_k)?;
        self.config.validate(top_k)?;
        cancel.check()?;

        let leg_depth = self.config.leg_depth(top_k).min(self.max_top_k);
        let (bm25_outcome, dense_outcome) = tokio::join!(
            self.bm25.search(query, leg_depth, tenant, cancel),
            self.dense.search(query, leg_depth, tenant, cancel),
        );

        let mut diagnostics = Vec::new();
        let (bm25_results, dense_results) = match (bm25_outcome, dense_outcome) {
            (Ok(bm25), Ok(dense)) => (bm25.results, dense.results),
            (Ok(bm25), Err(e)) => {
                if matches!(e, Error::Cancelled) {
                    return Err(e);
                }
                tracing::warn!(error = %e, "dense leg failed, degrading to BM25 only");
                diagnostics.push("degraded=dense".to_string());
                let mut results = bm25.results;
                results.truncate(top_k);
                return Ok(Retrieval {
                    results,
                    diagnostics,
                });
            }
            (Err(e), Ok(dense)) => {
                if matches!(e, Error::Cancelled) {
                    return Err(e);
                }
                tracing::warn!(error = %e, "BM25 leg failed, degrading to dense only");
                diagnostics.push("degraded=bm25".to_string());
                let mut results = dense.results;
                results.truncate(top_k);
                return Ok(Retrieval {
                    results,
                    diagnostics,
                });
            }
            (Err(bm25_err), Err(_)) => return Err(bm25_err),
        };

        let results = match self.config.fusion {
            FusionMethod::Weighted => fusion::weighted_fusion(
                &bm25_results,
                &dense_results,
                self.config.alpha,
                self.config.beta,
                top_k,
            ),
            FusionMethod::Rrf => fusion::reciprocal_rank_fusion(
                &bm25_results,
                &dense_results,
                self.config.rrf_k,
                top_k,
            ),
        };

        Ok(Retrieval {
            results,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LexicalConfig;
    use crate::core::{DocumentChunk, RetrievalOrigin};
    use crate::embedding::{Embedder, HashEmbedder};
    use crate::index::{
        LexicalIndex, MemoryLexicalIndex, MemoryVectorIndex, VectorHit, VectorIndex, VectorPayload,
    };
    use std::time::Duration;
    use uuid::Uuid;

    fn tenant() -> TenantId {
        TenantId::new("t1").unwrap()
    }

    /// Vector index stub whose searches always fail.
    struct DownVectorIndex;

    #[async_trait]
    impl VectorIndex for DownVectorIndex {
        async fn ensure_collection(&self, _tenant: &TenantId) -> Result<()> {
            Ok(())
        }
        fn dimensions(&self) -> usize {
            64
        }
        async fn upsert_vector(
            &self,
            _id: Uuid,
            _vector: &[f32],
            _payload: VectorPayload,
        ) -> Result<()> {
            Ok(())
        }
        async fn bulk_upsert(&self, _points: Vec<(Uuid, Vec<f32>, VectorPayload)>) -> Result<()> {
            Ok(())
        }
        async fn search(
            &self,
            _query: &[f32],
            _top_k: usize,
            _tenant: &TenantId,
            _cancel: &CancelToken,
        ) -> Result<Vec<VectorHit>> {
            Err(crate::error::ExternalError::VectorUnavailable {
                reason: "simulated outage".to_string(),
            }
            .into())
        }
        async fn delete_vector(&self, _id: Uuid, _tenant: &TenantId) -> Result<()> {
            Ok(())
        }
        async fn delete_document_vectors(
            &self,
            _document_id: Uuid,
            _tenant: &TenantId,
        ) -> Result<()> {
            Ok(())
        }
    }

    async fn corpus_chunks() -> (MemoryLexicalIndex, Vec<DocumentChunk>) {
        let lexical = MemoryLexicalIndex::new(LexicalConfig::default());
        let doc = Uuid::new_v4();
        let chunks = vec![
            DocumentChunk::new(doc, tenant(), 0, "Paris is the capital of France.", 0, 31),
            DocumentChunk::new(doc, tenant(), 1, "Berlin is the capital of Germany.", 31, 64),
            DocumentChunk::new(doc, tenant(), 2, "The Alps are mountains in Europe.", 64, 97),
        ];
        lexical.bulk_upsert(&chunks).await.unwrap();
        (lexical, chunks)
    }

    async fn healthy_hybrid(fusion_method: FusionMethod) -> HybridRetriever {
        let (lexical, chunks) = corpus_chunks().await;
        let embedder = Arc::new(HashEmbedder::new(64, 32));
        let vector = Arc::new(MemoryVectorIndex::new(64));
        let cancel = CancelToken::new();
        for chunk in &chunks {
            let v = embedder
                .embed(&[chunk.text.clone()], &cancel)
                .await
                .unwrap()
                .remove(0);
            vector
                .upsert_vector(
                    chunk.id,
                    &v,
                    VectorPayload {
                        tenant: tenant(),
                        document_id: chunk.document_id,
                        text: chunk.text.clone(),
                    },
                )
                .await
                .unwrap();
        }

        let bm25 = Arc::new(Bm25Retriever::new(
            Arc::new(lexical),
            100,
            Duration::from_secs(5),
        ));
        let dense = Arc::new(DenseRetriever::new(
            embedder,
            vector,
            0.0,
            100,
            Duration::from_secs(5),
        ));
        HybridRetriever::new(
            bm25,
            dense,
            HybridConfig {
                fusion: fusion_method,
                ..HybridConfig::default()
            },
            100,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fused_search_returns_hybrid_origin() {
        let hybrid = healthy_hybrid(FusionMethod::Rrf).await;
        let retrieval = hybrid
            .search("capital of France", 3, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        assert!(!retrieval.results.is_empty());
        assert!(retrieval.diagnostics.is_empty());
        assert!(retrieval.results.len() <= 3);
        assert_eq!(retrieval.results[0].origin, RetrievalOrigin::Hybrid);
        assert!(retrieval.results[0].text.contains("France"));
    }

    #[tokio::test]
    async fn test_weighted_fusion_path() {
        let hybrid = healthy_hybrid(FusionMethod::Weighted).await;
        let retrieval = hybrid
            .search("capital of France", 3, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        assert!(!retrieval.results.is_empty());
        for pair in retrieval.results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_dense_outage_degrades_to_bm25() {
        let (lexical, _) = corpus_chunks().await;
        let embedder = Arc::new(HashEmbedder::new(64, 32));
        let bm25 = Arc::new(Bm25Retriever::new(
            Arc::new(lexical),
            100,
            Duration::from_secs(5),
        ));
        let dense = Arc::new(DenseRetriever::new(
            embedder,
            Arc::new(DownVectorIndex),
            0.0,
            100,
            Duration::from_secs(5),
        ));
        let hybrid =
            HybridRetriever::new(bm25, dense, HybridConfig::default(), 100).unwrap();

        let retrieval = hybrid
            .search("capital of France", 3, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        assert!(!retrieval.results.is_empty());
        assert_eq!(retrieval.diagnostics, vec!["degraded=dense".to_string()]);
        assert_eq!(retrieval.results[0].origin, RetrievalOrigin::Lexical);
    }

    #[tokio::test]
    async fn test_validates_inputs() {
        let hybrid = healthy_hybrid(FusionMethod::Rrf).await;
        assert!(
            hybrid
                .search("", 3, &tenant(), &CancelToken::new())
                .await
                .is_err()
        );
        assert!(
            hybrid
                .search("q", 0, &tenant(), &CancelToken::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_bad_config_rejected_at_construction() {
        let hybrid = healthy_hybrid(FusionMethod::Rrf).await;
        drop(hybrid);
        let (lexical, _) = corpus_chunks().await;
        let embedder = Arc::new(HashEmbedder::new(64, 32));
        let bm25 = Arc::new(Bm25Retriever::new(
            Arc::new(lexical),
            100,
            Duration::from_secs(5),
        ));
        let dense = Arc::new(DenseRetriever::new(
            embedder,
            Arc::new(MemoryVectorIndex::new(64)),
            0.0,
            100,
            Duration::from_secs(5),
        ));
        let bad = HybridConfig {
            alpha: 0.9,
            beta: 0.9,
            ..HybridConfig::default()
        };
        assert!(HybridRetriever::new(bm25, dense, bad, 100).is_err());
    }

    #[tokio::test]
    async fn test_strategy_tag() {
        let hybrid = healthy_hybrid(FusionMethod::Rrf).await;
        assert_eq!(hybrid.strategy(), StrategyType::Hybrid);
    }
}
