//! BM25 retrieval strategy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{CancelToken, RetrievalOrigin, RetrievalResult, StrategyType, TenantId};
use crate::error::{Error, ExternalError, Result};
use crate::index::LexicalIndex;
use crate::retrieve::{Retrieval, Retriever, validate_search};

/// Retriever over the lexical index with per-result-set max
/// normalization: the top raw BM25 score maps to 1.0, ties preserved.
/// Magnitudes are therefore comparable within one query only.
pub struct Bm25Retriever {
    index: Arc<dyn LexicalIndex>,
    max_top_k: usize,
    timeout: Duration,
}

impl Bm25Retriever {
    /// Creates a BM25 retriever over the given lexical index.
    #[must_use]
    pub fn new(index: Arc<dyn LexicalIndex>, max_top_k: usize, timeout: Duration) -> Self {
        Self {
            index,
            max_top_k,
            timeout,
        }
    }
}

#[async_trait]
impl Retriever for Bm25Retriever {
    fn strategy(&self) -> StrategyType {
        StrategyType::Bm25
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

        let call = self.index.search(query, top_k, tenant, cancel);
        let hits = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = tokio::time::timeout(self.timeout, call) => outcome.map_err(|_| {
                Error::from(ExternalError::LexicalUnavailable {
                    reason: format!("lexical search timed out after {:?}", self.timeout),
                })
            })??,
        };

        let Some(max_score) = hits
            .iter()
            .map(|h| h.raw_score)
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        else {
            return Ok(Retrieval::default());
        };

        let results = hits
            .into_iter()
            .map(|hit| RetrievalResult {
                chunk_id: hit.chunk_id,
                document_id: hit.document_id,
                score: if max_score > 0.0 {
                    hit.raw_score / max_score
                } else {
                    0.0
                },
                text: hit.text,
                highlight: hit.highlight,
                origin: RetrievalOrigin::Lexical,
            })
            .collect();

        Ok(Retrieval {
            results,
            diagnostics: Vec::new(),
        })
    }
}
