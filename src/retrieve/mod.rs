//! Retrieval strategies.
//!
//! Four strategies share one contract: BM25 over the lexical index, dense
//! cosine search over the vector index, hybrid fusion of both, and an
//! adaptive dispatcher that routes by classified query intent. Results
//! come back in descending normalized score with deterministic
//! tie-breaking, never exceeding `top_k`, always scoped to the tenant.

mod adaptive;
mod bm25;
mod dense;
mod fusion;
mod hybrid;

pub use adaptive::{AdaptiveRetriever, RoutedRetrieval};
pub use bm25::Bm25Retriever;
pub use dense::DenseRetriever;
pub use fusion::{reciprocal_rank_fusion, weighted_fusion};
pub use hybrid::HybridRetriever;

use async_trait::async_trait;

use crate::core::{CancelToken, RetrievalResult, StrategyType, TenantId};
use crate::error::{Error, Result};

/// Outcome of one retrieval call.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// Hits in descending score order, at most `top_k` of them.
    pub results: Vec<RetrievalResult>,
    /// Non-fatal diagnostics (e.g. `degraded=dense` when one hybrid leg
    /// failed).
    pub diagnostics: Vec<String>,
}

/// Common retrieval contract.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Which strategy this retriever implements.
    fn strategy(&self) -> StrategyType;

    /// Searches the tenant's corpus.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty query or out-of-range `top_k`;
    /// `ExternalUnavailable` when the backing stores stay unreachable
    /// after the retry budget; `Cancelled` when the token fires.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        tenant: &TenantId,
        cancel: &CancelToken,
    ) -> Result<Retrieval>;
}

/// Validates the shared search preconditions.
pub(crate) fn validate_search(query: &str, top_k: usize, max_top_k: usize) -> Result<()> {
    if query.trim().is_empty() {
        return Err(Error::invalid_input("query must not be empty"));
    }
    if top_k == 0 || top_k > max_top_k {
        return Err(Error::invalid_input(format!(
            "top_k must lie in [1, {max_top_k}], got {top_k}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_search() {
        assert!(validate_search("q", 1, 100).is_ok());
        assert!(validate_search("q", 100, 100).is_ok());
        assert!(validate_search("", 10, 100).is_err());
        assert!(validate_search("  ", 10, 100).is_err());
        assert!(validate_search("q", 0, 100).is_err());
        assert!(validate_search("q", 101, 100).is_err());
    }
}
