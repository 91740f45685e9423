//! Adaptive retrieval strategy.
//!
//! Dispatch table from classified query intent to concrete strategy:
//! explicit facts route to BM25, implicit facts to hybrid, and both
//! rationale intents to dense. A caller-supplied override bypasses the
//! classifier entirely.

use std::sync::Arc;

use async_trait::async_trait;

use crate::classify::QueryClassifier;
use crate::core::{CancelToken, QueryType, StrategyType, TenantId};
use crate::error::Result;
use crate::retrieve::{
    Bm25Retriever, DenseRetriever, HybridRetriever, Retrieval, Retriever, validate_search,
};

/// A retrieval outcome annotated with how it was routed.
#[derive(Debug)]
pub struct RoutedRetrieval {
    /// The retrieval itself.
    pub retrieval: Retrieval,
    /// Strategy that actually ran.
    pub strategy_used: StrategyType,
    /// Classified intent, when the classifier ran.
    pub query_type: Option<QueryType>,
}

/// Classifier-routed retriever.
pub struct AdaptiveRetriever {
    bm25: Arc<Bm25Retriever>,
    dense: Arc<DenseRetriever>,
    hybrid: Arc<HybridRetriever>,
    classifier: Arc<QueryClassifier>,
    max_top_k: usize,
}

impl AdaptiveRetriever {
    /// Creates the adaptive dispatcher over the three concrete strategies.
    #[must_use]
    pub const fn new(
        bm25: Arc<Bm25Retriever>,
        dense: Arc<DenseRetriever>,
        hybrid: Arc<HybridRetriever>,
        classifier: Arc<QueryClassifier>,
        max_top_k: usize,
    ) -> Self {
        Self {
            bm25,
            dense,
            hybrid,
            classifier,
            max_top_k,
        }
    }

    /// Routing table from intent to strategy.
    #[must_use]
    pub const fn route(query_type: QueryType) -> StrategyType {
        match query_type {
            QueryType::ExplicitFact => StrategyType::Bm25,
            QueryType::ImplicitFact => StrategyType::Hybrid,
            QueryType::InterpretableRationale | QueryType::HiddenRationale => StrategyType::Dense,
        }
    }

    fn concrete(&self, strategy: StrategyType) -> &dyn Retriever {
        match strategy {
            StrategyType::Bm25 => self.bm25.as_ref(),
            StrategyType::Dense => self.dense.as_ref(),
            // Adaptive never routes to itself; hybrid is the densest
            // fallback if it ever did.
            StrategyType::Hybrid | StrategyType::Adaptive => self.hybrid.as_ref(),
        }
    }

    /// Searches with an optional caller override.
    ///
    /// A non-empty override is parsed case-insensitively and dispatched
    /// without consulting the classifier; `auto` (or `adaptive`) runs the
    /// classifier as if no override were given.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on empty query, out-of-range `top_k`, or an
    /// unrecognized override tag.
    pub async fn search_with_override(
        &self,
        query: &str,
        top_k: usize,
        tenant: &TenantId,
        strategy_override: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<RoutedRetrieval> {
        validate_search(query, top_k, self.max_top_k)?;

        let override_strategy = match strategy_override {
            Some(tag) if !tag.trim().is_empty() => Some(StrategyType::parse(tag)?),
            _ => None,
        };

        if let Some(strategy) = override_strategy
            && strategy != StrategyType::Adaptive
        {
            let retrieval = self.concrete(strategy).search(query, top_k, tenant, cancel).await?;
            return Ok(RoutedRetrieval {
                retrieval,
                strategy_used: strategy,
                query_type: None,
            });
        }

        let query_type = self.classifier.classify(query, cancel).await?;
        let strategy = Self::route(query_type);
        tracing::debug!(
            query_type = query_type.label(),
            strategy = strategy.as_str(),
            "adaptive routing"
        );
        let retrieval = self.concrete(strategy).search(query, top_k, tenant, cancel).await?;
        Ok(RoutedRetrieval {
            retrieval,
            strategy_used: strategy,
            query_type: Some(query_type),
        })
    }
}

#[async_trait]
impl Retriever for AdaptiveRetriever {
    fn strategy(&self) -> StrategyType {
        StrategyType::Adaptive
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        tenant: &TenantId,
        cancel: &CancelToken,
    ) -> Result<Retrieval> {
        Ok(self
            .search_with_override(query, top_k, tenant, None, cancel)
            .await?
            .retrieval)
    }
}
