//! Top-level assembly.
//!
//! Wires the query and indexing pipelines from one [`RagConfig`] and the
//! external collaborators. This is the composition the (out-of-scope)
//! HTTP layer holds onto; tests assemble the same way over the in-memory
//! implementations.

use std::sync::Arc;
use std::time::Duration;

use crate::answer::HallucinationDetector;
use crate::classify::QueryClassifier;
use crate::config::RagConfig;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::{LexicalIndex, VectorIndex};
use crate::ingest::IndexingOrchestrator;
use crate::llm::{LlmGateway, LlmProvider};
use crate::pipeline::QueryPipeline;
use crate::retrieve::{AdaptiveRetriever, Bm25Retriever, DenseRetriever, HybridRetriever};
use crate::storage::{ObjectStore, Repository};
use crate::template::TemplateStore;

/// External collaborators the system is assembled over.
pub struct Collaborators {
    /// Relational store.
    pub repository: Arc<dyn Repository>,
    /// Raw document bytes store.
    pub object_store: Arc<dyn ObjectStore>,
    /// Lexical index gateway.
    pub lexical: Arc<dyn LexicalIndex>,
    /// Vector index gateway.
    pub vector: Arc<dyn VectorIndex>,
    /// Embedding client.
    pub embedder: Arc<dyn Embedder>,
    /// LLM providers; the first is the default, the rest are reachable
    /// by name override.
    pub providers: Vec<Arc<dyn LlmProvider>>,
}

/// The assembled query + indexing system.
pub struct RagSystem {
    pipeline: Arc<QueryPipeline>,
    indexer: Arc<IndexingOrchestrator>,
    templates: Arc<TemplateStore>,
}

impl RagSystem {
    /// Assembles the pipelines from configuration and collaborators.
    ///
    /// # Errors
    ///
    /// Configuration validation errors, template load errors.
    pub fn assemble(config: RagConfig, parts: Collaborators) -> Result<Self> {
        config.validate()?;
        let mut providers = parts.providers.into_iter();
        let default_provider = providers.next().ok_or_else(|| {
            crate::error::Error::invalid_input("at least one LLM provider is required")
        })?;
        let mut gateway = LlmGateway::new(default_provider, config.llm.timeout());
        for provider in providers {
            gateway = gateway.with_provider(provider);
        }
        let gateway = Arc::new(gateway);

        let max_top_k = config.retrieval.max_top_k;
        let bm25 = Arc::new(Bm25Retriever::new(
            Arc::clone(&parts.lexical),
            max_top_k,
            Duration::from_secs(config.lexical.timeout_secs),
        ));
        let dense = Arc::new(DenseRetriever::new(
            Arc::clone(&parts.embedder),
            Arc::clone(&parts.vector),
            config.dense.similarity_threshold,
            max_top_k,
            Duration::from_secs(config.dense.timeout_secs),
        ));
        let hybrid = Arc::new(HybridRetriever::new(
            Arc::clone(&bm25),
            Arc::clone(&dense),
            config.hybrid,
            max_top_k,
        )?);
        let classifier = Arc::new(QueryClassifier::new(Arc::clone(&gateway)));
        let retriever = Arc::new(AdaptiveRetriever::new(
            bm25,
            dense,
            hybrid,
            classifier,
            max_top_k,
        ));

        let templates = Arc::new(TemplateStore::load(&config.templates)?);
        let detector =
            HallucinationDetector::new(config.hallucination.clone(), Arc::clone(&gateway));

        let indexer = Arc::new(IndexingOrchestrator::new(
            Arc::clone(&parts.repository),
            parts.object_store,
            parts.lexical,
            parts.vector,
            parts.embedder,
            &config,
        )?);

        let pipeline = Arc::new(QueryPipeline::new(
            config,
            retriever,
            Arc::clone(&templates),
            gateway,
            detector,
            parts.repository,
        ));

        Ok(Self {
            pipeline,
            indexer,
            templates,
        })
    }

    /// The query pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &Arc<QueryPipeline> {
        &self.pipeline
    }

    /// The indexing orchestrator.
    #[must_use]
    pub const fn indexer(&self) -> &Arc<IndexingOrchestrator> {
        &self.indexer
    }

    /// The template store (for out-of-band hot reloads).
    #[must_use]
    pub const fn templates(&self) -> &Arc<TemplateStore> {
        &self.templates
    }
}
