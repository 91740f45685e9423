//! Query orchestrator.
//!
//! Single entry point of the answer pipeline: classify → retrieve →
//! assemble → prompt → generate → validate/link/detect → answer. Fatal
//! step failures surface with a step tag; non-fatal findings (hybrid
//! degradation, unknown citation markers) accumulate as diagnostics on
//! the answer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::answer::{HallucinationDetector, ResponseValidator, link_sources};
use crate::config::RagConfig;
use crate::context::ContextAssembler;
use crate::core::{Answer, CancelToken, RetrievalResult, TenantId, TokenUsage};
use crate::error::{Error, PipelineStep, Result};
use crate::llm::{LlmGateway, TokenStream};
use crate::retrieve::AdaptiveRetriever;
use crate::storage::{AuditEntry, Repository};
use crate::template::TemplateStore;

/// Caller-tunable options for one `ask` call.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Result depth, in `[1, max_top_k]`; defaults to the configured
    /// value.
    pub top_k: Option<usize>,
    /// Strategy override tag (`auto`, `bm25`, `dense`, `hybrid`).
    pub strategy: Option<String>,
    /// Provider override.
    pub provider: Option<String>,
    /// Template name; defaults to `rag-default`.
    pub template_name: Option<String>,
    /// Template version pin.
    pub template_version: Option<u32>,
    /// Sampling temperature override in [0, 1].
    pub temperature: Option<f32>,
    /// Completion budget override in [1, 4000].
    pub max_tokens: Option<u32>,
    /// Whether to run hallucination detection.
    pub enable_hallucination_detection: bool,
}

/// The query pipeline.
pub struct QueryPipeline {
    config: RagConfig,
    retriever: Arc<AdaptiveRetriever>,
    assembler: ContextAssembler,
    templates: Arc<TemplateStore>,
    gateway: Arc<LlmGateway>,
    validator: ResponseValidator,
    detector: HallucinationDetector,
    repository: Arc<dyn Repository>,
}

impl QueryPipeline {
    /// Wires the pipeline from its collaborators.
    #[must_use]
    pub fn new(
        config: RagConfig,
        retriever: Arc<AdaptiveRetriever>,
        templates: Arc<TemplateStore>,
        gateway: Arc<LlmGateway>,
        detector: HallucinationDetector,
        repository: Arc<dyn Repository>,
    ) -> Self {
        let assembler = ContextAssembler::new(&config.context);
        Self {
            config,
            retriever,
            assembler,
            templates,
            gateway,
            validator: ResponseValidator::default(),
            detector,
            repository,
        }
    }

    fn validate_options(&self, query: &str, options: &AskOptions) -> Result<usize> {
        if query.trim().is_empty() {
            return Err(Error::invalid_input("query must not be empty"));
        }
        let top_k = options.top_k.unwrap_or(self.config.retrieval.default_top_k);
        if top_k == 0 || top_k > self.config.retrieval.max_top_k {
            return Err(Error::invalid_input(format!(
                "top_k must lie in [1, {}], got {top_k}",
                self.config.retrieval.max_top_k
            )));
        }
        if let Some(temperature) = options.temperature
            && !(0.0..=1.0).contains(&temperature)
        {
            return Err(Error::invalid_input(format!(
                "temperature must lie in [0, 1], got {temperature}"
            )));
        }
        if let Some(max_tokens) = options.max_tokens
            && !(1..=self.config.llm.max_tokens_limit).contains(&max_tokens)
        {
            return Err(Error::invalid_input(format!(
                "max_tokens must lie in [1, {}], got {max_tokens}",
                self.config.llm.max_tokens_limit
            )));
        }
        Ok(top_k)
    }

    /// Answers a question against the tenant's corpus.
    ///
    /// # Errors
    ///
    /// Step-tagged pipeline errors per the error taxonomy; the
    /// end-to-end timeout surfaces as `ExternalUnavailable`.
    pub async fn ask(
        &self,
        tenant: &TenantId,
        query: &str,
        options: &AskOptions,
        cancel: &CancelToken,
    ) -> Result<Answer> {
        Ok(self.ask_traced(tenant, query, options, cancel).await?.0)
    }

    /// Like [`ask`](Self::ask), but also returns the raw retrieval hits.
    /// The evaluation engine uses these for precision/recall scoring.
    ///
    /// # Errors
    ///
    /// Same as [`ask`](Self::ask).
    pub async fn ask_traced(
        &self,
        tenant: &TenantId,
        query: &str,
        options: &AskOptions,
        cancel: &CancelToken,
    ) -> Result<(Answer, Vec<RetrievalResult>)> {
        let deadline = self.config.query.timeout();
        let work = self.ask_inner(tenant, query, options, cancel);
        tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            outcome = tokio::time::timeout(deadline, work) => outcome.map_err(|_| {
                Error::from(crate::error::ExternalError::Timeout {
                    operation: "query",
                    millis: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                })
            })?,
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn ask_inner(
        &self,
        tenant: &TenantId,
        query: &str,
        options: &AskOptions,
        cancel: &CancelToken,
    ) -> Result<(Answer, Vec<RetrievalResult>)> {
        let started = Instant::now();
        let top_k = self.validate_options(query, options)?;
        let mut usage = TokenUsage::default();
        let mut diagnostics: Vec<String> = Vec::new();

        // Classify and retrieve (the adaptive retriever owns routing).
        let routed = self
            .retriever
            .search_with_override(query, top_k, tenant, options.strategy.as_deref(), cancel)
            .await
            .map_err(|e| e.at_step(PipelineStep::Retrieve))?;
        diagnostics.extend(routed.retrieval.diagnostics.clone());
        tracing::debug!(
            results = routed.retrieval.results.len(),
            strategy = routed.strategy_used.as_str(),
            "retrieval complete"
        );

        // Assemble context.
        cancel.check().map_err(|e| e.at_step(PipelineStep::Assemble))?;
        let context = self.assembler.assemble(&routed.retrieval.results);
        if context.truncated > 0 {
            diagnostics.push(format!("context truncated {} passages", context.truncated));
        }
        let had_passages = !context.is_empty();
        if !had_passages {
            diagnostics.push("no passages matched".to_string());
        }

        // Render the prompt.
        let template_name = options.template_name.as_deref().unwrap_or("rag-default");
        let vars: HashMap<String, String> = [
            ("context".to_string(), context.text.clone()),
            ("question".to_string(), query.to_string()),
        ]
        .into();
        let mut prompt = self
            .templates
            .render(template_name, options.template_version, &vars)
            .map_err(|e| e.at_step(PipelineStep::Prompt))?;
        if let Some(temperature) = options.temperature {
            prompt.params.temperature = temperature;
        }
        if let Some(max_tokens) = options.max_tokens {
            prompt.params.max_tokens = max_tokens;
        }

        // Generate.
        let generation = self
            .gateway
            .generate(
                options.provider.as_deref(),
                &prompt.system,
                &prompt.user,
                &prompt.params,
                cancel,
            )
            .await
            .map_err(|e| e.at_step(PipelineStep::Generate))?;
        usage = usage.add(generation.usage);

        // Validate, link, detect.
        cancel.check().map_err(|e| e.at_step(PipelineStep::Validate))?;
        let mut validation =
            self.validator
                .validate(&generation.text, had_passages, prompt.no_citation);
        let linked = link_sources(&generation.text, &context.source_map);
        for marker in &linked.unknown_markers {
            validation
                .issues
                .push(format!("citation [Source {marker}] has no matching passage"));
        }

        let hallucination = if options.enable_hallucination_detection {
            let passages_text: String = routed
                .retrieval
                .results
                .iter()
                .map(|r| r.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            Some(
                self.detector
                    .detect(
                        query,
                        &generation.text,
                        &passages_text,
                        &prompt,
                        options.provider.as_deref(),
                        &mut usage,
                        cancel,
                    )
                    .await
                    .map_err(|e| e.at_step(PipelineStep::Validate))?,
            )
        } else {
            None
        };

        let provider = self
            .gateway
            .provider_name(options.provider.as_deref())
            .unwrap_or_else(|_| "unknown".to_string());

        let answer = Answer {
            text: generation.text,
            sources: linked.references,
            validation,
            hallucination,
            query_type: routed.query_type,
            strategy_used: routed.strategy_used,
            template_name: prompt.template_name,
            template_version: prompt.template_version,
            provider,
            usage,
            diagnostics,
            latency: started.elapsed(),
        };

        if let Err(e) = self.repository.record_audit(&AuditEntry::new(
            tenant.clone(),
            "ask",
            None,
            format!(
                "strategy={} sources={} valid={}",
                answer.strategy_used.as_str(),
                answer.sources.len(),
                answer.validation.valid
            ),
        )) {
            tracing::warn!(error = %e, "audit write failed");
        }

        Ok((answer, routed.retrieval.results))
    }

    /// Streaming variant: runs classify → retrieve → assemble → prompt,
    /// then streams generation tokens in provider order. Validation,
    /// linking, and hallucination detection do not run on streams.
    ///
    /// # Errors
    ///
    /// Step-tagged errors from the non-streaming stages; stream setup
    /// failures from the gateway.
    pub async fn ask_stream(
        &self,
        tenant: &TenantId,
        query: &str,
        options: &AskOptions,
        cancel: &CancelToken,
    ) -> Result<TokenStream> {
        let top_k = self.validate_options(query, options)?;

        let routed = self
            .retriever
            .search_with_override(query, top_k, tenant, options.strategy.as_deref(), cancel)
            .await
            .map_err(|e| e.at_step(PipelineStep::Retrieve))?;
        let context = self.assembler.assemble(&routed.retrieval.results);

        let template_name = options.template_name.as_deref().unwrap_or("rag-default");
        let vars: HashMap<String, String> = [
            ("context".to_string(), context.text),
            ("question".to_string(), query.to_string()),
        ]
        .into();
        let mut prompt = self
            .templates
            .render(template_name, options.template_version, &vars)
            .map_err(|e| e.at_step(PipelineStep::Prompt))?;
        if let Some(temperature) = options.temperature {
            prompt.params.temperature = temperature;
        }
        if let Some(max_tokens) = options.max_tokens {
            prompt.params.max_tokens = max_tokens;
        }

        self.gateway
            .generate_stream(
                options.provider.as_deref(),
                &prompt.system,
                &prompt.user,
                &prompt.params,
                cancel,
            )
            .await
            .map_err(|e| e.at_step(PipelineStep::Generate))
    }

    /// Read access to the configured defaults (exposed for callers
    /// building request surfaces).
    #[must_use]
    pub const fn config(&self) -> &RagConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::QueryClassifier;
    use crate::config::{HallucinationConfig, LexicalConfig, TemplateConfig};
    use crate::core::{DocumentChunk, StrategyType};
    use crate::embedding::{Embedder, HashEmbedder};
    use crate::index::{
        LexicalIndex, MemoryLexicalIndex, MemoryVectorIndex, VectorIndex, VectorPayload,
    };
    use crate::llm::ScriptedProvider;
    use crate::retrieve::{Bm25Retriever, DenseRetriever, HybridRetriever};
    use crate::storage::MemoryRepository;
    use std::time::Duration;
    use uuid::Uuid;

    fn tenant() -> TenantId {
        TenantId::new("t1").unwrap()
    }

    async fn pipeline_with(provider: ScriptedProvider) -> (QueryPipeline, Arc<MemoryRepository>) {
        let config = RagConfig::default();
        let lexical = Arc::new(MemoryLexicalIndex::new(LexicalConfig::default()));
        let vector = Arc::new(MemoryVectorIndex::new(64));
        let embedder: Arc<HashEmbedder> = Arc::new(HashEmbedder::new(64, 32));
        let cancel = CancelToken::new();

        let doc = Uuid::new_v4();
        let texts = [
            "Paris is the capital of France.",
            "Berlin is the capital of Germany.",
        ];
        for (i, text) in texts.iter().enumerate() {
            let chunk = DocumentChunk::new(doc, tenant(), i, *text, 0, text.len());
            lexical.upsert_chunk(&chunk).await.unwrap();
            let v = embedder
                .embed(&[text.to_string()], &cancel)
                .await
                .unwrap()
                .remove(0);
            vector
                .upsert_vector(
                    chunk.id,
                    &v,
                    VectorPayload {
                        tenant: tenant(),
                        document_id: doc,
                        text: (*text).to_string(),
                    },
                )
                .await
                .unwrap();
        }

        let gateway = Arc::new(LlmGateway::new(
            Arc::new(provider),
            Duration::from_secs(5),
        ));
        let bm25 = Arc::new(Bm25Retriever::new(
            lexical,
            config.retrieval.max_top_k,
            Duration::from_secs(5),
        ));
        let dense = Arc::new(DenseRetriever::new(
            Arc::clone(&embedder) as Arc<dyn Embedder>,
            vector,
            0.0,
            config.retrieval.max_top_k,
            Duration::from_secs(5),
        ));
        let hybrid = Arc::new(
            HybridRetriever::new(
                Arc::clone(&bm25),
                Arc::clone(&dense),
                config.hybrid,
                config.retrieval.max_top_k,
            )
            .unwrap(),
        );
        let classifier = Arc::new(QueryClassifier::new(Arc::clone(&gateway)));
        let retriever = Arc::new(AdaptiveRetriever::new(
            bm25,
            dense,
            hybrid,
            classifier,
            config.retrieval.max_top_k,
        ));
        let templates = Arc::new(TemplateStore::load(&TemplateConfig::default()).unwrap());
        let detector =
            HallucinationDetector::new(HallucinationConfig::default(), Arc::clone(&gateway));
        let repository = Arc::new(MemoryRepository::new());

        (
            QueryPipeline::new(
                config,
                retriever,
                templates,
                gateway,
                detector,
                Arc::clone(&repository) as Arc<dyn Repository>,
            ),
            repository,
        )
    }

    #[tokio::test]
    async fn test_ask_bm25_end_to_end() {
        let (pipeline, _repo) = pipeline_with(
            ScriptedProvider::new("scripted")
                .with_response("Paris is the capital of France [Source 1]."),
        ).await;
        let options = AskOptions {
            strategy: Some("bm25".to_string()),
            top_k: Some(3),
            ..AskOptions::default()
        };
        let answer = pipeline
            .ask(&tenant(), "capital of France", &options, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(answer.strategy_used, StrategyType::Bm25);
        assert!(answer.validation.valid);
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].marker, 1);
        assert_eq!(answer.template_name, "rag-default");
        assert_eq!(answer.provider, "scripted");
        assert!(answer.usage.total_tokens > 0);
    }

    #[tokio::test]
    async fn test_ask_empty_query_rejected() {
        let (pipeline, _repo) = pipeline_with(ScriptedProvider::new("s")).await;
        let result = pipeline
            .ask(&tenant(), " ", &AskOptions::default(), &CancelToken::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ask_option_bounds() {
        let (pipeline, _repo) = pipeline_with(ScriptedProvider::new("s")).await;
        let bad_top_k = AskOptions {
            top_k: Some(101),
            ..AskOptions::default()
        };
        assert!(
            pipeline
                .ask(&tenant(), "q", &bad_top_k, &CancelToken::new())
                .await
                .is_err()
        );

        let bad_temperature = AskOptions {
            temperature: Some(1.5),
            ..AskOptions::default()
        };
        assert!(
            pipeline
                .ask(&tenant(), "q", &bad_temperature, &CancelToken::new())
                .await
                .is_err()
        );

        let bad_max_tokens = AskOptions {
            max_tokens: Some(9000),
            ..AskOptions::default()
        };
        assert!(
            pipeline
                .ask(&tenant(), "q", &bad_max_tokens, &CancelToken::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_unknown_marker_is_soft_issue() {
        let (pipeline, _repo) = pipeline_with(
            ScriptedProvider::new("s").with_response("Paris [Source 1] and also [Source 9]."),
        ).await;
        let options = AskOptions {
            strategy: Some("bm25".to_string()),
            ..AskOptions::default()
        };
        let answer = pipeline
            .ask(&tenant(), "capital of France", &options, &CancelToken::new())
            .await
            .unwrap();
        // The call succeeded; the unknown marker shows up as an issue.
        assert_eq!(answer.sources.len(), 1);
        assert!(
            answer
                .validation
                .issues
                .iter()
                .any(|i| i.contains("[Source 9]"))
        );
    }

    #[tokio::test]
    async fn test_hallucination_detection_attached() {
        let (pipeline, _repo) = pipeline_with(
            ScriptedProvider::new("s")
                .with_response("Paris is the capital of France [Source 1]."),
        ).await;
        let options = AskOptions {
            strategy: Some("bm25".to_string()),
            enable_hallucination_detection: true,
            ..AskOptions::default()
        };
        let answer = pipeline
            .ask(&tenant(), "capital of France", &options, &CancelToken::new())
            .await
            .unwrap();
        let report = answer.hallucination.unwrap();
        assert!(report.grounding_score > 0.9);
    }

    #[tokio::test]
    async fn test_adaptive_records_query_type() {
        let provider = ScriptedProvider::new("s")
            .with_response("implicit_fact")
            .with_response("Paris grew into the capital [Source 1].");
        let (pipeline, _repo) = pipeline_with(provider).await;
        let answer = pipeline
            .ask(
                &tenant(),
                "Why is Paris the capital?",
                &AskOptions::default(),
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(answer.strategy_used, StrategyType::Hybrid);
        assert_eq!(
            answer.query_type,
            Some(crate::core::QueryType::ImplicitFact)
        );
    }

    #[tokio::test]
    async fn test_generate_failure_carries_step_tag() {
        let (pipeline, _repo) = pipeline_with(ScriptedProvider::new("s").failing_with_quota()).await;
        let options = AskOptions {
            strategy: Some("bm25".to_string()),
            ..AskOptions::default()
        };
        let err = pipeline
            .ask(&tenant(), "capital of France", &options, &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.step(), Some(PipelineStep::Generate));
        assert_eq!(err.kind(), crate::error::ErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn test_unknown_template_carries_prompt_tag() {
        let (pipeline, _repo) = pipeline_with(ScriptedProvider::new("s")).await;
        let options = AskOptions {
            strategy: Some("bm25".to_string()),
            template_name: Some("missing".to_string()),
            ..AskOptions::default()
        };
        let err = pipeline
            .ask(&tenant(), "capital of France", &options, &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.step(), Some(PipelineStep::Prompt));
    }

    #[tokio::test]
    async fn test_cancelled_ask() {
        let (pipeline, _repo) = pipeline_with(ScriptedProvider::new("s")).await;
        let token = CancelToken::new();
        token.cancel();
        let result = pipeline
            .ask(&tenant(), "capital of France", &AskOptions::default(), &token)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_ask_stream_yields_tokens_in_order() {
        let (pipeline, _repo) = pipeline_with(
            ScriptedProvider::new("s").with_response("Paris is the capital [Source 1]."),
        ).await;
        let options = AskOptions {
            strategy: Some("bm25".to_string()),
            ..AskOptions::default()
        };
        let mut stream = pipeline
            .ask_stream(&tenant(), "capital of France", &options, &CancelToken::new())
            .await
            .unwrap();
        let mut text = String::new();
        while let Some(chunk) = stream.recv().await {
            text.push_str(&chunk.unwrap());
        }
        assert_eq!(text, "Paris is the capital [Source 1].");
    }

    #[tokio::test]
    async fn test_audit_recorded_on_ask() {
        let (pipeline, repo) = pipeline_with(
            ScriptedProvider::new("s").with_response("Paris [Source 1]."),
        ).await;
        let options = AskOptions {
            strategy: Some("bm25".to_string()),
            ..AskOptions::default()
        };
        pipeline
            .ask(&tenant(), "capital of France", &options, &CancelToken::new())
            .await
            .unwrap();
        let entries = repo.audit_log(&tenant(), 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "ask");
    }
}
