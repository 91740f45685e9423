//! Pipeline configuration.
//!
//! One [`RagConfig`] tree covers every component; sections deserialize
//! from TOML with serde defaults so a partial file only overrides what it
//! names. Endpoint-shaped settings additionally honor environment
//! variables so credentials stay out of checked-in files.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::HybridConfig;
use crate::error::{Error, Result};

/// Default embedding vector dimension (all-MiniLM-class models).
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Environment variable overriding the embedding service URL.
pub const ENV_EMBEDDING_URL: &str = "RAGPIPE_EMBEDDING_URL";

/// Environment variable overriding the LLM endpoint URL.
pub const ENV_LLM_URL: &str = "RAGPIPE_LLM_URL";

/// Environment variable carrying the LLM API key.
pub const ENV_LLM_API_KEY: &str = "RAGPIPE_LLM_API_KEY";

/// Embedding client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding service base URL.
    pub url: String,
    /// Fixed vector dimension; mismatched responses are rejected.
    pub dimensions: usize,
    /// Maximum texts per request.
    pub max_batch_size: usize,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            max_batch_size: 32,
            timeout_secs: 5,
        }
    }
}

impl EmbeddingConfig {
    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Lexical (BM25) index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    /// Term-frequency saturation parameter.
    pub k1: f32,
    /// Length normalization parameter.
    pub b: f32,
    /// Maximum characters in a highlight fragment.
    pub fragment_size: usize,
    /// Per-call timeout.
    pub timeout_secs: u64,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            fragment_size: 160,
            timeout_secs: 5,
        }
    }
}

/// Dense retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseConfig {
    /// Minimum normalized similarity to keep a hit.
    pub similarity_threshold: f32,
    /// Per-call timeout.
    pub timeout_secs: u64,
}

impl Default for DenseConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.5,
            timeout_secs: 5,
        }
    }
}

/// Retrieval-wide limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default `top_k` when the caller omits one.
    pub default_top_k: usize,
    /// Upper bound on caller-supplied `top_k`.
    pub max_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            max_top_k: 100,
        }
    }
}

/// Sliding-window chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters.
    pub window: usize,
    /// Overlap between consecutive windows in characters.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window: 500,
            overlap: 50,
        }
    }
}

/// Indexing orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Maximum documents indexed concurrently (0 = number of cores).
    pub parallelism: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self { parallelism: 0 }
    }
}

impl IndexingConfig {
    /// Effective worker pool size.
    #[must_use]
    pub fn effective_parallelism(&self) -> usize {
        if self.parallelism == 0 {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            self.parallelism
        }
    }
}

/// Context assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Token budget for assembled passages.
    pub token_budget: usize,
    /// Minimum tokens worth including for a truncated passage.
    pub min_passage_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: 2800,
            min_passage_tokens: 50,
        }
    }
}

/// LLM gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat-completions endpoint URL.
    pub url: String,
    /// API key (usually injected via `RAGPIPE_LLM_API_KEY`).
    pub api_key: Option<String>,
    /// Model identifier sent to the provider.
    pub model: String,
    /// Default provider name.
    pub default_provider: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Upper bound on caller-supplied `max_tokens`.
    pub max_tokens_limit: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/v1/chat/completions".to_string(),
            api_key: None,
            model: "llama3.1".to_string(),
            default_provider: "default".to_string(),
            timeout_secs: 30,
            max_tokens_limit: 4000,
        }
    }
}

impl LlmConfig {
    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Prompt template store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Directory of template files; `None` uses compiled-in defaults only.
    pub directory: Option<String>,
}

/// Hallucination detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HallucinationConfig {
    /// Token-F1 threshold for a sentence to count as grounded.
    pub grounding_threshold: f32,
    /// Whether to run self-consistency regenerations.
    pub self_consistency: bool,
    /// Regeneration count for self-consistency.
    pub consistency_samples: usize,
    /// Sampling temperature for regenerations.
    pub consistency_temperature: f32,
    /// Whether to run the LLM-judge faithfulness signal.
    pub llm_judge: bool,
}

impl Default for HallucinationConfig {
    fn default() -> Self {
        Self {
            grounding_threshold: 0.3,
            self_consistency: false,
            consistency_samples: 3,
            consistency_temperature: 0.7,
            llm_judge: false,
        }
    }
}

/// End-to-end pipeline limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// End-to-end query timeout.
    pub timeout_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl QueryConfig {
    /// End-to-end timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Root configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Embedding client.
    pub embedding: EmbeddingConfig,
    /// Lexical index and BM25 parameters.
    pub lexical: LexicalConfig,
    /// Dense retrieval.
    pub dense: DenseConfig,
    /// Hybrid fusion.
    pub hybrid: HybridConfig,
    /// Retrieval-wide limits.
    pub retrieval: RetrievalConfig,
    /// Chunking window.
    pub chunking: ChunkingConfig,
    /// Indexing worker pool.
    pub indexing: IndexingConfig,
    /// Context assembly budget.
    pub context: ContextConfig,
    /// LLM gateway.
    pub llm: LlmConfig,
    /// Template store.
    pub templates: TemplateConfig,
    /// Hallucination detection.
    pub hallucination: HallucinationConfig,
    /// End-to-end query limits.
    pub query: QueryConfig,
}

impl RagConfig {
    /// Loads configuration from a TOML file and applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] on unreadable files, parse errors,
    /// or failed validation.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_input(format!("cannot read config {}: {e}", path.display()))
        })?;
        let mut config: Self = toml::from_str(&raw).map_err(|e| {
            Error::invalid_input(format!("cannot parse config {}: {e}", path.display()))
        })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies environment variable overrides for endpoints and secrets.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_EMBEDDING_URL) {
            self.embedding.url = url;
        }
        if let Ok(url) = std::env::var(ENV_LLM_URL) {
            self.llm.url = url;
        }
        if let Ok(key) = std::env::var(ENV_LLM_API_KEY) {
            self.llm.api_key = Some(key);
        }
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimensions == 0 {
            return Err(Error::invalid_input("embedding.dimensions must be > 0"));
        }
        if self.embedding.max_batch_size == 0 {
            return Err(Error::invalid_input("embedding.max_batch_size must be > 0"));
        }
        if self.chunking.window == 0 {
            return Err(Error::invalid_input("chunking.window must be > 0"));
        }
        if self.chunking.overlap >= self.chunking.window {
            return Err(Error::invalid_input(format!(
                "chunking.overlap {} must be less than chunking.window {}",
                self.chunking.overlap, self.chunking.window
            )));
        }
        if self.retrieval.default_top_k == 0 || self.retrieval.max_top_k == 0 {
            return Err(Error::invalid_input("retrieval top_k bounds must be > 0"));
        }
        if self.retrieval.default_top_k > self.retrieval.max_top_k {
            return Err(Error::invalid_input(
                "retrieval.default_top_k must not exceed retrieval.max_top_k",
            ));
        }
        if !(0.0..=1.0).contains(&self.dense.similarity_threshold) {
            return Err(Error::invalid_input(
                "dense.similarity_threshold must lie in [0, 1]",
            ));
        }
        self.hybrid.validate(self.retrieval.default_top_k)?;
        if self.hallucination.consistency_samples == 0 {
            return Err(Error::invalid_input(
                "hallucination.consistency_samples must be > 0",
            ));
        }
        Ok(())
    }
}
