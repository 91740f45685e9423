//! Retrieval domain types: results, query intents, strategy selection,
//! and hybrid fusion configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Which retrieval path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalOrigin {
    /// BM25 over the lexical index.
    Lexical,
    /// Cosine search over the vector index.
    Dense,
    /// Fused lexical + dense.
    Hybrid,
}

impl RetrievalOrigin {
    /// Stable tag used in answer metadata and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Dense => "dense",
            Self::Hybrid => "hybrid",
        }
    }
}

/// A single retrieval hit with a normalized score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Chunk that matched.
    pub chunk_id: Uuid,
    /// Document the chunk belongs to.
    pub document_id: Uuid,
    /// Normalized score in [0, 1].
    pub score: f32,
    /// Chunk text snippet.
    pub text: String,
    /// Highlighted fragment (lexical path only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    /// Which retrieval path produced this result.
    pub origin: RetrievalOrigin,
}

/// Query intent classes driving adaptive strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryType {
    /// Direct factual lookup ("what is the capital of France").
    ExplicitFact,
    /// Fact requiring light synthesis across passages.
    ImplicitFact,
    /// Reasoning whose rationale can be surfaced ("why", "compare").
    InterpretableRationale,
    /// Judgment calls with latent rationale ("should we", "best").
    HiddenRationale,
}

impl QueryType {
    /// Stable label used by the classifier prompt and its parser.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ExplicitFact => "explicit_fact",
            Self::ImplicitFact => "implicit_fact",
            Self::InterpretableRationale => "interpretable_rationale",
            Self::HiddenRationale => "hidden_rationale",
        }
    }

    /// All intent classes, in routing order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [
            Self::ExplicitFact,
            Self::ImplicitFact,
            Self::InterpretableRationale,
            Self::HiddenRationale,
        ]
    }
}

/// Retrieval strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    /// Lexical BM25 only.
    Bm25,
    /// Dense vector search only.
    Dense,
    /// Fused lexical + dense.
    Hybrid,
    /// Classifier-routed selection among the above.
    Adaptive,
}

impl StrategyType {
    /// Stable tag, matching the `ask` options enumeration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bm25 => "bm25",
            Self::Dense => "dense",
            Self::Hybrid => "hybrid",
            Self::Adaptive => "auto",
        }
    }

    /// Parses a caller-supplied strategy override, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for tags outside
    /// `{auto, adaptive, bm25, dense, hybrid}`.
    pub fn parse(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "bm25" => Ok(Self::Bm25),
            "dense" => Ok(Self::Dense),
            "hybrid" => Ok(Self::Hybrid),
            "auto" | "adaptive" => Ok(Self::Adaptive),
            other => Err(Error::invalid_input(format!(
                "unknown strategy override: {other}"
            ))),
        }
    }
}

/// Fusion method for the hybrid retriever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    /// Weighted linear combination of min-max normalized scores.
    Weighted,
    /// Reciprocal rank fusion.
    Rrf,
}

/// Hybrid retriever configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridConfig {
    /// BM25 weight for weighted fusion.
    pub alpha: f32,
    /// Dense weight for weighted fusion.
    pub beta: f32,
    /// Per-leg candidate depth before fusion; the effective depth is
    /// `max(2 * top_k, intermediate_k)`.
    pub intermediate_k: usize,
    /// Fusion method.
    pub fusion: FusionMethod,
    /// RRF constant k.
    pub rrf_k: u32,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta: 0.5,
            intermediate_k: 20,
            fusion: FusionMethod::Rrf,
            rrf_k: 60,
        }
    }
}

impl HybridConfig {
    /// Weight-sum tolerance.
    const WEIGHT_TOLERANCE: f32 = 1e-3;

    /// Validates the configuration against a final `top_k`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when weights leave [0, 1], the
    /// weights do not sum to 1 within tolerance, or `intermediate_k`
    /// undercuts `top_k`.
    pub fn validate(&self, top_k: usize) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) || !(0.0..=1.0).contains(&self.beta) {
            return Err(Error::invalid_input(format!(
                "fusion weights must lie in [0, 1]: alpha={}, beta={}",
                self.alpha, self.beta
            )));
        }
        if (self.alpha + self.beta - 1.0).abs() > Self::WEIGHT_TOLERANCE {
            return Err(Error::invalid_input(format!(
                "fusion weights must sum to 1: alpha={}, beta={}",
                self.alpha, self.beta
            )));
        }
        if self.intermediate_k < top_k {
            return Err(Error::invalid_input(format!(
                "intermediate_k {} must be >= top_k {top_k}",
                self.intermediate_k
            )));
        }
        Ok(())
    }

    /// Effective per-leg depth for a given final `top_k`.
    #[must_use]
    pub fn leg_depth(&self, top_k: usize) -> usize {
        (2 * top_k).max(self.intermediate_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!(StrategyType::parse("bm25").unwrap(), StrategyType::Bm25);
        assert_eq!(StrategyType::parse("BM25").unwrap(), StrategyType::Bm25);
        assert_eq!(StrategyType::parse(" Dense ").unwrap(), StrategyType::Dense);
        assert_eq!(StrategyType::parse("auto").unwrap(), StrategyType::Adaptive);
        assert_eq!(
            StrategyType::parse("ADAPTIVE").unwrap(),
            StrategyType::Adaptive
        );
        assert!(StrategyType::parse("keyword").is_err());
        assert!(StrategyType::parse("").is_err());
    }

    #[test]
    fn test_origin_tags() {
        assert_eq!(RetrievalOrigin::Lexical.as_str(), "lexical");
        assert_eq!(RetrievalOrigin::Dense.as_str(), "dense");
        assert_eq!(RetrievalOrigin::Hybrid.as_str(), "hybrid");
    }

    #[test]
    fn test_hybrid_config_default_is_valid() {
        let config = HybridConfig::default();
        assert!(config.validate(10).is_ok());
        assert_eq!(config.rrf_k, 60);
    }

    #[test]
    fn test_hybrid_config_weight_sum() {
        let config = HybridConfig {
            alpha: 0.7,
            beta: 0.2,
            ..HybridConfig::default()
        };
        assert!(config.validate(5).is_err());

        // Within tolerance passes.
        let config = HybridConfig {
            alpha: 0.7,
            beta: 0.3005,
            ..HybridConfig::default()
        };
        assert!(config.validate(5).is_ok());
    }

    #[test]
    fn test_hybrid_config_weight_range() {
        let config = HybridConfig {
            alpha: 1.4,
            beta: -0.4,
            ..HybridConfig::default()
        };
        assert!(config.validate(5).is_err());
    }

    #[test]
    fn test_hybrid_config_intermediate_k() {
        let config = HybridConfig {
            intermediate_k: 5,
            ..HybridConfig::default()
        };
        assert!(config.validate(10).is_err());
        assert!(config.validate(5).is_ok());
    }

    #[test]
    fn test_leg_depth() {
        let config = HybridConfig {
            intermediate_k: 20,
            ..HybridConfig::default()
        };
        assert_eq!(config.leg_depth(3), 20);
        assert_eq!(config.leg_depth(15), 30);
    }

    #[test]
    fn test_query_type_labels_unique() {
        let labels: std::collections::HashSet<_> =
            QueryType::all().iter().map(|q| q.label()).collect();
        assert_eq!(labels.len(), 4);
    }

    #[test]
    fn test_strategy_serde_lowercase() {
        let json = serde_json::to_string(&StrategyType::Bm25).unwrap();
        assert_eq!(json, "\"bm25\"");
        let json = serde_json::to_string(&FusionMethod::Rrf).unwrap();
        assert_eq!(json, "\"rrf\"");
    }
}
