//! Answer assembly types: the synthesized response, its citations, and
//! the validation and grounding reports attached to it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::retrieval::{QueryType, StrategyType};

/// Token accounting reported by the LLM provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated.
    pub completion_tokens: u32,
    /// Provider-reported total.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Sums two usage records, saturating on overflow.
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
            completion_tokens: self
                .completion_tokens
                .saturating_add(other.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
        }
    }
}

/// A resolved `[Source N]` citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    /// The N in `[Source N]` (1-based, as rendered in the context).
    pub marker: usize,
    /// Cited chunk.
    pub chunk_id: Uuid,
    /// Document the chunk belongs to.
    pub document_id: Uuid,
}

/// Structural validation outcome for a generated response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the response passed all hard checks.
    pub valid: bool,
    /// Human-readable findings; soft issues appear here even when valid.
    pub issues: Vec<String>,
}

/// Confidence classification derived from the overall grounding score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// Overall score above 0.85.
    High,
    /// Overall score in [0.70, 0.85].
    Medium,
    /// Overall score below 0.70.
    Low,
}

impl ConfidenceLevel {
    /// Classifies an overall confidence score.
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score > 0.85 {
            Self::High
        } else if score >= 0.70 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Hallucination detection outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallucinationReport {
    /// Fraction of answer sentences grounded in the retrieved passages.
    pub grounding_score: f32,
    /// Mean pairwise similarity across regenerations, when run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_consistency: Option<f32>,
    /// LLM-judge faithfulness in [0, 1], when run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faithfulness: Option<f32>,
    /// Weighted mean of the signals that ran.
    pub overall: f32,
    /// Classification of `overall`.
    pub confidence: ConfidenceLevel,
    /// Whether a human should review before the answer is surfaced.
    pub requires_human_review: bool,
    /// Sentences that failed the grounding check.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ungrounded_sentences: Vec<String>,
}

/// The synthesized answer returned by `ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Generated answer text.
    pub text: String,
    /// Citations resolved from `[Source N]` markers, in first-occurrence
    /// order.
    pub sources: Vec<SourceReference>,
    /// Structural validation report.
    pub validation: ValidationReport,
    /// Hallucination detection report, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hallucination: Option<HallucinationReport>,
    /// Classified query intent (absent when a strategy override skipped
    /// classification).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
    /// Strategy that actually ran.
    pub strategy_used: StrategyType,
    /// Prompt template name.
    pub template_name: String,
    /// Prompt template version.
    pub template_version: u32,
    /// Provider that generated the answer.
    pub provider: String,
    /// Token accounting across all LLM calls for this request.
    pub usage: TokenUsage,
    /// Non-fatal per-step diagnostics (e.g. `degraded=dense`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
    /// End-to-end latency.
    #[serde(with = "duration_millis")]
    pub latency: Duration,
}

mod duration_millis {
    //! Serializes `Duration` as integer milliseconds.

    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_add_saturates() {
        let a = TokenUsage {
            prompt_tokens: u32::MAX - 1,
            completion_tokens: 10,
            total_tokens: 20,
        };
        let b = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        let sum = a.add(b);
        assert_eq!(sum.prompt_tokens, u32::MAX);
        assert_eq!(sum.completion_tokens, 15);
        assert_eq!(sum.total_tokens, 35);
    }

    #[test]
    fn test_confidence_boundaries() {
        assert_eq!(ConfidenceLevel::from_score(0.86), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.85), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.70), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.69), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.0), ConfidenceLevel::Low);
    }

    #[test]
    fn test_answer_latency_serde() {
        let answer = Answer {
            text: "Paris [Source 1]".to_string(),
            sources: vec![],
            validation: ValidationReport {
                valid: true,
                issues: vec![],
            },
            hallucination: None,
            query_type: None,
            strategy_used: StrategyType::Bm25,
            template_name: "rag-default".to_string(),
            template_version: 1,
            provider: "scripted".to_string(),
            usage: TokenUsage::default(),
            diagnostics: vec![],
            latency: Duration::from_millis(42),
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["latency"], 42);
        let back: Answer = serde_json::from_value(json).unwrap();
        assert_eq!(back.latency, Duration::from_millis(42));
    }
}
