//! Hallucination detection.
//!
//! Three independent signals fold into one confidence score: sentence
//! grounding against the retrieved passages (always on), self-consistency
//! across high-temperature regenerations, and an LLM-judge faithfulness
//! score. Weights are 0.5/0.25/0.25 and renormalize over whichever
//! signals actually ran.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::HallucinationConfig;
use crate::core::{CancelToken, ConfidenceLevel, HallucinationReport, TokenUsage};
use crate::error::Result;
use crate::llm::{GenerationParams, LlmGateway};
use crate::template::RenderedPrompt;
use crate::textutil::{f1_overlap, tokenize_content};

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Source \d+\]").expect("static regex"));
static SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("static regex"));

const JUDGE_SYSTEM_PROMPT: &str = "You judge whether an answer is faithful \
to its source passages. Reply with a single number between 0 and 1, where \
1 means every claim is supported by the passages and 0 means none are. \
Reply with the number only.";

/// Grounding, consistency, and faithfulness scoring for generated
/// answers.
pub struct HallucinationDetector {
    config: HallucinationConfig,
    gateway: Arc<LlmGateway>,
}

impl HallucinationDetector {
    /// Creates a detector; the gateway is used only when the optional
    /// signals are enabled.
    #[must_use]
    pub const fn new(config: HallucinationConfig, gateway: Arc<LlmGateway>) -> Self {
        Self { config, gateway }
    }

    /// Splits an answer into sentences on unicode sentence boundaries.
    fn sentences(answer: &str) -> Vec<&str> {
        answer
            .unicode_sentences()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Grounding signal: fraction of sentences whose stopword-filtered
    /// token F1 against the passages reaches the threshold. Also returns
    /// the ungrounded sentences and whether any of them carries a
    /// citation marker.
    #[allow(clippy::cast_precision_loss)]
    fn grounding(&self, answer: &str, passages: &str) -> (f32, Vec<String>, bool) {
        let sentences = Self::sentences(answer);
        if sentences.is_empty() {
            return (0.0, Vec::new(), false);
        }
        let passage_tokens = tokenize_content(passages);

        let mut ungrounded = Vec::new();
        let mut cited_ungrounded = false;
        let mut grounded = 0usize;
        for sentence in &sentences {
            // Citation markers are bookkeeping, not content.
            let bare = MARKER.replace_all(sentence, "");
            let sentence_tokens = tokenize_content(&bare);
            let f1 = f1_overlap(&sentence_tokens, &passage_tokens);
            if f1 >= f64::from(self.config.grounding_threshold) {
                grounded += 1;
            } else {
                if MARKER.is_match(sentence) {
                    cited_ungrounded = true;
                }
                ungrounded.push((*sentence).to_string());
            }
        }

        let score = grounded as f32 / sentences.len() as f32;
        (score, ungrounded, cited_ungrounded)
    }

    /// Self-consistency signal: mean pairwise token F1 across N
    /// regenerations at elevated temperature.
    #[allow(clippy::cast_precision_loss)]
    async fn self_consistency(
        &self,
        prompt: &RenderedPrompt,
        provider: Option<&str>,
        usage: &mut TokenUsage,
        cancel: &CancelToken,
    ) -> Result<Option<f32>> {
        let params = GenerationParams {
            temperature: self.config.consistency_temperature.max(0.7),
            ..prompt.params
        };

        let mut samples = Vec::with_capacity(self.config.consistency_samples);
        for _ in 0..self.config.consistency_samples {
            let generation = self
                .gateway
                .generate(provider, &prompt.system, &prompt.user, &params, cancel)
                .await?;
            *usage = usage.add(generation.usage);
            samples.push(generation.text);
        }

        if samples.len() < 2 {
            return Ok(None);
        }

        let mut total = 0.0f64;
        let mut pairs = 0usize;
        for i in 0..samples.len() {
            for j in (i + 1)..samples.len() {
                total += crate::textutil::token_f1(&samples[i], &samples[j]);
                pairs += 1;
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Some((total / pairs as f64) as f32))
    }

    /// Faithfulness signal: LLM-judge score in [0, 1].
    async fn faithfulness(
        &self,
        question: &str,
        passages: &str,
        answer: &str,
        provider: Option<&str>,
        usage: &mut TokenUsage,
        cancel: &CancelToken,
    ) -> Result<Option<f32>> {
        let user = format!(
            "Question:\n{question}\n\nPassages:\n{passages}\n\nAnswer:\n{answer}\n\nFaithfulness score:"
        );
        let params = GenerationParams {
            temperature: 0.0,
            max_tokens: 8,
            top_p: 1.0,
        };
        let generation = self
            .gateway
            .generate(provider, JUDGE_SYSTEM_PROMPT, &user, &params, cancel)
            .await?;
        *usage = usage.add(generation.usage);

        Ok(SCORE
            .captures(&generation.text)
            .and_then(|c| c[1].parse::<f32>().ok())
            .map(|score| score.clamp(0.0, 1.0)))
    }

    /// Runs the configured signals and folds them into a report.
    ///
    /// `prompt` is the prompt the answer came from, used for
    /// self-consistency regeneration. Token usage from extra LLM calls
    /// accumulates into `usage`.
    ///
    /// # Errors
    ///
    /// Propagates gateway errors from the optional signals and
    /// cancellation.
    pub async fn detect(
        &self,
        question: &str,
        answer: &str,
        passages: &str,
        prompt: &RenderedPrompt,
        provider: Option<&str>,
        usage: &mut TokenUsage,
        cancel: &CancelToken,
    ) -> Result<HallucinationReport> {
        cancel.check()?;
        let (grounding_score, ungrounded_sentences, cited_ungrounded) =
            self.grounding(answer, passages);

        let self_consistency = if self.config.self_consistency {
            self.self_consistency(prompt, provider, usage, cancel)
                .await?
        } else {
            None
        };

        let faithfulness = if self.config.llm_judge {
            self.faithfulness(question, passages, answer, provider, usage, cancel)
                .await?
        } else {
            None
        };

        let mut weighted = f64::from(grounding_score) * 0.5;
        let mut weight_sum = 0.5;
        if let Some(score) = self_consistency {
            weighted += f64::from(score) * 0.25;
            weight_sum += 0.25;
        }
        if let Some(score) = faithfulness {
            weighted += f64::from(score) * 0.25;
            weight_sum += 0.25;
        }
        #[allow(clippy::cast_possible_truncation)]
        let overall = (weighted / weight_sum) as f32;

        let requires_human_review = overall < 0.70 || cited_ungrounded;

        Ok(HallucinationReport {
            grounding_score,
            self_consistency,
            faithfulness,
            overall,
            confidence: ConfidenceLevel::from_score(overall),
            requires_human_review,
            ungrounded_sentences,
        })
    }
}
