//! Query intent classification.
//!
//! The primary path asks the LLM to label the query with one of four
//! intents; when the provider is unreachable or its output does not parse,
//! a deterministic keyword heuristic takes over. The classifier keeps no
//! state, so identical input always yields identical output for a given
//! provider behavior.

use std::sync::Arc;

use crate::core::{CancelToken, QueryType};
use crate::error::{Error, Result};
use crate::llm::{GenerationParams, LlmGateway};

const CLASSIFY_SYSTEM_PROMPT: &str = "You classify retrieval queries. \
Reply with exactly one label: explicit_fact (direct lookup), \
implicit_fact (synthesis across passages), interpretable_rationale \
(explain or compare), hidden_rationale (judgment or recommendation). \
Reply with the label only.";

/// Classifies queries into [`QueryType`] intents.
pub struct QueryClassifier {
    gateway: Arc<LlmGateway>,
}

impl QueryClassifier {
    /// Creates a classifier backed by the given gateway.
    #[must_use]
    pub const fn new(gateway: Arc<LlmGateway>) -> Self {
        Self { gateway }
    }

    /// Classifies a query, preferring the LLM and falling back to the
    /// keyword heuristic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] on an empty query and
    /// [`Error::Cancelled`] when the token fires; provider failures never
    /// surface (the heuristic absorbs them).
    pub async fn classify(&self, query: &str, cancel: &CancelToken) -> Result<QueryType> {
        if query.trim().is_empty() {
            return Err(Error::invalid_input("query must not be empty"));
        }
        cancel.check()?;

        let params = GenerationParams {
            temperature: 0.0,
            max_tokens: 8,
            top_p: 1.0,
        };
        match self
            .gateway
            .generate(None, CLASSIFY_SYSTEM_PROMPT, query, &params, cancel)
            .await
        {
            Ok(generation) => {
                if let Some(query_type) = Self::parse_label(&generation.text) {
                    return Ok(query_type);
                }
                tracing::debug!(
                    output = %generation.text,
                    "classifier output unparseable, using heuristic"
                );
                Ok(Self::heuristic(query))
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                tracing::debug!(error = %e, "classifier LLM unavailable, using heuristic");
                Ok(Self::heuristic(query))
            }
        }
    }

    /// Extracts the first intent label occurring in model output.
    fn parse_label(text: &str) -> Option<QueryType> {
        let lower = text.to_lowercase();
        QueryType::all()
            .into_iter()
            .filter_map(|q| lower.find(q.label()).map(|pos| (pos, q)))
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, q)| q)
    }

    /// Deterministic keyword heuristic.
    ///
    /// Interrogatives `what/when/where/who` read as explicit facts;
    /// `why/how/explain` read as implicit facts unless comparative terms
    /// push them to interpretable rationale; `should/recommend/best` read
    /// as hidden rationale; everything else defaults to implicit fact.
    #[must_use]
    pub fn heuristic(query: &str) -> QueryType {
        let lower = query.to_lowercase();
        let tokens: Vec<&str> = lower.split_whitespace().collect();
        let first = tokens.first().map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()));

        let comparative = ["compare", "vs", "versus", "difference"]
            .iter()
            .any(|t| tokens.iter().any(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric()) == *t));

        match first {
            Some("what" | "when" | "where" | "who") => QueryType::ExplicitFact,
            Some("why" | "how" | "explain") => {
                if comparative {
                    QueryType::InterpretableRationale
                } else {
                    QueryType::ImplicitFact
                }
            }
            _ if comparative => QueryType::InterpretableRationale,
            _ if ["should", "recommend", "best"]
                .iter()
                .any(|t| tokens.contains(t)) =>
            {
                QueryType::HiddenRationale
            }
            _ => QueryType::ImplicitFact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedProvider;
    use std::time::Duration;
    use test_case::test_case;

    fn classifier(provider: ScriptedProvider) -> QueryClassifier {
        QueryClassifier::new(Arc::new(LlmGateway::new(
            Arc::new(provider),
            Duration::from_secs(5),
        )))
    }

    #[test_case("What is the capital of France?", QueryType::ExplicitFact; "what interrogative")]
    #[test_case("When did the revolution start?", QueryType::ExplicitFact; "when interrogative")]
    #[test_case("Who wrote this report?", QueryType::ExplicitFact; "who interrogative")]
    #[test_case("Why is Paris the capital?", QueryType::ImplicitFact; "why without comparison")]
    #[test_case("How does indexing work?", QueryType::ImplicitFact; "how without comparison")]
    #[test_case("Explain BM25 vs dense retrieval", QueryType::InterpretableRationale; "explain with vs")]
    #[test_case("How do they compare on latency?", QueryType::InterpretableRationale; "how with compare")]
    #[test_case("What is the difference between them?", QueryType::ExplicitFact; "interrogative wins over comparative")]
    #[test_case("Should we migrate to hybrid search?", QueryType::HiddenRationale; "should")]
    #[test_case("Recommend the best retriever", QueryType::HiddenRationale; "recommend")]
    #[test_case("Summarize the quarterly report", QueryType::ImplicitFact; "default")]
    fn test_heuristic(query: &str, expected: QueryType) {
        assert_eq!(QueryClassifier::heuristic(query), expected);
    }

    #[test]
    fn test_parse_label_finds_first() {
        assert_eq!(
            QueryClassifier::parse_label("explicit_fact"),
            Some(QueryType::ExplicitFact)
        );
        assert_eq!(
            QueryClassifier::parse_label("  Hidden_Rationale\n"),
            Some(QueryType::HiddenRationale)
        );
        assert_eq!(
            QueryClassifier::parse_label("label: implicit_fact (confidence high)"),
            Some(QueryType::ImplicitFact)
        );
        assert_eq!(QueryClassifier::parse_label("no label here"), None);
    }

    #[tokio::test]
    async fn test_llm_label_wins_over_heuristic() {
        // Heuristic would say ExplicitFact; the scripted LLM says hybrid-route.
        let c = classifier(ScriptedProvider::new("s").with_response("implicit_fact"));
        let query_type = c
            .classify("What is the capital of France?", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(query_type, QueryType::ImplicitFact);
    }

    #[tokio::test]
    async fn test_unparseable_output_falls_back() {
        let c = classifier(ScriptedProvider::new("s").with_response("I cannot classify this"));
        let query_type = c
            .classify("What is the capital of France?", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(query_type, QueryType::ExplicitFact);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back() {
        let c = classifier(ScriptedProvider::new("s").failing_with_quota());
        let query_type = c
            .classify("Should we adopt this?", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(query_type, QueryType::HiddenRationale);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let c = classifier(ScriptedProvider::new("s"));
        assert!(c.classify("  ", &CancelToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled() {
        let c = classifier(ScriptedProvider::new("s"));
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            c.classify("query", &token).await,
            Err(Error::Cancelled)
        ));
    }
}
