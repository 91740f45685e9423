//! Context assembly under a token budget.
//!
//! Ranked passages are packed greedily into a `[Source i]`-tagged context
//! string using an approximate token counter. The assembler also returns
//! the marker-to-chunk map the source linker resolves citations against.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::config::ContextConfig;
use crate::core::RetrievalResult;

/// A `[Source i]` slot in the assembled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSlot {
    /// Cited chunk.
    pub chunk_id: Uuid,
    /// Document the chunk belongs to.
    pub document_id: Uuid,
}

/// Marker number (1-based) to chunk mapping.
pub type SourceMap = BTreeMap<usize, SourceSlot>;

/// Result of context assembly.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// The packed context string.
    pub text: String,
    /// Marker to chunk mapping for the source linker.
    pub source_map: SourceMap,
    /// Approximate tokens consumed.
    pub tokens_used: usize,
    /// Passages that were truncated to fit.
    pub truncated: usize,
}

impl AssembledContext {
    /// Whether no passage fit the budget.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source_map.is_empty()
    }
}

/// Greedy rank-order packer.
pub struct ContextAssembler {
    token_budget: usize,
    min_passage_tokens: usize,
}

impl ContextAssembler {
    /// Creates an assembler from configuration.
    #[must_use]
    pub const fn new(config: &ContextConfig) -> Self {
        Self {
            token_budget: config.token_budget,
            min_passage_tokens: config.min_passage_tokens,
        }
    }

    /// Approximate token count: the larger of `chars / 4` (lower bound
    /// for dense prose) and the whitespace word count.
    #[must_use]
    pub fn estimate_tokens(text: &str) -> usize {
        (text.chars().count() / 4).max(text.split_whitespace().count())
    }

    /// Packs passages in rank order under the budget.
    ///
    /// Each included passage is rendered as `[Source i] <text>` with `i`
    /// starting at 1. A passage that does not fit whole is truncated down
    /// to the remaining budget if that still leaves at least the
    /// per-passage minimum; otherwise packing stops.
    #[must_use]
    pub fn assemble(&self, passages: &[RetrievalResult]) -> AssembledContext {
        let mut blocks: Vec<String> = Vec::new();
        let mut source_map = SourceMap::new();
        let mut tokens_used = 0usize;
        let mut truncated = 0usize;
        let mut marker = 1usize;

        for passage in passages {
            let header = format!("[Source {marker}] ");
            let header_tokens = Self::estimate_tokens(&header);
            let passage_tokens = Self::estimate_tokens(&passage.text);
            let remaining = self.token_budget.saturating_sub(tokens_used);

            let body = if header_tokens + passage_tokens <= remaining {
                passage.text.clone()
            } else {
                let available = remaining.saturating_sub(header_tokens);
                if available < self.min_passage_tokens {
                    break;
                }
                truncated += 1;
                truncate_to_tokens(&passage.text, available)
            };

            let block_tokens = header_tokens + Self::estimate_tokens(&body);
            tokens_used += block_tokens;
            blocks.push(format!("{header}{body}"));
            source_map.insert(
                marker,
                SourceSlot {
                    chunk_id: passage.chunk_id,
                    document_id: passage.document_id,
                },
            );
            marker += 1;

            if tokens_used >= self.token_budget {
                break;
            }
        }

        AssembledContext {
            text: blocks.join("\n\n"),
            source_map,
            tokens_used,
            truncated,
        }
    }
}

/// Truncates text to approximately `max_tokens`, cutting on a word
/// boundary.
fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let mut out = String::new();
    let mut tokens = 0usize;
    for word in text.split_whitespace() {
        let candidate_tokens = tokens + 1.max(word.chars().count() / 4);
        if candidate_tokens > max_tokens {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        tokens = candidate_tokens;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RetrievalOrigin;

    fn passage(text: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            score,
            text: text.to_string(),
            highlight: None,
            origin: RetrievalOrigin::Lexical,
        }
    }

    fn assembler(budget: usize, min: usize) -> ContextAssembler {
        ContextAssembler::new(&ContextConfig {
            token_budget: budget,
            min_passage_tokens: min,
        })
    }

    #[test]
    fn test_estimate_tokens_takes_larger_bound() {
        // Few long words: chars/4 dominates.
        assert_eq!(ContextAssembler::estimate_tokens("abcdefghijklmnop"), 4);
        // Many short words: word count dominates.
        assert_eq!(ContextAssembler::estimate_tokens("a b c d e f"), 6);
        assert_eq!(ContextAssembler::estimate_tokens(""), 0);
    }

    #[test]
    fn test_assemble_formats_markers_from_one() {
        let assembler = assembler(1000, 5);
        let context = assembler.assemble(&[
            passage("First passage text.", 1.0),
            passage("Second passage text.", 0.5),
        ]);
        assert!(context.text.starts_with("[Source 1] First passage text."));
        assert!(context.text.contains("[Source 2] Second passage text."));
        assert_eq!(context.source_map.len(), 2);
        assert!(context.source_map.contains_key(&1));
        assert!(context.source_map.contains_key(&2));
        assert_eq!(context.truncated, 0);
    }

    #[test]
    fn test_assemble_respects_budget() {
        let assembler = assembler(30, 5);
        let long = "word ".repeat(40);
        let context = assembler.assemble(&[
            passage(&long, 1.0),
            passage(&long, 0.9),
            passage(&long, 0.8),
        ]);
        assert!(context.tokens_used <= 30 + 5);
        assert!(context.source_map.len() < 3);
    }

    #[test]
    fn test_truncated_passage_meets_minimum() {
        let assembler = assembler(20, 10);
        let long = "word ".repeat(100);
        let context = assembler.assemble(&[passage(&long, 1.0)]);
        assert_eq!(context.truncated, 1);
        assert_eq!(context.source_map.len(), 1);
        let body = context.text.strip_prefix("[Source 1] ").unwrap();
        assert!(ContextAssembler::estimate_tokens(body) >= 10);
    }

    #[test]
    fn test_stops_when_truncation_below_minimum() {
        let assembler = assembler(12, 50);
        let first = "word ".repeat(10); // fits whole (10 tokens + header)
        let second = "word ".repeat(100); // would need truncation below min
        let context = assembler.assemble(&[passage(&first, 1.0), passage(&second, 0.9)]);
        assert_eq!(context.source_map.len(), 1);
        assert_eq!(context.truncated, 0);
    }

    #[test]
    fn test_source_map_points_to_chunks_in_rank_order() {
        let assembler = assembler(1000, 5);
        let first = passage("alpha", 1.0);
        let second = passage("beta", 0.5);
        let first_chunk = first.chunk_id;
        let second_chunk = second.chunk_id;
        let context = assembler.assemble(&[first, second]);
        assert_eq!(context.source_map[&1].chunk_id, first_chunk);
        assert_eq!(context.source_map[&2].chunk_id, second_chunk);
    }

    #[test]
    fn test_empty_passages() {
        let assembler = assembler(100, 5);
        let context = assembler.assemble(&[]);
        assert!(context.is_empty());
        assert!(context.text.is_empty());
        assert_eq!(context.tokens_used, 0);
    }

    #[test]
    fn test_truncate_to_tokens_word_boundary() {
        let text = "one two three four five six";
        let truncated = truncate_to_tokens(text, 3);
        assert_eq!(truncated, "one two three");
    }
}
