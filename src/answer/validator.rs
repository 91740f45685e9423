//! Structural response validation.
//!
//! Hard failures: empty responses, length violations, missing citation
//! markers (unless the template opts out), and refusal phrasing when
//! passages were actually supplied. Soft findings (unknown markers) are
//! appended by the orchestrator from the linker's output.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::ValidationReport;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Source \d+\]").expect("static regex"));

const REFUSAL_PHRASES: [&str; 5] = [
    "i cannot answer",
    "i can't answer",
    "i do not have access",
    "i don't have access",
    "as an ai language model",
];

/// Structural validator for generated responses.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    min_chars: usize,
    max_chars: usize,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self {
            min_chars: 1,
            max_chars: 16_000,
        }
    }
}

impl ResponseValidator {
    /// Creates a validator with explicit length bounds.
    #[must_use]
    pub const fn new(min_chars: usize, max_chars: usize) -> Self {
        Self {
            min_chars,
            max_chars,
        }
    }

    /// Validates a response.
    ///
    /// `had_passages` states whether any retrieved passage was supplied
    /// to the prompt; `no_citation` exempts the template from the
    /// citation-marker check.
    #[must_use]
    pub fn validate(
        &self,
        response: &str,
        had_passages: bool,
        no_citation: bool,
    ) -> ValidationReport {
        let mut issues = Vec::new();
        let trimmed = response.trim();

        if trimmed.is_empty() {
            return ValidationReport {
                valid: false,
                issues: vec!["response is empty".to_string()],
            };
        }

        let chars = trimmed.chars().count();
        if chars < self.min_chars {
            issues.push(format!(
                "response of {chars} chars is below the minimum {}",
                self.min_chars
            ));
        }
        if chars > self.max_chars {
            issues.push(format!(
                "response of {chars} chars exceeds the maximum {}",
                self.max_chars
            ));
        }

        if !no_citation && !MARKER.is_match(trimmed) {
            issues.push("response carries no [Source N] citation".to_string());
        }

        if had_passages {
            let lower = trimmed.to_lowercase();
            if let Some(phrase) = REFUSAL_PHRASES.iter().find(|p| lower.contains(**p)) {
                issues.push(format!(
                    "response refuses ({phrase}) despite supplied passages"
                ));
            }
        }

        ValidationReport {
            valid: issues.is_empty(),
            issues,
        }
    }
}
