//! Built-in cleaning strategies.
//!
//! Each stage targets one class of extraction artifact. Stages are pure
//! and individually testable; the composite order lives in
//! [`CleaningPipeline::standard`](super::CleaningPipeline::standard).

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::{IsNormalized, UnicodeNormalization, is_nfkc_quick};

use super::CleaningStrategy;

/// NFKC unicode normalization (compatibility forms, full-width characters,
/// non-breaking spaces).
pub struct UnicodeNormalize;

impl CleaningStrategy for UnicodeNormalize {
    fn name(&self) -> &'static str {
        "unicode_normalize"
    }

    fn applies(&self, text: &str) -> bool {
        is_nfkc_quick(text.chars()) != IsNormalized::Yes
    }

    fn apply(&self, text: &str) -> String {
        text.nfkc().collect()
    }
}

/// Removes form-fill artifacts: checkboxes, list glyphs, and control
/// characters other than newline and tab.
pub struct FormArtifactRemoval;

impl FormArtifactRemoval {
    const GLYPHS: [char; 8] = ['☐', '☑', '☒', '•', '▪', '◦', '‣', '\u{fffd}'];

    fn is_artifact(c: char) -> bool {
        Self::GLYPHS.contains(&c) || (c.is_control() && c != '\n' && c != '\t')
    }
}

impl CleaningStrategy for FormArtifactRemoval {
    fn name(&self) -> &'static str {
        "form_artifact_removal"
    }

    fn applies(&self, text: &str) -> bool {
        text.chars().any(Self::is_artifact)
    }

    fn apply(&self, text: &str) -> String {
        text.chars().filter(|&c| !Self::is_artifact(c)).collect()
    }
}

static SPACED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    // Three or more single letters separated by single spaces, e.g.
    // "P a r i s". Bounded by non-letter context to avoid eating "a b".
    Regex::new(r"\b(?:\p{L} ){2,}\p{L}\b").expect("static regex")
});

/// Joins letter-spaced words produced by PDF extraction ("P a r i s").
pub struct WordSpacingFix;

impl CleaningStrategy for WordSpacingFix {
    fn name(&self) -> &'static str {
        "word_spacing_fix"
    }

    fn applies(&self, text: &str) -> bool {
        SPACED_WORD.is_match(text)
    }

    fn apply(&self, text: &str) -> String {
        SPACED_WORD
            .replace_all(text, |caps: &regex::Captures<'_>| {
                caps[0].chars().filter(|c| !c.is_whitespace()).collect::<String>()
            })
            .into_owned()
    }
}

static HORIZONTAL_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("static regex"));
static TRAILING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("static regex"));

/// Collapses horizontal whitespace runs and strips trailing spaces.
pub struct WhitespaceNormalize;

impl CleaningStrategy for WhitespaceNormalize {
    fn name(&self) -> &'static str {
        "whitespace_normalize"
    }

    fn applies(&self, text: &str) -> bool {
        HORIZONTAL_RUNS.is_match(text) || TRAILING_SPACE.is_match(text)
    }

    fn apply(&self, text: &str) -> String {
        let collapsed = HORIZONTAL_RUNS.replace_all(text, " ");
        TRAILING_SPACE.replace_all(&collapsed, "\n").into_owned()
    }
}

/// Collapses three or more identical consecutive non-empty lines (headers
/// and footers repeated on every extracted page) down to one.
pub struct RepetitiveContentRemoval;

impl RepetitiveContentRemoval {
    fn collapse(text: &str) -> (String, bool) {
        let mut out: Vec<&str> = Vec::new();
        let mut run_start = 0usize;
        let mut changed = false;
        let lines: Vec<&str> = text.lines().collect();

        for i in 0..=lines.len() {
            let run_ended = i == lines.len() || lines[i] != lines[run_start];
            if run_ended {
                let run_len = i - run_start;
                let line = lines[run_start..i].first().copied().unwrap_or("");
                if run_len >= 3 && !line.trim().is_empty() {
                    out.push(line);
                    changed = true;
                } else {
                    out.extend(&lines[run_start..i]);
                }
                run_start = i;
            }
        }

        (out.join("\n"), changed)
    }
}

impl CleaningStrategy for RepetitiveContentRemoval {
    fn name(&self) -> &'static str {
        "repetitive_content_removal"
    }

    fn applies(&self, text: &str) -> bool {
        Self::collapse(text).1
    }

    fn apply(&self, text: &str) -> String {
        Self::collapse(text).0
    }
}

static TABLE_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[|+=\-: \t]+[ \t]*$").expect("static regex"));
static PIPE_DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\|[ \t]*").expect("static regex"));

/// Strips table rules and turns pipe-delimited rows into plain rows.
pub struct TableCleanup;

impl CleaningStrategy for TableCleanup {
    fn name(&self) -> &'static str {
        "table_cleanup"
    }

    fn applies(&self, text: &str) -> bool {
        text.contains('|')
    }

    fn apply(&self, text: &str) -> String {
        let without_rules = TABLE_RULE.replace_all(text, "");
        without_rules
            .lines()
            .map(|line| {
                if line.contains('|') {
                    PIPE_DELIMITER.replace_all(line, " ").trim().to_string()
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Final tidy: collapses blank-line runs and trims the ends.
pub struct FinalCleanup;

impl CleaningStrategy for FinalCleanup {
    fn name(&self) -> &'static str {
        "final_cleanup"
    }

    fn applies(&self, text: &str) -> bool {
        BLANK_RUNS.is_match(text) || text.trim() != text
    }

    fn apply(&self, text: &str) -> String {
        BLANK_RUNS.replace_all(text, "\n\n").trim().to_string()
    }
}
