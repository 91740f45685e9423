//! Text cleaning pipeline.
//!
//! Extraction output passes through an ordered composition of cleaning
//! strategies before chunking. Each stage declares whether it applies and
//! exposes a pure `apply`; the composite runs them in declared order, so
//! cleaning is deterministic for a given input.

mod strategies;

pub use strategies::{
    FinalCleanup, FormArtifactRemoval, RepetitiveContentRemoval, TableCleanup, UnicodeNormalize,
    WhitespaceNormalize, WordSpacingFix,
};

/// A single cleaning stage.
///
/// `apply` must be pure: same input, same output, no side effects.
pub trait CleaningStrategy: Send + Sync {
    /// Stage name for diagnostics.
    fn name(&self) -> &'static str;

    /// Whether this stage has any work to do on `text`.
    fn applies(&self, text: &str) -> bool;

    /// Transforms the text.
    fn apply(&self, text: &str) -> String;
}

/// Ordered cleaning pipeline.
pub struct CleaningPipeline {
    stages: Vec<Box<dyn CleaningStrategy>>,
}

impl Default for CleaningPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl CleaningPipeline {
    /// The standard stage order used by the indexing pipeline.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            stages: vec![
                Box::new(UnicodeNormalize),
                Box::new(FormArtifactRemoval),
                Box::new(WordSpacingFix),
                Box::new(WhitespaceNormalize),
                Box::new(RepetitiveContentRemoval),
                Box::new(TableCleanup),
                Box::new(FinalCleanup),
            ],
        }
    }

    /// Builds a pipeline from explicit stages, run in the given order.
    #[must_use]
    pub fn with_stages(stages: Vec<Box<dyn CleaningStrategy>>) -> Self {
        Self { stages }
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every applicable stage in order.
    #[must_use]
    pub fn clean(&self, text: &str) -> String {
        let mut current = text.to_string();
        for stage in &self.stages {
            if stage.applies(&current) {
                tracing::debug!(stage = stage.name(), "applying cleaning stage");
                current = stage.apply(&current);
            }
        }
        current
    }
}
