//! Hash-based fallback embedder.
//!
//! Deterministic pseudo-embeddings built from word and character-trigram
//! hashing. Similarity reflects lexical overlap, not semantics; the point
//! is a dependency-free [`Embedder`] with stable output for tests and
//! air-gapped deployments.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rayon::prelude::*;

use crate::config::DEFAULT_EMBEDDING_DIMENSIONS;
use crate::core::CancelToken;
use crate::embedding::{Embedder, validate_batch};
use crate::error::Result;

/// Deterministic hash-based embedder.
///
/// # Examples
///
/// ```
/// use ragpipe::core::CancelToken;
/// use ragpipe::embedding::{Embedder, HashEmbedder};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let embedder = HashEmbedder::default();
/// let cancel = CancelToken::new();
/// let a = embedder.embed(&["hello world".to_string()], &cancel).await.unwrap();
/// let b = embedder.embed(&["hello world".to_string()], &cancel).await.unwrap();
/// assert_eq!(a, b);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    max_batch_size: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS, 32)
    }
}

impl HashEmbedder {
    /// Creates a hash embedder with the given dimension and batch limit.
    #[must_use]
    pub const fn new(dimensions: usize, max_batch_size: usize) -> Self {
        Self {
            dimensions,
            max_batch_size,
        }
    }

    fn hash_string(s: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    /// Generates a unit-length pseudo-embedding from text.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn generate(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let normalized: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c.is_whitespace() {
                    c.to_ascii_lowercase()
                } else {
                    ' '
                }
            })
            .collect();

        // Word-level hashing (primary signal)
        for word in normalized.split_whitespace() {
            let hash = Self::hash_string(word);
            let idx = (hash as usize) % self.dimensions;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            let magnitude = 1.0 + ((hash >> 16) & 0xFF) as f32 / 255.0;
            embedding[idx] += sign * magnitude;
        }

        // Character trigram hashing (secondary signal for fuzzy matching)
        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() >= 3 {
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let hash = Self::hash_string(&trigram);
                let idx = (hash as usize) % self.dimensions;
                let sign = if (hash >> 32) & 1 == 0 { 0.5 } else { -0.5 };
                embedding[idx] += sign;
            }
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }

        embedding
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn embed(&self, texts: &[String], cancel: &CancelToken) -> Result<Vec<Vec<f32>>> {
        validate_batch(texts, self.max_batch_size)?;
        cancel.check()?;
        Ok(texts.par_iter().map(|text| self.generate(text)).collect())
    }
}
