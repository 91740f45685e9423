//! Embedding generation for dense retrieval.
//!
//! The production path talks to an external embedding service over HTTP
//! ([`HttpEmbedder`]); [`HashEmbedder`] is the deterministic offline
//! fallback used by tests and air-gapped deployments. Both uphold the same
//! contract: order and cardinality of the input batch are preserved, and
//! every vector has the configured dimension.

mod fallback;
mod http;

pub use fallback::HashEmbedder;
pub use http::{EmbeddingHealth, HttpEmbedder};

use async_trait::async_trait;

use crate::core::CancelToken;
use crate::error::{EmbeddingError, Result};

/// Trait for embedding clients.
///
/// A single call carries one batch; callers chunk large corpora and stay
/// within [`Embedder::max_batch_size`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Fixed output vector dimension.
    fn dimensions(&self) -> usize;

    /// Maximum texts accepted per call.
    fn max_batch_size(&self) -> usize;

    /// Embeds a batch of texts, preserving order and cardinality.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on an empty or oversized batch,
    /// `ResponseShapeMismatch` when the service returns the wrong count or
    /// dimension, and `ExternalUnavailable` after the retry budget.
    async fn embed(&self, texts: &[String], cancel: &CancelToken) -> Result<Vec<Vec<f32>>>;

    /// Cheap reachability probe for health checks.
    async fn available(&self) -> bool {
        true
    }
}

/// Validates batch size limits shared by all embedder implementations.
pub(crate) fn validate_batch(texts: &[String], max: usize) -> Result<()> {
    if texts.is_empty() {
        return Err(EmbeddingError::EmptyBatch.into());
    }
    if texts.len() > max {
        return Err(EmbeddingError::BatchTooLarge {
            size: texts.len(),
            max,
        }
        .into());
    }
    Ok(())
}

/// Computes cosine similarity between two embedding vectors.
///
/// Returns a value between -1.0 (opposite) and 1.0 (identical); 0.0 for
/// mismatched lengths or zero-magnitude inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
