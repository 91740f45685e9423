//! HTTP embedding service client.
//!
//! Speaks the embedding service contract: `POST /embed` with
//! `{"texts": [...]}` returning `{"embeddings": [[...]]}` of identical
//! cardinality, and `GET /health` for reachability probes. Transient
//! transport failures are retried with exponential backoff and full
//! jitter; shape violations fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::core::CancelToken;
use crate::embedding::{Embedder, validate_batch};
use crate::error::{EmbeddingError, Error, Result};
use crate::retry::Backoff;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Health payload reported by the embedding service.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingHealth {
    /// Service status string (`"ok"` when healthy).
    pub status: String,
    /// Model identifier the service is running.
    pub model: String,
}

/// Embedding client backed by an external HTTP service.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
    backoff: Backoff,
}

impl HttpEmbedder {
    /// Creates a client for the configured embedding service.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| Error::internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            config,
            backoff: Backoff::default(),
        })
    }

    fn embed_url(&self) -> String {
        format!("{}/embed", self.config.url.trim_end_matches('/'))
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.url.trim_end_matches('/'))
    }

    /// Probes `GET /health`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Unavailable`] when the service is
    /// unreachable or reports a non-ok payload.
    pub async fn health(&self) -> Result<EmbeddingHealth> {
        let response = self
            .client
            .get(self.health_url())
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable {
                reason: e.to_string(),
            })?;
        let health: EmbeddingHealth =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::Unavailable {
                    reason: format!("malformed health payload: {e}"),
                })?;
        Ok(health)
    }

    async fn post_batch(&self, texts: &[String]) -> std::result::Result<EmbedResponse, String> {
        let response = self
            .client
            .post(self.embed_url())
            .json(&EmbedRequest { texts })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("embedding service returned {status}"));
        }
        response.json().await.map_err(|e| e.to_string())
    }

    fn check_shape(&self, sent: usize, embeddings: &[Vec<f32>]) -> Result<()> {
        if embeddings.len() != sent {
            return Err(EmbeddingError::CountMismatch {
                sent,
                received: embeddings.len(),
            }
            .into());
        }
        for vector in embeddings {
            if vector.len() != self.config.dimensions {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.config.dimensions,
                    actual: vector.len(),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    async fn embed(&self, texts: &[String], cancel: &CancelToken) -> Result<Vec<Vec<f32>>> {
        validate_batch(texts, self.config.max_batch_size)?;

        let mut attempt: u32 = 0;
        loop {
            cancel.check()?;

            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = self.post_batch(texts) => outcome,
            };

            match outcome {
                Ok(response) => {
                    self.check_shape(texts.len(), &response.embeddings)?;
                    return Ok(response.embeddings);
                }
                Err(reason) if self.backoff.should_retry(attempt) => {
                    let delay = self.backoff.delay(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %reason,
                        "embedding request failed, retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(Error::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(reason) => {
                    return Err(EmbeddingError::Unavailable { reason }.into());
                }
            }
        }
    }

    async fn available(&self) -> bool {
        self.health().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder() -> HttpEmbedder {
        HttpEmbedder::new(EmbeddingConfig::default()).unwrap()
    }

    #[test]
    fn test_urls_join_cleanly() {
        let config = EmbeddingConfig {
            url: "http://svc:9000/".to_string(),
            ..EmbeddingConfig::default()
        };
        let client = HttpEmbedder::new(config).unwrap();
        assert_eq!(client.embed_url(), "http://svc:9000/embed");
        assert_eq!(client.health_url(), "http://svc:9000/health");
    }

    #[test]
    fn test_check_shape_count_mismatch() {
        let client = embedder();
        let vectors = vec![vec![0.0; 384]];
        let err = client.check_shape(2, &vectors).unwrap_err();
        assert!(matches!(
            err,
            Error::Embedding(EmbeddingError::CountMismatch { sent: 2, received: 1 })
        ));
    }

    #[test]
    fn test_check_shape_dimension_mismatch() {
        let client = embedder();
        let vectors = vec![vec![0.0; 10]];
        let err = client.check_shape(1, &vectors).unwrap_err();
        assert!(matches!(
            err,
            Error::Embedding(EmbeddingError::DimensionMismatch {
                expected: 384,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_check_shape_ok() {
        let client = embedder();
        let vectors = vec![vec![0.0; 384], vec![0.5; 384]];
        assert!(client.check_shape(2, &vectors).is_ok());
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_batch_before_network() {
        let client = embedder();
        let result = client.embed(&[], &CancelToken::new()).await;
        assert!(matches!(
            result,
            Err(Error::Embedding(EmbeddingError::EmptyBatch))
        ));
    }

    #[tokio::test]
    async fn test_embed_honors_pre_cancelled_token() {
        let client = embedder();
        let token = CancelToken::new();
        token.cancel();
        let result = client.embed(&["x".to_string()], &token).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
