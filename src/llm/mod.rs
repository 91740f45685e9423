//! LLM provider abstraction and gateway.
//!
//! [`LlmProvider`] is the uniform contract over chat-completion backends;
//! [`LlmGateway`] selects a provider, enforces timeouts, and retries
//! transient transport failures. [`ScriptedProvider`] is the deterministic
//! offline implementation used by tests.

mod gateway;
mod http;
mod scripted;

pub use gateway::LlmGateway;
pub use http::HttpChatProvider;
pub use scripted::ScriptedProvider;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::{CancelToken, TokenUsage};
use crate::error::Result;

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenerationParams {
    /// Sampling temperature in [0, 1].
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Nucleus sampling mass.
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
            top_p: 1.0,
        }
    }
}

/// A completed generation with its token accounting.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Generated text.
    pub text: String,
    /// Provider-reported usage.
    pub usage: TokenUsage,
}

/// Receiver of streamed token chunks, forwarded in provider order.
pub type TokenStream = mpsc::Receiver<Result<String>>;

/// Uniform contract over chat-completion providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, exposed in answer metadata.
    fn name(&self) -> &str;

    /// Cheap reachability probe for health checks.
    async fn available(&self) -> bool;

    /// Generates a completion for a system/user message pair.
    async fn chat(
        &self,
        system: &str,
        user: &str,
        params: &GenerationParams,
        cancel: &CancelToken,
    ) -> Result<Generation>;

    /// Streams a completion as token chunks in generation order.
    ///
    /// The default implementation degrades to a single chunk carrying the
    /// full [`chat`](Self::chat) response.
    async fn chat_stream(
        &self,
        system: &str,
        user: &str,
        params: &GenerationParams,
        cancel: &CancelToken,
    ) -> Result<TokenStream> {
        let generation = self.chat(system, user, params, cancel).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(Ok(generation.text)).await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = GenerationParams::default();
        assert!(params.temperature >= 0.0 && params.temperature <= 1.0);
        assert!(params.max_tokens > 0);
        assert!((params.top_p - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_stream_reassembles_response() {
        let provider = ScriptedProvider::new("test").with_response("hello world");
        let mut stream = provider
            .chat_stream(
                "sys",
                "user",
                &GenerationParams::default(),
                &CancelToken::new(),
            )
            .await
            .unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.recv().await {
            chunks.push(chunk.unwrap());
        }
        assert!(!chunks.is_empty());
        assert_eq!(chunks.join(""), "hello world");
    }
}
