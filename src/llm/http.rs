//! HTTP chat-completions provider.
//!
//! Speaks the OpenAI-compatible `/chat/completions` JSON shape, which
//! local inference servers (Ollama, vLLM, llama.cpp) also expose. Status
//! codes map onto the gateway error taxonomy: 429 is quota, payload-too-
//! large class errors are context length, refusal finish reasons are
//! content filtering, and everything transport-shaped is
//! `ProviderUnavailable` (retried by the gateway).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::core::{CancelToken, TokenUsage};
use crate::error::{Error, LlmError, Result};
use crate::llm::{Generation, GenerationParams, LlmProvider};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

/// Chat-completions provider over HTTP.
pub struct HttpChatProvider {
    name: String,
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpChatProvider {
    /// Creates a provider named `name` for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(name: impl Into<String>, config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            name: name.into(),
            client,
            config,
        })
    }

    fn unavailable(&self, reason: impl Into<String>) -> Error {
        LlmError::ProviderUnavailable {
            provider: self.name.clone(),
            reason: reason.into(),
        }
        .into()
    }

    fn classify_status(&self, status: reqwest::StatusCode, body: &str) -> Error {
        if status.as_u16() == 429 {
            return LlmError::QuotaExceeded {
                provider: self.name.clone(),
            }
            .into();
        }
        if status.as_u16() == 400 && body.contains("context_length") {
            return LlmError::ContextTooLong {
                prompt_tokens: 0,
                limit: 0,
            }
            .into();
        }
        self.unavailable(format!("provider returned {status}: {body}"))
    }
}

#[async_trait]
impl LlmProvider for HttpChatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn available(&self) -> bool {
        // HEAD against the endpoint answers "is something listening"
        // without burning tokens.
        self.client.head(&self.config.url).send().await.is_ok()
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        params: &GenerationParams,
        cancel: &CancelToken,
    ) -> Result<Generation> {
        cancel.check()?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
        };

        let mut builder = self.client.post(&self.config.url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            response = builder.send() => response.map_err(|e| self.unavailable(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.classify_status(status, &body));
        }

        let payload: ChatResponse = response.json().await.map_err(|e| {
            Error::from(LlmError::MalformedResponse {
                reason: e.to_string(),
            })
        })?;

        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::from(LlmError::MalformedResponse {
                    reason: "response carried no choices".to_string(),
                })
            })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(LlmError::ContentFiltered {
                provider: self.name.clone(),
                reason: "finish_reason=content_filter".to_string(),
            }
            .into());
        }

        let text = choice.message.content.ok_or_else(|| {
            Error::from(LlmError::MalformedResponse {
                reason: "choice carried no content".to_string(),
            })
        })?;

        Ok(Generation {
            text,
            usage: TokenUsage {
                prompt_tokens: payload.usage.prompt_tokens,
                completion_tokens: payload.usage.completion_tokens,
                total_tokens: payload.usage.total_tokens,
            },
        })
    }
}
