//! LLM gateway: provider registry, timeouts, and transport retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::CancelToken;
use crate::error::{Error, LlmError, Result};
use crate::llm::{Generation, GenerationParams, LlmProvider, TokenStream};
use crate::retry::Backoff;

/// Facade over one or more chat-completion providers.
///
/// Providers are registered by name; calls may override the configured
/// default. Only transient transport failures are retried; business
/// errors (quota, context length, content filter) pass straight through.
pub struct LlmGateway {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_provider: String,
    timeout: Duration,
    backoff: Backoff,
}

impl LlmGateway {
    /// Creates a gateway with a single default provider.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        let name = provider.name().to_string();
        let mut providers = HashMap::new();
        providers.insert(name.clone(), provider);
        Self {
            providers,
            default_provider: name,
            timeout,
            backoff: Backoff::default(),
        }
    }

    /// Registers an additional provider.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers
            .insert(provider.name().to_string(), provider);
        self
    }

    /// Registered provider names.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Resolves an optional override to a provider.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::UnknownProvider`] for unregistered names.
    pub fn resolve(&self, provider: Option<&str>) -> Result<&Arc<dyn LlmProvider>> {
        let name = provider.unwrap_or(&self.default_provider);
        self.providers.get(name).ok_or_else(|| {
            LlmError::UnknownProvider {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Whether the resolved provider answers its reachability probe.
    pub async fn available(&self, provider: Option<&str>) -> bool {
        match self.resolve(provider) {
            Ok(p) => p.available().await,
            Err(_) => false,
        }
    }

    fn is_transient(error: &Error) -> bool {
        matches!(error, Error::Llm(LlmError::ProviderUnavailable { .. }))
    }

    /// Generates a completion with timeout and transport retries.
    ///
    /// # Errors
    ///
    /// Propagates provider errors; transport failures surface as
    /// [`LlmError::ProviderUnavailable`] after the retry budget.
    pub async fn generate(
        &self,
        provider: Option<&str>,
        system: &str,
        user: &str,
        params: &GenerationParams,
        cancel: &CancelToken,
    ) -> Result<Generation> {
        let resolved = self.resolve(provider)?;
        let mut attempt: u32 = 0;
        loop {
            cancel.check()?;
            let call = resolved.chat(system, user, params, cancel);
            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = tokio::time::timeout(self.timeout, call) => outcome,
            };

            let error = match outcome {
                Ok(Ok(generation)) => return Ok(generation),
                Ok(Err(e)) => e,
                Err(_) => LlmError::ProviderUnavailable {
                    provider: resolved.name().to_string(),
                    reason: format!("request timed out after {:?}", self.timeout),
                }
                .into(),
            };

            if Self::is_transient(&error) && self.backoff.should_retry(attempt) {
                let delay = self.backoff.delay(attempt);
                tracing::warn!(
                    provider = resolved.name(),
                    attempt,
                    error = %error,
                    "transient provider failure, retrying"
                );
                tokio::select! {
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            } else {
                return Err(error);
            }
        }
    }

    /// Streams a completion; chunks are forwarded in provider order.
    ///
    /// Stream setup failures retry like [`generate`](Self::generate);
    /// failures mid-stream surface through the stream itself and are not
    /// retried.
    ///
    /// # Errors
    ///
    /// Propagates provider errors from stream setup.
    pub async fn generate_stream(
        &self,
        provider: Option<&str>,
        system: &str,
        user: &str,
        params: &GenerationParams,
        cancel: &CancelToken,
    ) -> Result<TokenStream> {
        let resolved = self.resolve(provider)?;
        let mut attempt: u32 = 0;
        loop {
            cancel.check()?;
            let outcome = resolved.chat_stream(system, user, params, cancel).await;
            match outcome {
                Ok(stream) => return Ok(stream),
                Err(error) if Self::is_transient(&error) && self.backoff.should_retry(attempt) => {
                    let delay = self.backoff.delay(attempt);
                    tokio::select! {
                        () = cancel.cancelled() => return Err(Error::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Name of the provider an override would resolve to.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::UnknownProvider`] for unregistered names.
    pub fn provider_name(&self, provider: Option<&str>) -> Result<String> {
        Ok(self.resolve(provider)?.name().to_string())
    }
}
