//! Scripted provider: deterministic canned responses for tests and
//! offline development.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::{CancelToken, TokenUsage};
use crate::error::{Error, LlmError, Result};
use crate::llm::{Generation, GenerationParams, LlmProvider, TokenStream};

/// A provider that replays canned responses in order.
///
/// Once the queue is exhausted the last queued response repeats, so a
/// single-response script serves any number of calls. Recorded calls are
/// available for assertions.
pub struct ScriptedProvider {
    name: String,
    responses: Mutex<VecDeque<String>>,
    last_response: Mutex<String>,
    calls: Mutex<Vec<(String, String)>>,
    transient_failures: AtomicU32,
    fail_quota: AtomicBool,
    reachable: AtomicBool,
}

impl ScriptedProvider {
    /// Creates a provider with an empty script (answers with a stock
    /// string until responses are queued).
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(VecDeque::new()),
            last_response: Mutex::new("scripted response [Source 1]".to_string()),
            calls: Mutex::new(Vec::new()),
            transient_failures: AtomicU32::new(0),
            fail_quota: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
        }
    }

    /// Queues a response.
    #[must_use]
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.push_response(response);
        self
    }

    /// Queues a response on an existing provider.
    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(response.into());
        }
    }

    /// Makes the next `count` calls fail with a transient transport error.
    #[must_use]
    pub fn with_transient_failures(self, count: u32) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Makes every call fail with a quota error.
    #[must_use]
    pub fn failing_with_quota(self) -> Self {
        self.fail_quota.store(true, Ordering::SeqCst);
        self
    }

    /// Toggles the reachability probe.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// System/user pairs recorded across all calls.
    #[must_use]
    pub fn recorded_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn next_response(&self) -> String {
        let mut queue = match self.responses.lock() {
            Ok(q) => q,
            Err(_) => return String::new(),
        };
        if let Some(next) = queue.pop_front() {
            if let Ok(mut last) = self.last_response.lock() {
                last.clone_from(&next);
            }
            next
        } else {
            self.last_response
                .lock()
                .map(|l| l.clone())
                .unwrap_or_default()
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn usage_for(prompt: &str, completion: &str) -> TokenUsage {
        let prompt_tokens = prompt.split_whitespace().count() as u32;
        let completion_tokens = completion.split_whitespace().count() as u32;
        TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn available(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        _params: &GenerationParams,
        cancel: &CancelToken,
    ) -> Result<Generation> {
        cancel.check()?;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((system.to_string(), user.to_string()));
        }

        if self.fail_quota.load(Ordering::SeqCst) {
            return Err(LlmError::QuotaExceeded {
                provider: self.name.clone(),
            }
            .into());
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(LlmError::ProviderUnavailable {
                provider: self.name.clone(),
                reason: "scripted transient failure".to_string(),
            }
            .into());
        }

        let text = self.next_response();
        let usage = Self::usage_for(user, &text);
        Ok(Generation { text, usage })
    }

    async fn chat_stream(
        &self,
        system: &str,
        user: &str,
        params: &GenerationParams,
        cancel: &CancelToken,
    ) -> Result<TokenStream> {
        let generation = self.chat(system, user, params, cancel).await?;
        let (tx, rx) = mpsc::channel(16);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            for piece in generation.text.split_inclusive(' ') {
                if cancel.is_cancelled() {
                    let _ = tx.send(Err(Error::Cancelled)).await;
                    return;
                }
                if tx.send(Ok(piece.to_string())).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GenerationParams {
        GenerationParams::default()
    }

    #[tokio::test]
    async fn test_replays_in_order_then_repeats_last() {
        let provider = ScriptedProvider::new("s")
            .with_response("first")
            .with_response("second");
        let cancel = CancelToken::new();
        let a = provider.chat("sys", "u", &params(), &cancel).await.unwrap();
        let b = provider.chat("sys", "u", &params(), &cancel).await.unwrap();
        let c = provider.chat("sys", "u", &params(), &cancel).await.unwrap();
        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
        assert_eq!(c.text, "second");
    }

    #[tokio::test]
    async fn test_records_calls() {
        let provider = ScriptedProvider::new("s").with_response("x");
        provider
            .chat("system-prompt", "user-prompt", &params(), &CancelToken::new())
            .await
            .unwrap();
        let calls = provider.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "system-prompt");
        assert_eq!(calls[0].1, "user-prompt");
    }

    #[tokio::test]
    async fn test_usage_counts_words() {
        let provider = ScriptedProvider::new("s").with_response("three word reply");
        let generation = provider
            .chat("sys", "two words", &params(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(generation.usage.prompt_tokens, 2);
        assert_eq!(generation.usage.completion_tokens, 3);
        assert_eq!(generation.usage.total_tokens, 5);
    }

    #[tokio::test]
    async fn test_stream_preserves_order() {
        let provider = ScriptedProvider::new("s").with_response("a b c");
        let mut stream = provider
            .chat_stream("sys", "u", &params(), &CancelToken::new())
            .await
            .unwrap();
        let mut text = String::new();
        while let Some(chunk) = stream.recv().await {
            text.push_str(&chunk.unwrap());
        }
        assert_eq!(text, "a b c");
    }

    #[tokio::test]
    async fn test_reachability_toggle() {
        let provider = ScriptedProvider::new("s");
        assert!(provider.available().await);
        provider.set_reachable(false);
        assert!(!provider.available().await);
    }
}
