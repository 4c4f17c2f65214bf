// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LLM provider adapter.
//!
//! The gateway is the only caller. `HttpLlmProvider` targets an
//! OpenAI-compatible chat-completions endpoint; `FakeLlmProvider` replays
//! scripted results for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from provider calls, pre-sorted by transience.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("provider error: {0}")]
    Api(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// One chat message in provider wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A completed chat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub text: String,
    pub usage: ChatUsage,
}

/// Adapter for an external LLM provider.
#[async_trait]
pub trait LlmProvider: Clone + Send + Sync + 'static {
    /// Issue one chat completion. The timeout bounds the whole attempt;
    /// expiry must surface as [`LlmError::Timeout`].
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f64,
        timeout: Duration,
    ) -> Result<ChatResponse, LlmError>;
}

// ── HTTP provider ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: String,
}

/// Provider backed by an OpenAI-compatible `/v1/chat/completions` endpoint.
#[derive(Clone)]
pub struct HttpLlmProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpLlmProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: String) -> LlmError {
        if status.as_u16() == 429 {
            LlmError::RateLimited(body)
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            LlmError::Auth(body)
        } else {
            LlmError::Api(format!("HTTP {status}: {body}"))
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f64,
        timeout: Duration,
    ) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let request = CompletionRequest {
            model,
            messages,
            max_tokens,
            temperature,
        };

        let send = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(timeout)
            .send();

        let response = match send.await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(LlmError::Timeout(timeout)),
            Err(e) if e.is_connect() => return Err(LlmError::Connection(e.to_string())),
            Err(e) => return Err(LlmError::Api(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("response has no choices".to_string()))?;

        Ok(ChatResponse {
            text,
            usage: parsed.usage,
        })
    }
}

// ── Fake provider (test support) ─────────────────────────────────────────────

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLlmProvider, LlmCall};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Recorded call made against the fake provider.
    #[derive(Debug, Clone)]
    pub struct LlmCall {
        pub model: String,
        pub messages: Vec<ChatMessage>,
        pub max_tokens: u32,
        pub temperature: f64,
    }

    /// Scripted provider: pops one result per call, records every call.
    ///
    /// When the script runs dry it returns a canned empty success, so
    /// tests only script the calls they care about.
    #[derive(Clone, Default)]
    pub struct FakeLlmProvider {
        script: Arc<Mutex<VecDeque<Result<ChatResponse, LlmError>>>>,
        calls: Arc<Mutex<Vec<LlmCall>>>,
    }

    impl FakeLlmProvider {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a successful response with the given text and token usage.
        pub fn push_text(&self, text: impl Into<String>, prompt_tokens: u64, completion_tokens: u64) {
            self.script.lock().push_back(Ok(ChatResponse {
                text: text.into(),
                usage: ChatUsage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                },
            }));
        }

        /// Queue an error result.
        pub fn push_error(&self, error: LlmError) {
            self.script.lock().push_back(Err(error));
        }

        /// Calls made so far.
        pub fn calls(&self) -> Vec<LlmCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for FakeLlmProvider {
        async fn chat(
            &self,
            model: &str,
            messages: &[ChatMessage],
            max_tokens: u32,
            temperature: f64,
            _timeout: Duration,
        ) -> Result<ChatResponse, LlmError> {
            self.calls.lock().push(LlmCall {
                model: model.to_string(),
                messages: messages.to_vec(),
                max_tokens,
                temperature,
            });

            self.script.lock().pop_front().unwrap_or_else(|| {
                Ok(ChatResponse {
                    text: String::new(),
                    usage: ChatUsage::default(),
                })
            })
        }
    }
}

#[cfg(test)]
#[path = "llm_tests.rs"]
mod tests;
