//! LLM Client: a retrying, OpenAI-compatible chat-completions transport.
//!
//! Exposes `ask` (plain completion) and `ask_with_tools` (tool-calling mode)
//! over both a non-streaming and a streaming (SSE) transport; both funnel
//! into the same [`AssistantReply`] shape so callers never need to know
//! which transport served a given call.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::error::{EngineError, Result};
use crate::memory::Summarizer;
use crate::message::Message;
use crate::tools::ToolDescriptor;

use super::retry::{RetryPolicy, RetryableKind, classify_status};
use super::stream::StreamAccumulator;
use super::wire::{self, AssistantReply, ToolChoice, Usage, WireErrorBody, WireResponse};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The narrow seam the Step Engine calls through. Exists so tests can drive
/// the engine against a stub transport instead of a live HTTP endpoint;
/// [`LlmClient`] is the only production implementation.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn ask_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        tool_choice: ToolChoice,
    ) -> Result<AssistantReply>;
}

/// Configuration for connecting to an OpenAI-compatible chat-completions
/// endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub request_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl LlmClientConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            temperature: Some(0.0),
            max_tokens: Some(4096),
            request_timeout: Duration::from_secs(120),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Minimal well-formedness check: an absolute `http(s)://` URL with a host.
/// The client never needs more than this -- it only ever appends
/// `/chat/completions` to whatever is configured here.
fn validate_base_url(base_url: &str) -> Result<()> {
    let rest = base_url
        .strip_prefix("https://")
        .or_else(|| base_url.strip_prefix("http://"))
        .ok_or_else(|| EngineError::InvalidRequest {
            reason: format!("base_url `{base_url}` must start with http:// or https://"),
        })?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(EngineError::InvalidRequest {
            reason: format!("base_url `{base_url}` is missing a host"),
        });
    }
    Ok(())
}

/// A client bound to one LLM endpoint, safe to share across sessions.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LlmClientConfig,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(EngineError::InvalidRequest {
                reason: "LLM client requires a non-empty api_key".into(),
            });
        }
        if config.model.is_empty() {
            return Err(EngineError::InvalidRequest {
                reason: "LLM client requires a non-empty model id".into(),
            });
        }
        validate_base_url(&config.base_url)?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::InvalidRequest {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    /// Plain-completion mode: no tools offered.
    pub async fn ask(&self, messages: &[Message]) -> Result<AssistantReply> {
        self.ask_with_tools(messages, &[], ToolChoice::Auto).await
    }

    /// Tool-calling mode.
    pub async fn ask_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        tool_choice: ToolChoice,
    ) -> Result<AssistantReply> {
        let body = wire::build_request(
            &self.config.model,
            messages,
            tools,
            tool_choice,
            self.config.temperature,
            self.config.max_tokens,
            false,
        );

        let mut attempt: u32 = 1;
        loop {
            tracing::debug!(attempt, model = %self.config.model, "sending chat completion request");
            match self.send_once(&body).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    let kind = classify_error(&e);
                    match self.config.retry_policy.delay_for(attempt, kind) {
                        Some(delay) => {
                            tracing::warn!(attempt, delay = ?delay, error = %e, "retrying llm request");
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            return Err(match (&e, kind) {
                                (EngineError::RateLimitExhausted { reason, .. }, _) => {
                                    EngineError::RateLimitExhausted {
                                        attempts: attempt,
                                        reason: reason.clone(),
                                    }
                                }
                                (_, RetryableKind::Transient) => EngineError::Transport {
                                    attempts: attempt,
                                    reason: e.to_string(),
                                },
                                _ => e,
                            });
                        }
                    }
                }
            }
        }
    }

    async fn send_once(&self, body: &wire::WireRequest) -> Result<AssistantReply> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_key)).map_err(|e| {
                EngineError::InvalidRequest {
                    reason: format!("api key is not a valid header value: {e}"),
                }
            })?,
        );

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<WireErrorBody>(&text)
                .map(|e| e.message())
                .unwrap_or_else(|_| text.clone());

            return Err(match status.as_u16() {
                401 | 403 => EngineError::Auth { reason: message },
                413 => EngineError::ContextLength { reason: message },
                400 | 404 | 422 => EngineError::InvalidRequest { reason: message },
                429 => EngineError::RateLimitExhausted {
                    attempts: 1,
                    reason: message,
                },
                code => EngineError::Transport {
                    attempts: 1,
                    reason: format!("http {code}: {message}"),
                },
            });
        }

        let parsed: WireResponse = serde_json::from_str(&text)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::InvalidRequest {
                reason: "response contained no choices".into(),
            })?;

        let tool_invocations = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                crate::message::ToolInvocation::new(tc.id, tc.function.name, tc.function.arguments)
            })
            .collect();

        Ok(AssistantReply {
            content: choice.message.content.unwrap_or_default(),
            tool_invocations,
        })
    }

    /// Same contract as [`Self::ask_with_tools`], but consumes an SSE stream
    /// and reports text deltas through `on_text_delta` as they arrive.
    pub async fn ask_with_tools_streaming(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        tool_choice: ToolChoice,
        mut on_text_delta: impl FnMut(&str) + Send,
    ) -> Result<(AssistantReply, Usage)> {
        let body = wire::build_request(
            &self.config.model,
            messages,
            tools,
            tool_choice,
            self.config.temperature,
            self.config.max_tokens,
            true,
        );

        let url = format!("{}/chat/completions", self.config.base_url);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_key)).map_err(|e| {
                EngineError::InvalidRequest {
                    reason: format!("api key is not a valid header value: {e}"),
                }
            })?,
        );

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Transport {
                attempts: 1,
                reason: format!("http {status}: {text}"),
            });
        }

        let mut accumulator = StreamAccumulator::new();
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].to_string();
                buffer.drain(..=pos);
                if let Some(delta) = accumulator.feed_line(&line)? {
                    on_text_delta(&delta);
                }
            }

            if accumulator.is_done() {
                break;
            }
        }

        Ok(accumulator.into_reply())
    }
}

#[async_trait]
impl ChatCompletion for LlmClient {
    async fn ask_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        tool_choice: ToolChoice,
    ) -> Result<AssistantReply> {
        LlmClient::ask_with_tools(self, messages, tools, tool_choice).await
    }
}

fn classify_error(error: &EngineError) -> RetryableKind {
    match error {
        EngineError::Transport { .. } => RetryableKind::Transient,
        EngineError::RateLimitExhausted { .. } => RetryableKind::Transient,
        EngineError::Request(e) => {
            if e.is_timeout() || e.is_connect() {
                RetryableKind::Transient
            } else if let Some(status) = e.status() {
                classify_status(status.as_u16())
            } else {
                RetryableKind::Transient
            }
        }
        _ => RetryableKind::Permanent,
    }
}

/// Adapts any [`ChatCompletion`] to the [`Summarizer`] contract so the Step
/// Engine can wire it directly into [`crate::memory::Memory::compress`],
/// including stub transports in tests.
pub struct LlmSummarizer<'a> {
    client: &'a dyn ChatCompletion,
}

impl<'a> LlmSummarizer<'a> {
    pub fn new(client: &'a dyn ChatCompletion) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer<'_> {
    async fn summarize(&self, conversation_text: &str) -> Result<String> {
        let prompt = format!(
            "Summarize the following conversation concisely, preserving key facts, \
             decisions, tool results, and context needed to continue it. Be factual \
             and brief.\n\n{conversation_text}"
        );
        let reply = self
            .client
            .ask_with_tools(&[Message::user(prompt)], &[], ToolChoice::Auto)
            .await?;
        Ok(reply.content)
    }
}
