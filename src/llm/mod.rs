//! LLM Client: OpenAI-compatible chat-completions transport with retries.
//!
//! - [`wire`] -- request/response wire types and the builder that maps the
//!   provider-agnostic [`crate::message::Message`] model onto them.
//! - [`stream`] -- SSE stream accumulator for the streaming transport.
//! - [`retry`] -- pure exponential-backoff policy, transport-agnostic.
//! - [`client`] -- ties the above together behind `ask`/`ask_with_tools`.

pub mod client;
pub mod retry;
pub mod stream;
pub mod wire;

pub use client::{ChatCompletion, LlmClient, LlmClientConfig, LlmSummarizer};
pub use retry::RetryPolicy;
pub use wire::{AssistantReply, ToolChoice, Usage};
