//! Core runtime for an LLM-driven ReAct agent.
//!
//! This crate implements the reasoning core of an agent: a Step Engine that
//! iterates think/act cycles over an LLM and a registry of callable tools,
//! backed by bounded conversation memory and a single public entry point
//! (the Session Facade) that callers drive to completion.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐     ┌─────────────┐     ┌────────────────┐
//! │ Session │────>│ Step Engine │────>│ Tool Registry  │
//! │ (facade)│     │ (think/act) │     │ & Dispatcher   │
//! └────┬────┘     └──────┬──────┘     └────────────────┘
//!      │                 │
//!      │          ┌──────┴──────┐
//!      │          │  LLM Client │
//!      │          │ (OpenAI-cpt)│
//!      │          └──────┬──────┘
//!      │                 │
//!      └──────────> Memory (bounded, summarized)
//! ```
//!
//! ## Modules
//!
//! - [`message`] -- the closed-union conversation message model.
//! - [`tools`] -- Tool Registry & Dispatcher: schema validation and execution.
//! - [`memory`] -- bounded conversation memory with invariant-preserving compression.
//! - [`llm`] -- LLM Client: OpenAI-compatible chat-completions transport with retries.
//! - [`engine`] -- the Step Engine: think/act iteration and its state machine.
//! - [`session`] -- the Session Facade, the crate's public entry point.
//! - [`error`] -- the closed engine error taxonomy.

pub mod engine;
pub mod error;
pub mod llm;
pub mod memory;
pub mod message;
pub mod session;
pub mod tools;

// Re-export the most commonly used types at the crate root.
pub use engine::{
    CancellationToken, EngineOutcome, EngineState, EventSink, NoopEventSink, SessionConfig,
    StepEngine, StepEvent, StepPhase,
};
pub use error::{EngineError, Result};
pub use llm::{ChatCompletion, LlmClient, LlmClientConfig, LlmSummarizer, RetryPolicy, ToolChoice};
pub use memory::{Memory, MemoryConfig, Summarizer};
pub use message::{Message, ToolInvocation, ToolOutcome};
pub use session::{Session, SessionOutcome};
pub use tools::{Tool, ToolDescriptor, ToolRegistry};
