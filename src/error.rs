//! Engine error types.
//!
//! All subsystems surface errors through a single closed [`EngineError`] enum.
//! Variants that are recoverable at the conversation level (unknown tool,
//! malformed arguments, tool execution failure) are also constructible as a
//! standalone value so the dispatcher can fold them into a tool-result
//! message instead of aborting the session; the Step Engine decides, per
//! variant, whether a failure ends the session or is merely recorded and fed
//! back to the model.

/// Unified error type for the agent core.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // -- LLM client errors ---------------------------------------------------
    /// A request to the LLM endpoint failed after exhausting retries.
    #[error("transport error after {attempts} attempt(s): {reason}")]
    Transport { attempts: u32, reason: String },

    /// The LLM endpoint rejected our credentials.
    #[error("authentication failed: {reason}")]
    Auth { reason: String },

    /// The LLM endpoint rejected the request shape (bad schema, bad model id).
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The conversation exceeds the model's context window.
    #[error("context length exceeded: {reason}")]
    ContextLength { reason: String },

    /// The LLM endpoint's rate limit was hit and the retry budget ran out.
    #[error("rate limit exhausted after {attempts} attempt(s): {reason}")]
    RateLimitExhausted { attempts: u32, reason: String },

    // -- Tool registry / dispatch errors --------------------------------------
    /// A tool call referenced by the LLM does not exist in the registry.
    #[error("unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    /// Two tools were registered under the same name.
    #[error("duplicate tool registration: {tool_name}")]
    DuplicateTool { tool_name: String },

    /// The raw argument text from the LLM was not valid JSON. Carries the
    /// original text so the model can be shown exactly what it sent.
    #[error("malformed arguments for `{tool_name}`: {reason} (raw: {raw_arguments})")]
    MalformedArguments {
        tool_name: String,
        reason: String,
        raw_arguments: String,
    },

    /// The decoded arguments did not satisfy the tool's parameter schema.
    #[error("invalid arguments for `{tool_name}`: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    /// The tool itself reported a failure while executing.
    #[error("tool execution failed for `{tool_name}`: {reason}")]
    ToolExecutionError { tool_name: String, reason: String },

    /// The tool did not complete within its allotted time.
    #[error("tool `{tool_name}` timed out after {elapsed_ms}ms")]
    ToolTimeout { tool_name: String, elapsed_ms: u64 },

    // -- Step engine errors ----------------------------------------------------
    /// `tool_choice = Required` but the model produced no invocations, twice.
    #[error("model did not invoke a required tool after {attempts} attempt(s)")]
    RequiredToolMissing { attempts: u32 },

    /// The model repeated the same response past the configured threshold.
    #[error("stuck loop detected: {repeats} identical responses")]
    StuckLoop { repeats: u32 },

    /// The session was cancelled by the host before reaching a terminal state.
    #[error("session cancelled")]
    Cancelled,

    // -- Memory errors ---------------------------------------------------------
    /// An append would have produced an invalid transcript.
    #[error("memory invariant violated: {reason}")]
    MemoryInvariant { reason: String },

    // -- Serialization -----------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A request to the LLM endpoint failed at the transport layer.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Whether this error, if surfaced mid-conversation, should be recorded as
    /// a tool-result message and fed back to the model rather than ending the
    /// session outright.
    pub fn recoverable_as_tool_result(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownTool { .. }
                | EngineError::MalformedArguments { .. }
                | EngineError::InvalidArguments { .. }
                | EngineError::ToolExecutionError { .. }
                | EngineError::ToolTimeout { .. }
        )
    }
}
