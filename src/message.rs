//! The conversation data model.
//!
//! [`Message`] is a closed tagged union over roles rather than a single
//! struct with optional fields left to convention: only the assistant
//! variant can carry tool invocations, and only the tool-result variant can
//! carry an invocation id. Invalid combinations (a user message with tool
//! invocations, say) are not representable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single tool invocation requested by the model inside an assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Opaque id assigned by the LLM, used to correlate the matching result.
    pub invocation_id: String,
    /// Name of the tool to invoke; not validated against a registry here.
    pub tool_name: String,
    /// Raw JSON text for the arguments, exactly as received from the LLM.
    /// Decoding and validation happen in the dispatcher, not here.
    pub raw_arguments: String,
}

impl ToolInvocation {
    pub fn new(
        invocation_id: impl Into<String>,
        tool_name: impl Into<String>,
        raw_arguments: impl Into<String>,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            tool_name: tool_name.into(),
            raw_arguments: raw_arguments.into(),
        }
    }
}

/// The outcome of dispatching one [`ToolInvocation`].
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub invocation_id: String,
    pub tool_name: String,
    /// Displayable output text, or a diagnostic message if `is_error`.
    pub content: String,
    pub is_error: bool,
}

/// A single message in the conversation transcript.
///
/// Constructed only through the associated functions below, so every
/// instance satisfies the role/field pairing invariants by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        /// Empty when the turn consists only of tool invocations.
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_invocations: Vec<ToolInvocation>,
    },
    ToolResult {
        tool_invocation_id: String,
        tool_name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_invocations: Vec::new(),
        }
    }

    pub fn assistant_with_invocations(
        content: impl Into<String>,
        tool_invocations: Vec<ToolInvocation>,
    ) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_invocations,
        }
    }

    pub fn tool_result(outcome: &ToolOutcome) -> Self {
        Message::ToolResult {
            tool_invocation_id: outcome.invocation_id.clone(),
            tool_name: outcome.tool_name.clone(),
            content: outcome.content.clone(),
            is_error: outcome.is_error,
        }
    }

    /// The free-text content carried by this message, empty for tool-only
    /// assistant turns.
    pub fn content_text(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. } => content,
            Message::ToolResult { content, .. } => content,
        }
    }

    pub fn tool_invocations(&self) -> &[ToolInvocation] {
        match self {
            Message::Assistant {
                tool_invocations, ..
            } => tool_invocations,
            _ => &[],
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Message::Assistant { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Message::ToolResult { .. })
    }

    pub fn tool_result_invocation_id(&self) -> Option<&str> {
        match self {
            Message::ToolResult {
                tool_invocation_id, ..
            } => Some(tool_invocation_id),
            _ => None,
        }
    }
}

/// A decoded, schema-validated argument payload handed to a tool's executor.
pub type ToolArguments = Value;
