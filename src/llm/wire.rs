//! OpenAI-compatible chat-completions wire types.
//!
//! Both the non-streaming and streaming (SSE) transports in [`super::client`]
//! produce this same shape, so callers of `ask`/`ask_with_tools` observe one
//! response type regardless of transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, ToolInvocation};
use crate::tools::ToolDescriptor;

/// How strongly the model should be pushed toward invoking a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    None,
    Auto,
    Required,
}

impl ToolChoice {
    fn as_wire_str(self) -> &'static str {
        match self {
            ToolChoice::None => "none",
            ToolChoice::Auto => "auto",
            ToolChoice::Required => "required",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunctionDef,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub(crate) fn build_request(
    model: &str,
    messages: &[Message],
    tools: &[ToolDescriptor],
    tool_choice: ToolChoice,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    stream: bool,
) -> WireRequest {
    WireRequest {
        model: model.to_string(),
        messages: messages.iter().map(to_wire_message).collect(),
        tools: tools.iter().map(to_wire_tool).collect(),
        tool_choice: if tools.is_empty() {
            None
        } else {
            Some(tool_choice.as_wire_str())
        },
        temperature,
        max_tokens,
        stream,
    }
}

fn to_wire_message(message: &Message) -> WireMessage {
    match message {
        Message::System { content } => WireMessage {
            role: "system",
            content: Some(content.clone()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        },
        Message::User { content } => WireMessage {
            role: "user",
            content: Some(content.clone()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        },
        Message::Assistant {
            content,
            tool_invocations,
        } => WireMessage {
            role: "assistant",
            content: if content.is_empty() {
                None
            } else {
                Some(content.clone())
            },
            tool_calls: tool_invocations.iter().map(to_wire_tool_call).collect(),
            tool_call_id: None,
        },
        Message::ToolResult {
            tool_invocation_id,
            content,
            ..
        } => WireMessage {
            role: "tool",
            content: Some(content.clone()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_invocation_id.clone()),
        },
    }
}

fn to_wire_tool_call(invocation: &ToolInvocation) -> WireToolCall {
    WireToolCall {
        id: invocation.invocation_id.clone(),
        kind: "function",
        function: WireFunctionCall {
            name: invocation.tool_name.clone(),
            arguments: invocation.raw_arguments.clone(),
        },
    }
}

fn to_wire_tool(descriptor: &ToolDescriptor) -> WireTool {
    WireTool {
        kind: "function",
        function: WireFunctionDef {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            parameters: descriptor.parameter_schema.clone(),
        },
    }
}

// ---------------------------------------------------------------------------
// Non-streaming response
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    pub choices: Vec<WireChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChoice {
    pub message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponseToolCall {
    pub id: String,
    pub function: WireResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponseFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireErrorBody {
    Single { error: WireErrorDetail },
    Multiple(Vec<WireErrorBody>),
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorDetail {
    pub message: String,
}

impl WireErrorBody {
    pub fn message(&self) -> String {
        match self {
            WireErrorBody::Single { error } => error.message.clone(),
            WireErrorBody::Multiple(v) => v
                .first()
                .map(|b| b.message())
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}

/// The model's reply in provider-agnostic form: free text, invocations, or
/// both.
#[derive(Debug, Clone, Default)]
pub struct AssistantReply {
    pub content: String,
    pub tool_invocations: Vec<ToolInvocation>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
