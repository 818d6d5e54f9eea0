//! SSE stream parsing for the OpenAI-compatible chat-completions endpoint.
//!
//! The wire format sends `data:` lines with JSON payloads containing
//! `choices[0].delta`, terminated by a `data: [DONE]` sentinel. Unlike the
//! non-streaming response, argument fragments for a given tool call arrive
//! split across many chunks keyed by `index`; this accumulator reassembles
//! them without decoding the JSON until the stream is fully consumed, since
//! the dispatcher -- not the client -- owns argument decoding.

use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::message::ToolInvocation;

use super::wire::{AssistantReply, Usage};

#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    tool_call_builders: Vec<ToolCallBuilder>,
    done: bool,
    usage: Usage,
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one SSE line. Returns the text delta, if this line carried one.
    pub fn feed_line(&mut self, line: &str) -> Result<Option<String>> {
        let line = line.trim_end();

        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }

        let data = match line.strip_prefix("data: ") {
            Some(d) => d,
            None => return Ok(None),
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let v: Value = serde_json::from_str(data).map_err(|e| EngineError::InvalidRequest {
            reason: format!("invalid JSON in streamed chunk: {e}"),
        })?;

        let delta = &v["choices"][0]["delta"];
        if delta.is_null() {
            return Ok(None);
        }

        let mut text_delta = None;
        if let Some(content) = delta["content"].as_str() {
            self.text.push_str(content);
            text_delta = Some(content.to_owned());
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for tc in tool_calls {
                let index = tc["index"].as_u64().unwrap_or(0) as usize;
                while self.tool_call_builders.len() <= index {
                    self.tool_call_builders.push(ToolCallBuilder::default());
                }
                let builder = &mut self.tool_call_builders[index];

                if let Some(id) = tc["id"].as_str() {
                    builder.id = id.to_owned();
                }
                let func = &tc["function"];
                if let Some(name) = func["name"].as_str() {
                    builder.name.push_str(name);
                }
                if let Some(args) = func["arguments"].as_str() {
                    builder.arguments.push_str(args);
                }
            }
        }

        if let Some(usage_obj) = v.get("usage").filter(|u| !u.is_null()) {
            if let Some(input) = usage_obj["prompt_tokens"].as_u64() {
                self.usage.input_tokens = input as u32;
            }
            if let Some(output) = usage_obj["completion_tokens"].as_u64() {
                self.usage.output_tokens = output as u32;
            }
        }

        Ok(text_delta)
    }

    /// Consume the accumulator, yielding the assembled reply and usage.
    pub fn into_reply(self) -> (AssistantReply, Usage) {
        let tool_invocations = self
            .tool_call_builders
            .into_iter()
            .map(|b| ToolInvocation::new(b.id, b.name, b.arguments))
            .collect();

        (
            AssistantReply {
                content: self.text,
                tool_invocations,
            },
            self.usage,
        )
    }
}
