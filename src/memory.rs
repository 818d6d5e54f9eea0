//! Conversation memory.
//!
//! An ordered, append-only log of [`Message`]s with a bounded-growth policy:
//! once the log exceeds `max_messages`, the oldest messages are folded into a
//! single synthetic summary. Unlike the summarization pass this module is
//! otherwise modeled on, `compress` never lets the fold point separate an
//! assistant's tool invocation from the tool-result message that answers it
//! -- the split point is walked backward until it lands on a safe boundary.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::{EngineError, Result};
use crate::message::Message;

/// Bounded-growth configuration for a [`Memory`].
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Soft upper bound; exceeding it makes `needs_compression` true.
    pub max_messages: usize,
    /// Number of most-recent messages always kept verbatim.
    pub keep_recent: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: 50,
            keep_recent: 10,
        }
    }
}

/// Produces a summary of a block of older conversation text. Injected so
/// tests can substitute a deterministic stub instead of a live LLM call.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, conversation_text: &str) -> Result<String>;
}

/// Ordered, role-tagged conversation log owned exclusively by one session.
pub struct Memory {
    messages: Vec<Message>,
    config: MemoryConfig,
}

impl Memory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            messages: Vec::new(),
            config,
        }
    }

    /// Append a message, rejecting ones that would break the transcript
    /// invariant (a tool-result referencing an invocation id not present in
    /// any prior assistant message).
    pub fn append(&mut self, message: Message) -> Result<()> {
        if let Some(invocation_id) = message.tool_result_invocation_id() {
            let known = self
                .messages
                .iter()
                .flat_map(|m| m.tool_invocations())
                .any(|inv| inv.invocation_id == invocation_id);
            if !known {
                return Err(EngineError::MemoryInvariant {
                    reason: format!(
                        "tool-result references unknown invocation id `{invocation_id}`"
                    ),
                });
            }
        }
        self.messages.push(message);
        Ok(())
    }

    /// An immutable view of the current transcript.
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn needs_compression(&self) -> bool {
        self.messages.len() > self.config.max_messages
    }

    /// Fold the oldest messages into one synthetic system summary, keeping
    /// the transcript valid under compression (see module docs).
    pub async fn compress(&mut self, summarizer: &dyn Summarizer) -> Result<()> {
        if self.messages.is_empty() {
            return Ok(());
        }

        let (system_prefix_len, conversation) =
            if matches!(self.messages[0], Message::System { .. }) {
                (1, &self.messages[1..])
            } else {
                (0, &self.messages[..])
            };

        if conversation.len() <= self.config.keep_recent {
            return Ok(());
        }

        let initial_split = conversation.len() - self.config.keep_recent;
        let split = adjust_split_for_invariant(conversation, initial_split);

        if split == 0 {
            // No safe boundary exists short of summarizing nothing; skip.
            return Ok(());
        }

        let old_messages = &conversation[..split];
        let recent_messages = &conversation[split..];

        let conversation_text = format_messages_for_summary(old_messages);
        let summary = summarizer.summarize(&conversation_text).await?;

        let mut compacted = Vec::with_capacity(system_prefix_len + 1 + recent_messages.len());
        if system_prefix_len == 1 {
            compacted.push(self.messages[0].clone());
        }
        compacted.push(Message::system(format!(
            "[Conversation summary of {count} earlier message(s)]\n{summary}",
            count = old_messages.len(),
        )));
        compacted.extend_from_slice(recent_messages);

        self.messages = compacted;
        Ok(())
    }
}

/// Walk the split point backward until no tool-result in the retained tail
/// references an invocation that would be summarized away.
fn adjust_split_for_invariant(conversation: &[Message], initial_split: usize) -> usize {
    let mut split = initial_split;
    loop {
        let invocation_ids_before: HashSet<&str> = conversation[..split]
            .iter()
            .flat_map(|m| m.tool_invocations())
            .map(|inv| inv.invocation_id.as_str())
            .collect();

        let has_orphan = conversation[split..]
            .iter()
            .filter_map(|m| m.tool_result_invocation_id())
            .any(|id| invocation_ids_before.contains(id));

        if !has_orphan || split == 0 {
            return split;
        }
        split -= 1;
    }
}

fn format_messages_for_summary(messages: &[Message]) -> String {
    let mut buf = String::with_capacity(messages.len() * 80);
    for msg in messages {
        let (role_label, extra) = match msg {
            Message::System { .. } => ("System", String::new()),
            Message::User { .. } => ("User", String::new()),
            Message::Assistant {
                tool_invocations, ..
            } if !tool_invocations.is_empty() => (
                "Assistant",
                tool_invocations
                    .iter()
                    .map(|inv| format!("\n  [invokes: {}({})]", inv.tool_name, inv.raw_arguments))
                    .collect::<String>(),
            ),
            Message::Assistant { .. } => ("Assistant", String::new()),
            Message::ToolResult { tool_name, .. } => ("Tool", format!(" ({tool_name})")),
        };
        buf.push_str(role_label);
        buf.push_str(": ");
        buf.push_str(msg.content_text());
        buf.push_str(&extra);
        buf.push('\n');
    }
    buf
}
