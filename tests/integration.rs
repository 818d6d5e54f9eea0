//! Cross-module integration tests for the message, tool, and memory layers,
//! none of which require a live LLM connection.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use react_agent_core::{
    EngineError, Memory, MemoryConfig, Message, Result, Summarizer, Tool, ToolDescriptor,
    ToolInvocation, ToolRegistry,
};
use serde_json::{Value, json};

// ═══════════════════════════════════════════════════════════════════════
//  Message model
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn message_constructors_pair_fields_correctly() {
    let sys = Message::system("be concise");
    assert_eq!(sys.content_text(), "be concise");
    assert!(!sys.is_assistant());

    let user = Message::user("hello");
    assert_eq!(user.content_text(), "hello");

    let asst = Message::assistant_with_invocations(
        "",
        vec![ToolInvocation::new("call_1", "search", r#"{"q":"rust"}"#)],
    );
    assert!(asst.is_assistant());
    assert_eq!(asst.tool_invocations().len(), 1);
}

#[test]
fn message_serialization_roundtrip_preserves_tool_invocations() {
    let msg = Message::assistant_with_invocations(
        "checking the weather",
        vec![ToolInvocation::new("call_9", "weather", r#"{"city":"nyc"}"#)],
    );
    let json = serde_json::to_string(&msg).unwrap();
    let parsed: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.content_text(), "checking the weather");
    assert_eq!(parsed.tool_invocations()[0].tool_name, "weather");
}

// ═══════════════════════════════════════════════════════════════════════
//  Tool registry & dispatcher
// ═══════════════════════════════════════════════════════════════════════

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "echo",
            "Echo back the given text",
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<String> {
        Ok(arguments["text"].as_str().unwrap_or_default().to_string())
    }
}

struct FlakyTool {
    failures_remaining: AtomicU32,
}

#[async_trait]
impl Tool for FlakyTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("flaky", "Fails a fixed number of times", json!({"type": "object"}))
    }

    async fn execute(&self, _arguments: Value) -> Result<String> {
        if self.failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            return Err(EngineError::ToolExecutionError {
                tool_name: "flaky".into(),
                reason: "simulated failure".into(),
            });
        }
        Ok("recovered".into())
    }
}

#[tokio::test]
async fn dispatch_round_trips_through_registry() {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchoTool)).unwrap();

    let outcome = registry.dispatch("call_1", "echo", r#"{"text":"ping"}"#).await;
    assert!(!outcome.is_error);
    assert_eq!(outcome.content, "ping");

    let msg = Message::tool_result(&outcome);
    assert_eq!(msg.tool_result_invocation_id(), Some("call_1"));
}

#[tokio::test]
async fn dispatch_contains_failures_in_tool_outcome() {
    let mut registry = ToolRegistry::new();
    registry
        .register(Box::new(FlakyTool {
            failures_remaining: AtomicU32::new(2),
        }))
        .unwrap();

    let first = registry.dispatch("call_1", "flaky", "{}").await;
    assert!(first.is_error);
    let second = registry.dispatch("call_2", "flaky", "{}").await;
    assert!(second.is_error);
    let third = registry.dispatch("call_3", "flaky", "{}").await;
    assert!(!third.is_error);
    assert_eq!(third.content, "recovered");
}

// ═══════════════════════════════════════════════════════════════════════
//  Memory: compression and the transcript-validity invariant
// ═══════════════════════════════════════════════════════════════════════

struct StubSummarizer;

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(&self, _conversation_text: &str) -> Result<String> {
        Ok("summary of earlier turns".to_string())
    }
}

#[tokio::test]
async fn memory_compression_preserves_system_prompt_and_invariant() {
    let config = MemoryConfig {
        max_messages: 10,
        keep_recent: 4,
    };
    let mut memory = Memory::new(config);
    memory.append(Message::system("be helpful")).unwrap();

    // Push more than max_messages, interleaving a tool call/result pair that
    // straddles the naive split point to exercise the backward adjustment.
    for i in 0..8 {
        memory.append(Message::user(format!("turn {i}"))).unwrap();
        let invocation = ToolInvocation::new(format!("call_{i}"), "echo", "{}");
        memory
            .append(Message::assistant_with_invocations("", vec![invocation]))
            .unwrap();
        memory
            .append(Message::ToolResult {
                tool_invocation_id: format!("call_{i}"),
                tool_name: "echo".into(),
                content: "ok".into(),
                is_error: false,
            })
            .unwrap();
    }

    assert!(memory.needs_compression());
    memory.compress(&StubSummarizer).await.unwrap();

    let snapshot = memory.snapshot();
    assert!(matches!(snapshot[0], Message::System { .. }));
    assert!(
        snapshot[1].content_text().contains("summary of earlier turns"),
        "expected a synthetic summary message after the system prompt"
    );

    // No retained tool-result may reference an invocation from a summarized turn.
    let retained_invocation_ids: std::collections::HashSet<&str> = snapshot
        .iter()
        .flat_map(|m| m.tool_invocations())
        .map(|inv| inv.invocation_id.as_str())
        .collect();
    for m in snapshot {
        if let Some(id) = m.tool_result_invocation_id() {
            assert!(
                retained_invocation_ids.contains(id),
                "tool result {id} references an invocation that was summarized away"
            );
        }
    }
}

#[tokio::test]
async fn memory_append_rejects_orphaned_tool_result() {
    let mut memory = Memory::new(MemoryConfig::default());
    let result = memory.append(Message::ToolResult {
        tool_invocation_id: "call_missing".into(),
        tool_name: "echo".into(),
        content: "ok".into(),
        is_error: false,
    });
    assert!(matches!(result, Err(EngineError::MemoryInvariant { .. })));
}
