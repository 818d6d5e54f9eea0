//! End-to-end scenarios for the Session Facade, driven against a scripted
//! stub [`ChatCompletion`] transport so no network call is ever made.

use std::sync::Mutex;

use async_trait::async_trait;
use react_agent_core::llm::AssistantReply;
use react_agent_core::{
    ChatCompletion, EngineError, EngineState, EventSink, Message, MemoryConfig, Result, Session,
    SessionConfig, StepEvent, Tool, ToolChoice, ToolDescriptor, ToolInvocation, ToolRegistry,
};
use serde_json::{Value, json};

// ═══════════════════════════════════════════════════════════════════════
//  Stub transport: replays a scripted sequence of replies, one per call.
// ═══════════════════════════════════════════════════════════════════════

struct ScriptedLlm {
    replies: Mutex<Vec<AssistantReply>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<AssistantReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
        }
    }
}

#[async_trait]
impl ChatCompletion for ScriptedLlm {
    async fn ask_with_tools(
        &self,
        _messages: &[Message],
        _tools: &[ToolDescriptor],
        _tool_choice: ToolChoice,
    ) -> Result<AssistantReply> {
        let mut replies = self.replies.lock().unwrap();
        replies.pop().ok_or_else(|| EngineError::Transport {
            attempts: 1,
            reason: "scripted transport exhausted".into(),
        })
    }
}

fn text_reply(s: &str) -> AssistantReply {
    AssistantReply {
        content: s.to_string(),
        tool_invocations: vec![],
    }
}

fn tool_call_reply(id: &str, tool_name: &str, raw_arguments: impl Into<String>) -> AssistantReply {
    AssistantReply {
        content: String::new(),
        tool_invocations: vec![ToolInvocation::new(id, tool_name, raw_arguments)],
    }
}

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

struct FinishTool;

#[async_trait]
impl Tool for FinishTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("finish", "End the session", json!({"type": "object"})).terminal()
    }

    async fn execute(&self, _arguments: Value) -> Result<String> {
        Ok("done".into())
    }
}

fn registry_with_echo_and_finish() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register(Box::new(EchoTool)).unwrap();
    reg.register(Box::new(FinishTool)).unwrap();
    reg
}

// ═══════════════════════════════════════════════════════════════════════
//  S1 -- simple completion: one think with no tool invocations ends the run.
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn s1_simple_completion() {
    let llm = ScriptedLlm::new(vec![text_reply("The answer is 4.")]);
    let config = SessionConfig {
        max_steps: 5,
        ..SessionConfig::default()
    };
    let mut session = Session::new(
        Box::new(llm),
        registry_with_echo_and_finish(),
        config,
        MemoryConfig::default(),
    )
    .unwrap();

    let outcome = session.run("what is 2+2?").await.unwrap();
    assert_eq!(outcome.final_state, EngineState::Finished);
    assert_eq!(outcome.steps_used, 1);
    // user request + assistant reply == 2 persisted messages.
    assert_eq!(session.transcript().len(), 2);
}

// ═══════════════════════════════════════════════════════════════════════
//  S2 -- required-tool retry then failure.
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn s2_required_tool_retry_then_failure() {
    let llm = ScriptedLlm::new(vec![text_reply("thinking..."), text_reply("still thinking...")]);
    let config = SessionConfig {
        max_steps: 5,
        tool_choice: ToolChoice::Required,
        ..SessionConfig::default()
    };
    let mut session = Session::new(
        Box::new(llm),
        registry_with_echo_and_finish(),
        config,
        MemoryConfig::default(),
    )
    .unwrap();

    let result = session.run("please use a tool").await;
    assert!(matches!(
        result,
        Err(EngineError::RequiredToolMissing { attempts: 2 })
    ));
    assert_eq!(session.state(), EngineState::Errored);
}

// ═══════════════════════════════════════════════════════════════════════
//  S3 -- stuck loop: a single intervention notice per contiguous streak.
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn s3_stuck_loop_intervention() {
    // Three identical tool-call turns in a row (content empty, same
    // invocation each time) keep the loop going via the Act branch long
    // enough for the duplicate streak to cross the threshold; the fourth
    // turn is a genuine text reply that ends the run.
    let llm = ScriptedLlm::new(vec![
        tool_call_reply("call_1", "echo", json!({"text": "a"}).to_string()),
        tool_call_reply("call_2", "echo", json!({"text": "a"}).to_string()),
        tool_call_reply("call_3", "echo", json!({"text": "a"}).to_string()),
        text_reply("Done, the answer is 4."),
    ]);
    let config = SessionConfig {
        max_steps: 10,
        duplicate_threshold: 2,
        ..SessionConfig::default()
    };
    let mut session = Session::new(
        Box::new(llm),
        registry_with_echo_and_finish(),
        config,
        MemoryConfig::default(),
    )
    .unwrap();

    let outcome = session.run("solve it").await.unwrap();
    assert_eq!(outcome.final_state, EngineState::Finished);
    assert_eq!(outcome.steps_used, 4);
}

// ═══════════════════════════════════════════════════════════════════════
//  S4 -- malformed arguments recover via a tool-result error, not a crash.
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn s4_malformed_arguments_recovery() {
    let llm = ScriptedLlm::new(vec![
        tool_call_reply("call_1", "echo", "{not valid json"),
        text_reply("recovered, all done."),
    ]);
    let config = SessionConfig {
        max_steps: 5,
        ..SessionConfig::default()
    };
    let mut session = Session::new(
        Box::new(llm),
        registry_with_echo_and_finish(),
        config,
        MemoryConfig::default(),
    )
    .unwrap();

    let outcome = session.run("echo something").await.unwrap();
    assert_eq!(outcome.final_state, EngineState::Finished);

    let tool_result = session
        .transcript()
        .iter()
        .find(|m| m.is_tool_result())
        .unwrap();
    assert!(tool_result.content_text().contains("malformed arguments"));
}

// ═══════════════════════════════════════════════════════════════════════
//  S5 -- step-limit termination synthesizes a final assistant message.
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn s5_step_limit_termination() {
    let llm = ScriptedLlm::new(vec![
        // Each turn invokes the (non-terminal) echo tool, so the loop keeps
        // going via the Act branch instead of finishing early; only the
        // step-limit check ends it.
        tool_call_reply("call_a", "echo", json!({"text": "A"}).to_string()),
        tool_call_reply("call_b", "echo", json!({"text": "B"}).to_string()),
        tool_call_reply("call_c", "echo", json!({"text": "C"}).to_string()),
    ]);
    let config = SessionConfig {
        max_steps: 3,
        ..SessionConfig::default()
    };
    let mut session = Session::new(
        Box::new(llm),
        registry_with_echo_and_finish(),
        config,
        MemoryConfig::default(),
    )
    .unwrap();

    let outcome = session.run("keep exploring").await.unwrap();
    assert_eq!(outcome.final_state, EngineState::Finished);
    assert_eq!(outcome.steps_used, 3);

    let last = session.transcript().last().unwrap();
    assert!(last.content_text().contains("maximum steps"));
}

// ═══════════════════════════════════════════════════════════════════════
//  S6 -- a terminal tool ends the session only after peer invocations in
//  the same turn have all been dispatched and recorded.
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn s6_terminal_tool_with_peer_invocations() {
    let reply = AssistantReply {
        content: String::new(),
        tool_invocations: vec![
            ToolInvocation::new(
                "call_1",
                "echo",
                json!({"text": "first"}).to_string(),
            ),
            ToolInvocation::new("call_2", "finish", "{}"),
            ToolInvocation::new(
                "call_3",
                "echo",
                json!({"text": "second"}).to_string(),
            ),
        ],
    };
    let llm = ScriptedLlm::new(vec![reply]);
    let config = SessionConfig {
        max_steps: 5,
        ..SessionConfig::default()
    };
    let mut session = Session::new(
        Box::new(llm),
        registry_with_echo_and_finish(),
        config,
        MemoryConfig::default(),
    )
    .unwrap();

    let outcome = session.run("do three things").await.unwrap();
    assert_eq!(outcome.final_state, EngineState::Finished);

    let tool_results: Vec<_> = session
        .transcript()
        .iter()
        .filter(|m| m.is_tool_result())
        .collect();
    assert_eq!(tool_results.len(), 3);
    assert_eq!(
        tool_results[0].tool_result_invocation_id(),
        Some("call_1")
    );
    assert_eq!(
        tool_results[2].tool_result_invocation_id(),
        Some("call_3")
    );
}

// ═══════════════════════════════════════════════════════════════════════
//  S7 -- a cancellation observed before a step begins finishes the session
//  cleanly instead of running the step.
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn s7_cancellation_finishes_without_starting_a_step() {
    let llm = ScriptedLlm::new(vec![tool_call_reply(
        "call_1",
        "echo",
        json!({"text": "a"}).to_string(),
    )]);
    let config = SessionConfig {
        max_steps: 10,
        ..SessionConfig::default()
    };
    let mut session = Session::new(
        Box::new(llm),
        registry_with_echo_and_finish(),
        config,
        MemoryConfig::default(),
    )
    .unwrap();

    session.cancel_handle().cancel();
    let outcome = session.run("do something").await.unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.final_state, EngineState::Finished);
    assert_eq!(outcome.steps_used, 0);
}

// ═══════════════════════════════════════════════════════════════════════
//  Observability: each iteration is reported to a host-provided sink with
//  the data named in the observability contract.
// ═══════════════════════════════════════════════════════════════════════

struct RecordingSink {
    events: std::sync::Arc<Mutex<Vec<StepEvent>>>,
}

impl EventSink for RecordingSink {
    fn on_step(&self, event: StepEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[tokio::test]
async fn event_sink_receives_one_record_per_step() {
    let llm = ScriptedLlm::new(vec![
        tool_call_reply("call_1", "echo", json!({"text": "a"}).to_string()),
        text_reply("Done, the answer is 4."),
    ]);
    let config = SessionConfig {
        max_steps: 5,
        ..SessionConfig::default()
    };
    let mut session = Session::new(
        Box::new(llm),
        registry_with_echo_and_finish(),
        config,
        MemoryConfig::default(),
    )
    .unwrap();

    let events = std::sync::Arc::new(Mutex::new(Vec::new()));
    session.set_event_sink(Box::new(RecordingSink {
        events: events.clone(),
    }));

    let outcome = session.run("what is 2+2?").await.unwrap();
    assert_eq!(outcome.steps_used, 2);

    let recorded = events.lock().unwrap();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].step_no, 1);
    assert_eq!(recorded[0].tool_calls, vec!["echo".to_string()]);
    assert_eq!(recorded[1].step_no, 2);
    assert_eq!(recorded[1].state_after, EngineState::Finished);
}
