//! Step Engine: the think/act loop and its state machine.
//!
//! Generalizes the think -> act iteration this codebase's ReAct loop already
//! performs, but diverges from it in two deliberate ways recorded in
//! `DESIGN.md`: tool invocations within one turn are dispatched sequentially
//! rather than via concurrent tasks, and a duplicate-response intervention
//! notice is prepended only once per contiguous streak rather than on every
//! detection.

use crate::error::{EngineError, Result};
use crate::llm::{ChatCompletion, LlmSummarizer, ToolChoice};
use crate::memory::Memory;
use crate::message::Message;
use crate::tools::ToolRegistry;

/// Lifecycle state of a session's Step Engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Finished,
    Errored,
}

/// Tunables for one session's engine.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_steps: u32,
    pub duplicate_threshold: u32,
    pub tool_choice: ToolChoice,
}

impl SessionConfig {
    /// Validate field-level constraints the core is responsible for; hosts
    /// construct the rest of the value themselves.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(EngineError::InvalidRequest {
                reason: "max_steps must be greater than zero".into(),
            });
        }
        if self.duplicate_threshold == 0 {
            return Err(EngineError::InvalidRequest {
                reason: "duplicate_threshold must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// Cooperative cancellation signal from the host, checked at safe step
/// boundaries (between iterations, and between individual tool dispatches
/// within one turn) rather than torn out of mid-flight work. Modeled on the
/// shutdown flag this codebase's scheduler uses for the same purpose.
#[derive(Debug, Clone)]
pub struct CancellationToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)))
    }

    /// Request cancellation. Safe to call from another task or a signal
    /// handler while `StepEngine::run` is in flight.
    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Which half of an iteration a [`StepEvent`] reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Think,
    Act,
}

/// One completed iteration, handed to a host-provided [`EventSink`]. Mirrors
/// the fields of this module's internal `tracing` events so both are
/// populated from the same data rather than maintaining two descriptions of
/// the same step.
#[derive(Debug, Clone)]
pub struct StepEvent {
    pub step_no: u32,
    pub phase: StepPhase,
    pub content_summary: String,
    pub tool_calls: Vec<String>,
    pub tool_results: Vec<String>,
    pub state_after: EngineState,
}

/// Host-facing observability sink, distinct from this crate's own `tracing`
/// instrumentation: the sink is for the host embedding the engine, `tracing`
/// is for operators of the process the engine runs inside.
pub trait EventSink: Send + Sync {
    fn on_step(&self, event: StepEvent);
}

/// Default sink for hosts that don't need one.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn on_step(&self, _event: StepEvent) {}
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            duplicate_threshold: 3,
            tool_choice: ToolChoice::Auto,
        }
    }
}

const STUCK_LOOP_NOTICE: &str =
    "Your last two responses were identical. Reconsider your approach or finish the task.";

/// The outcome of running the engine to a terminal state.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub final_state: EngineState,
    /// One entry per completed iteration, in order.
    pub step_summaries: Vec<String>,
    pub steps_used: u32,
    /// Whether the run ended because the host requested cancellation rather
    /// than reaching a natural finish or the step limit.
    pub cancelled: bool,
}

/// Drives iterations of think/act for one session. Holds only the loop's own
/// bookkeeping; the transcript lives in [`Memory`], owned by the caller.
pub struct StepEngine {
    state: EngineState,
    duplicate_streak: u32,
    notice_pending_for_streak: bool,
    required_tool_retry_used: bool,
    next_step_prompt: Option<String>,
}

impl StepEngine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Idle,
            duplicate_streak: 0,
            notice_pending_for_streak: false,
            required_tool_retry_used: false,
            next_step_prompt: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Reset loop bookkeeping so the engine can be reused for a fresh run.
    /// Does not touch memory; the caller resets that separately.
    pub fn reset(&mut self) {
        self.state = EngineState::Idle;
        self.duplicate_streak = 0;
        self.notice_pending_for_streak = false;
        self.required_tool_retry_used = false;
        self.next_step_prompt = None;
    }

    /// Run think/act iterations until a terminal state is reached, a
    /// cancellation is observed at a step boundary, or `max_steps` is hit.
    pub async fn run(
        &mut self,
        memory: &mut Memory,
        registry: &ToolRegistry,
        llm: &dyn ChatCompletion,
        config: &SessionConfig,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<EngineOutcome> {
        config.validate()?;
        self.state = EngineState::Running;
        tracing::info!(max_steps = config.max_steps, "step engine starting run");

        let mut step_summaries = Vec::new();
        let mut current_step: u32 = 0;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                tracing::info!(step = current_step, "cancellation observed at step boundary");
                cancelled = true;
                self.state = EngineState::Finished;
                break;
            }

            current_step += 1;

            if memory.needs_compression() {
                let summarizer = LlmSummarizer::new(llm);
                if let Err(e) = memory.compress(&summarizer).await {
                    tracing::warn!(error = %e, "memory compression failed, continuing uncompacted");
                }
            }

            match self.think(memory, registry, llm, config).await {
                Ok(ThinkDecision::Finish(summary)) => {
                    tracing::debug!(step = current_step, phase = ?StepPhase::Think, "turn finished without tool calls");
                    self.state = EngineState::Finished;
                    sink.on_step(StepEvent {
                        step_no: current_step,
                        phase: StepPhase::Think,
                        content_summary: summary.clone(),
                        tool_calls: Vec::new(),
                        tool_results: Vec::new(),
                        state_after: self.state,
                    });
                    step_summaries.push(summary);
                    break;
                }
                Ok(ThinkDecision::Act(invocations)) => {
                    let act_result = self.act(memory, registry, invocations, cancel).await;
                    tracing::debug!(
                        step = current_step,
                        tools = ?act_result.tool_calls,
                        cancelled = act_result.cancelled,
                        "dispatched tool invocations"
                    );
                    if act_result.became_finished {
                        self.state = EngineState::Finished;
                    } else if act_result.cancelled {
                        cancelled = true;
                        self.state = EngineState::Finished;
                    }
                    sink.on_step(StepEvent {
                        step_no: current_step,
                        phase: StepPhase::Act,
                        content_summary: act_result.summary.clone(),
                        tool_calls: act_result.tool_calls,
                        tool_results: act_result.tool_results,
                        state_after: self.state,
                    });
                    step_summaries.push(act_result.summary);
                    if act_result.became_finished || act_result.cancelled {
                        break;
                    }
                }
                Ok(ThinkDecision::RetryRequired) => {
                    step_summaries.push("model did not invoke a required tool; retrying".into());
                }
                Err(e) => {
                    tracing::warn!(step = current_step, error = %e, "step engine erroring out");
                    self.state = EngineState::Errored;
                    return Err(e);
                }
            }

            if current_step >= config.max_steps {
                let note = format!("Reached maximum steps limit ({})", config.max_steps);
                let _ = memory.append(Message::assistant_text(note.clone()));
                step_summaries.push(note);
                self.state = EngineState::Finished;
                break;
            }
        }

        tracing::info!(
            steps_used = current_step,
            final_state = ?self.state,
            cancelled,
            "step engine run complete"
        );

        Ok(EngineOutcome {
            final_state: self.state,
            step_summaries,
            steps_used: current_step,
            cancelled,
        })
    }

    async fn think(
        &mut self,
        memory: &mut Memory,
        registry: &ToolRegistry,
        llm: &dyn ChatCompletion,
        config: &SessionConfig,
    ) -> Result<ThinkDecision> {
        let mut request_messages = memory.snapshot().to_vec();
        if let Some(prompt) = self.next_step_prompt.take() {
            request_messages.push(Message::user(prompt));
        }

        let reply = llm
            .ask_with_tools(&request_messages, &registry.schemas(), config.tool_choice)
            .await?;

        let previous_assistant_content = memory
            .snapshot()
            .iter()
            .rev()
            .find(|m| m.is_assistant())
            .map(|m| m.content_text().to_string());

        let assistant_message = Message::assistant_with_invocations(
            reply.content.clone(),
            reply.tool_invocations.clone(),
        );
        memory.append(assistant_message)?;

        self.update_stuck_detection(previous_assistant_content.as_deref(), &reply.content, config);

        match config.tool_choice {
            ToolChoice::None => Ok(ThinkDecision::Finish(reply.content)),
            ToolChoice::Auto => {
                if !reply.tool_invocations.is_empty() {
                    Ok(ThinkDecision::Act(reply.tool_invocations))
                } else {
                    Ok(ThinkDecision::Finish(reply.content))
                }
            }
            ToolChoice::Required => {
                if !reply.tool_invocations.is_empty() {
                    self.required_tool_retry_used = false;
                    Ok(ThinkDecision::Act(reply.tool_invocations))
                } else if !self.required_tool_retry_used {
                    self.required_tool_retry_used = true;
                    self.next_step_prompt = Some(
                        "You must invoke one of the available tools to continue.".to_string(),
                    );
                    Ok(ThinkDecision::RetryRequired)
                } else {
                    Err(EngineError::RequiredToolMissing { attempts: 2 })
                }
            }
        }
    }

    fn update_stuck_detection(
        &mut self,
        previous_content: Option<&str>,
        current_content: &str,
        config: &SessionConfig,
    ) {
        let is_duplicate = previous_content == Some(current_content);
        if is_duplicate {
            self.duplicate_streak += 1;
            if self.duplicate_streak >= config.duplicate_threshold && !self.notice_pending_for_streak
            {
                self.notice_pending_for_streak = true;
                let augmented = match self.next_step_prompt.take() {
                    Some(existing) => format!("{STUCK_LOOP_NOTICE}\n{existing}"),
                    None => STUCK_LOOP_NOTICE.to_string(),
                };
                self.next_step_prompt = Some(augmented);
            }
        } else {
            self.duplicate_streak = 0;
            self.notice_pending_for_streak = false;
        }
    }

    /// Dispatch invocations from one assistant turn, in order, stopping
    /// after the current tool execution if cancellation is observed -- each
    /// dispatch is one atomic step, so a request to cancel never aborts one
    /// mid-flight, only skips the ones that would follow it.
    async fn act(
        &self,
        memory: &mut Memory,
        registry: &ToolRegistry,
        invocations: Vec<crate::message::ToolInvocation>,
        cancel: &CancellationToken,
    ) -> ActResult {
        let mut became_finished = false;
        let mut cancelled = false;
        let mut tool_calls = Vec::with_capacity(invocations.len());
        let mut tool_results = Vec::with_capacity(invocations.len());

        for invocation in invocations {
            tool_calls.push(invocation.tool_name.clone());
            let outcome = registry
                .dispatch(
                    &invocation.invocation_id,
                    &invocation.tool_name,
                    &invocation.raw_arguments,
                )
                .await;

            let is_terminal_success =
                !outcome.is_error && registry.is_terminal(&invocation.tool_name);

            tool_results.push(outcome.content.clone());
            let _ = memory.append(Message::tool_result(&outcome));

            if is_terminal_success {
                became_finished = true;
            }

            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
        }

        ActResult {
            summary: format!("invoked: {}", tool_calls.join(", ")),
            became_finished,
            cancelled,
            tool_calls,
            tool_results,
        }
    }
}

struct ActResult {
    summary: String,
    became_finished: bool,
    cancelled: bool,
    tool_calls: Vec<String>,
    tool_results: Vec<String>,
}

impl Default for StepEngine {
    fn default() -> Self {
        Self::new()
    }
}

enum ThinkDecision {
    Finish(String),
    Act(Vec<crate::message::ToolInvocation>),
    RetryRequired,
}
