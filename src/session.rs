//! Session Facade: the sole public entry point for driving one request to
//! completion.

use crate::engine::{
    CancellationToken, EngineState, EventSink, NoopEventSink, SessionConfig, StepEngine,
};
use crate::error::Result;
use crate::llm::ChatCompletion;
use crate::memory::{Memory, MemoryConfig};
use crate::message::Message;
use crate::tools::ToolRegistry;

/// A single agent session: owns its memory, wraps a tool registry and LLM
/// client, and exposes `run`/`reset`.
///
/// Holds the LLM client behind `Box<dyn ChatCompletion>` rather than the
/// concrete `LlmClient` so tests can construct a session around a stub
/// transport instead of a live HTTP endpoint.
pub struct Session {
    memory: Memory,
    registry: ToolRegistry,
    llm: Box<dyn ChatCompletion>,
    config: SessionConfig,
    engine: StepEngine,
    cancel: CancellationToken,
    sink: Box<dyn EventSink>,
}

/// The result of running one request to completion.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Concatenation of per-step summaries, one per engine iteration.
    pub transcript_summary: String,
    pub final_state: EngineState,
    pub steps_used: u32,
    pub cancelled: bool,
}

impl Session {
    pub fn new(
        llm: Box<dyn ChatCompletion>,
        registry: ToolRegistry,
        config: SessionConfig,
        memory_config: MemoryConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            memory: Memory::new(memory_config),
            registry,
            llm,
            config,
            engine: StepEngine::new(),
            cancel: CancellationToken::new(),
            sink: Box::new(NoopEventSink),
        })
    }

    /// Replace the observability sink. Defaults to a no-op sink, so hosts
    /// that don't need per-step records can ignore this entirely.
    pub fn set_event_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sink = sink;
    }

    /// A handle the host can use to cancel an in-flight [`Self::run`] from
    /// another task (e.g. a signal handler). Cancellation is cooperative:
    /// the engine finishes its current atomic step before honoring it.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the engine to completion against a fresh user request.
    ///
    /// Errors originating from lower layers propagate after the transcript
    /// has been finalized (the session's memory still reflects everything
    /// that happened up to the failure).
    pub async fn run(&mut self, request: impl Into<String>) -> Result<SessionOutcome> {
        self.memory.append(Message::user(request.into()))?;

        let outcome = self
            .engine
            .run(
                &mut self.memory,
                &self.registry,
                &self.llm,
                &self.config,
                &self.cancel,
                self.sink.as_ref(),
            )
            .await?;

        Ok(SessionOutcome {
            transcript_summary: outcome.step_summaries.join("\n"),
            final_state: outcome.final_state,
            steps_used: outcome.steps_used,
            cancelled: outcome.cancelled,
        })
    }

    /// Empty memory and reset engine state, preserving config and registry.
    /// Also issues a fresh cancellation token, since the previous one may
    /// have already been tripped by the run this call is superseding.
    pub fn reset(&mut self, memory_config: MemoryConfig) {
        self.memory = Memory::new(memory_config);
        self.engine.reset();
        self.cancel = CancellationToken::new();
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn transcript(&self) -> &[Message] {
        self.memory.snapshot()
    }
}
