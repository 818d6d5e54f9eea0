//! Tool Registry & Dispatcher.
//!
//! Tools are registered once at session construction and thereafter only
//! read; dispatch decodes and validates the LLM's raw argument text against
//! each tool's declared JSON Schema before invoking it, following the same
//! compile-once/validate-many pattern used for auth-profile validation
//! elsewhere in this codebase.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::message::{ToolArguments, ToolOutcome};

/// Static metadata describing a tool to the LLM.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
    /// Successful execution of this tool ends the session.
    pub is_terminal: bool,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
            is_terminal: false,
        }
    }

    pub fn terminal(mut self) -> Self {
        self.is_terminal = true;
        self
    }
}

/// A tool the engine can invoke on the model's behalf.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Execute with already-decoded, schema-validated arguments.
    async fn execute(&self, arguments: ToolArguments) -> Result<String>;
}

struct RegisteredTool {
    tool: Box<dyn Tool>,
    compiled_schema: JSONSchema,
    timeout: Duration,
}

/// Holds the set of tools available to a session and mediates every
/// invocation through decode -> validate -> execute.
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, RegisteredTool>,
    default_timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            tools: HashMap::new(),
            default_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool, compiling its parameter schema once.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<()> {
        let descriptor = tool.descriptor();
        if self.tools.contains_key(&descriptor.name) {
            return Err(EngineError::DuplicateTool {
                tool_name: descriptor.name,
            });
        }

        let compiled_schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&descriptor.parameter_schema)
            .map_err(|e| EngineError::InvalidRequest {
                reason: format!(
                    "tool `{}` has an invalid parameter schema: {e}",
                    descriptor.name
                ),
            })?;

        self.order.push(descriptor.name.clone());
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                tool,
                compiled_schema,
                timeout: self.default_timeout,
            },
        );
        Ok(())
    }

    /// Descriptors in registration order, for presenting to the LLM.
    pub fn schemas(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .map(|name| self.tools[name].tool.descriptor())
            .collect()
    }

    pub fn is_terminal(&self, tool_name: &str) -> bool {
        self.tools
            .get(tool_name)
            .map(|t| t.tool.descriptor().is_terminal)
            .unwrap_or(false)
    }

    /// Decode, validate, and execute one invocation, never propagating a
    /// tool-level failure past this call: everything becomes a [`ToolOutcome`].
    pub async fn dispatch(
        &self,
        invocation_id: &str,
        tool_name: &str,
        raw_arguments: &str,
    ) -> ToolOutcome {
        let registered = match self.tools.get(tool_name) {
            Some(t) => t,
            None => {
                return error_outcome(
                    invocation_id,
                    tool_name,
                    &EngineError::UnknownTool {
                        tool_name: tool_name.to_string(),
                    },
                );
            }
        };

        let decoded: Value = match serde_json::from_str(raw_arguments) {
            Ok(v) => v,
            Err(e) => {
                return error_outcome(
                    invocation_id,
                    tool_name,
                    &EngineError::MalformedArguments {
                        tool_name: tool_name.to_string(),
                        reason: e.to_string(),
                        raw_arguments: raw_arguments.to_string(),
                    },
                );
            }
        };

        if let Err(errors) = registered.compiled_schema.validate(&decoded) {
            let reason = errors
                .map(|e| format!("{}: {e}", e.instance_path))
                .collect::<Vec<_>>()
                .join(", ");
            return error_outcome(
                invocation_id,
                tool_name,
                &EngineError::InvalidArguments {
                    tool_name: tool_name.to_string(),
                    reason,
                },
            );
        }

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(registered.timeout, registered.tool.execute(decoded)).await;

        match outcome {
            Ok(Ok(output)) => ToolOutcome {
                invocation_id: invocation_id.to_string(),
                tool_name: tool_name.to_string(),
                content: output,
                is_error: false,
            },
            Ok(Err(e)) => error_outcome(
                invocation_id,
                tool_name,
                &EngineError::ToolExecutionError {
                    tool_name: tool_name.to_string(),
                    reason: e.to_string(),
                },
            ),
            Err(_elapsed) => error_outcome(
                invocation_id,
                tool_name,
                &EngineError::ToolTimeout {
                    tool_name: tool_name.to_string(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                },
            ),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn error_outcome(invocation_id: &str, tool_name: &str, error: &EngineError) -> ToolOutcome {
    ToolOutcome {
        invocation_id: invocation_id.to_string(),
        tool_name: tool_name.to_string(),
        content: format!("Error: {error}"),
        is_error: true,
    }
}
