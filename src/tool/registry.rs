//! Tool registration, execution policy, and confirmation gating.
//!
//! Grounded on the teacher's `tools/tool.rs` (`ToolDefinition` with a
//! builder for JSON-Schema parameters) and the dispatch/policy split implied
//! by `agent/runner.rs::seek_confirmations`, restated here as an explicit
//! `ToolExecutionPolicy` enum per §4.7's `requireApproval` flag (see
//! SPEC_FULL.md §2).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::model::ToolSpec;
use crate::workflow::state::ToolCall;

/// A tool's static definition: name, description, and JSON-Schema
/// parameters, following the teacher's `ToolDefinition` builder shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Build a tool definition from a name, description, and schema.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Convert to the wire form the model sees.
    #[must_use]
    pub fn to_tool_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// How a tool's execution is gated.
///
/// Mirrors the teacher's auto/confirm/forbidden tri-state, giving §4.7's
/// `requireApproval` config flag a concrete per-tool enforcement path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolExecutionPolicy {
    /// Runs immediately, no gating.
    Auto,
    /// Must be confirmed by a [`ConfirmationHandler`] before running.
    RequireConfirmation,
    /// Never runs; calls are reported back as an error result.
    Forbidden,
}

/// Implemented by a tool to actually perform its work. Kept separate from
/// [`ToolDefinition`] so the same definition can be swapped to a different
/// handler in tests (the teacher's `ToolDyn` split serves the same purpose).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with the given (already-validated) arguments.
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// Asked whether a gated tool call may proceed. The façade wires this to
/// whatever human-in-the-loop channel the embedding application uses;
/// [`NoopConfirmationHandler`] always denies, which is the safe default for
/// a headless run with no confirmation channel attached.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    /// Returns true if the call is approved to run.
    async fn confirm(&self, call: &ToolCall) -> bool;
}

/// A [`ConfirmationHandler`] that always denies, used when nothing wires up
/// a real confirmation channel.
pub struct NoopConfirmationHandler;

#[async_trait]
impl ConfirmationHandler for NoopConfirmationHandler {
    async fn confirm(&self, _call: &ToolCall) -> bool {
        false
    }
}

struct RegisteredTool {
    definition: ToolDefinition,
    policy: ToolExecutionPolicy,
    handler: Arc<dyn ToolHandler>,
}

/// A collection of registered tools, their policies, and their handlers.
///
/// Grounded on the teacher's `ToolSet`/`AgentBuilder::tool(...)` pattern
/// (`agent/builder.rs`), simplified to a plain `HashMap` since this crate
/// has no RAG/embedding-based tool selection (an explicit Non-goal).
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with its policy and handler.
    pub fn register(
        &mut self,
        definition: ToolDefinition,
        policy: ToolExecutionPolicy,
        handler: Arc<dyn ToolHandler>,
    ) {
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                policy,
                handler,
            },
        );
    }

    /// Override a previously-registered tool's policy.
    pub fn set_policy(&mut self, name: &str, policy: ToolExecutionPolicy) {
        if let Some(tool) = self.tools.get_mut(name) {
            tool.policy = policy;
        }
    }

    /// The policy for a tool name, defaulting to [`ToolExecutionPolicy::Forbidden`]
    /// for anything unregistered (fail closed).
    #[must_use]
    pub fn policy(&self, name: &str) -> ToolExecutionPolicy {
        self.tools
            .get(name)
            .map_or(ToolExecutionPolicy::Forbidden, |tool| tool.policy)
    }

    /// All tool specs, for inclusion in a model request.
    #[must_use]
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.definition.to_tool_spec()).collect()
    }

    /// Dispatch a call to its registered handler.
    ///
    /// # Errors
    /// Returns [`ToolError::UnknownTool`] if no tool is registered under
    /// `call.tool_name`, or whatever error the handler itself raises.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(&call.tool_name)
            .ok_or_else(|| ToolError::UnknownTool(call.tool_name.clone()))?;
        tool.handler.call(call.args.clone()).await
    }

    /// Validate that `args` is a JSON object, the minimal shape check every
    /// tool needs before schema-specific validation.
    ///
    /// # Errors
    /// Returns [`ToolError::InvalidArgs`] if `args` is not a JSON object.
    pub fn validate_object_args(tool_name: &str, args: &Value) -> Result<&Map<String, Value>, ToolError> {
        args.as_object().ok_or_else(|| ToolError::InvalidArgs {
            tool: tool_name.to_string(),
            message: "arguments must be a JSON object".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn call(&self, args: Value) -> Result<Value, ToolError> {
            Ok(args)
        }
    }

    #[tokio::test]
    async fn unregistered_tool_is_forbidden_by_default() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.policy("missing"), ToolExecutionPolicy::Forbidden);
    }

    #[tokio::test]
    async fn dispatch_routes_to_handler() {
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolDefinition::new("echo", "echoes", json!({"type": "object"})),
            ToolExecutionPolicy::Auto,
            Arc::new(EchoTool),
        );
        let call = ToolCall::new("echo", json!({"x": 1}));
        let result = registry.dispatch(&call).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_errors() {
        let registry = ToolRegistry::new();
        let call = ToolCall::new("missing", json!({}));
        assert!(matches!(
            registry.dispatch(&call).await,
            Err(ToolError::UnknownTool(_))
        ));
    }
}
