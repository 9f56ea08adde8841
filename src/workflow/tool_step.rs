//! The tool-call step contract (§4.4): fan-out execution, suspend/resume.
//!
//! Grounded on the teacher's `agent/runner.rs::execute_tool_calls` (chunked
//! `futures::future::join_all` fan-out) and `execute_single_tool` (per-call
//! `info_span!("tool", ...)`), and on §4.4's suspend/resume semantics for
//! tool calls gated by [`ToolExecutionPolicy::RequireConfirmation`].

use futures::future::join_all;
use tracing::instrument;

use crate::callback::hooks::{RunHooks, SharedRunHooks};
use crate::error::AgentFlowError;
use crate::message::Message;
use crate::tool::registry::{ConfirmationHandler, ToolExecutionPolicy, ToolRegistry};
use crate::workflow::state::{IterationState, StepKind, ToolCall, ToolResult};

/// The outcome of a tool-call fan-out: either every call ran (possibly with
/// per-call errors captured in `ToolResult`) or the whole fan-out is
/// suspended awaiting confirmation for at least one call.
#[derive(Debug)]
pub enum ToolStepOutcome {
    /// All calls ran; results are ready to fold back into the conversation.
    Completed(Vec<ToolResult>),
    /// At least one call needs confirmation before it can run. The step
    /// persists this as `StepResult::Suspended` and returns control to the
    /// caller (§4.4's suspend/resume semantics).
    Suspended {
        /// Calls still awaiting confirmation.
        pending: Vec<ToolCall>,
    },
}

/// Execute a batch of tool calls, respecting each tool's [`ToolExecutionPolicy`]
/// and the run's `max_tool_concurrency`. Calls are chunked and each chunk is
/// run concurrently via `join_all`, mirroring the teacher's fan-out.
#[instrument(skip(registry, confirmation, hooks, calls), fields(run_id = %state.run_id, call_count = calls.len()))]
pub async fn execute_tool_calls(
    mut state: IterationState,
    calls: Vec<ToolCall>,
    registry: &ToolRegistry,
    confirmation: &dyn ConfirmationHandler,
    hooks: &SharedRunHooks,
) -> Result<(IterationState, ToolStepOutcome), AgentFlowError> {
    let mut pending = Vec::new();
    let mut runnable = Vec::new();

    for call in calls {
        match registry.policy(&call.tool_name) {
            ToolExecutionPolicy::Forbidden => {
                runnable.push((
                    call.clone(),
                    Err(format!("tool '{}' is forbidden", call.tool_name)),
                ));
            }
            ToolExecutionPolicy::RequireConfirmation => {
                if confirmation.confirm(&call).await {
                    runnable.push((call, Ok(())));
                } else {
                    pending.push(call);
                }
            }
            ToolExecutionPolicy::Auto => runnable.push((call, Ok(()))),
        }
    }

    if !pending.is_empty() {
        return Ok((state, ToolStepOutcome::Suspended { pending }));
    }

    let chunk_size = state.options.max_tool_concurrency.unwrap_or(runnable.len().max(1));
    let mut results = Vec::with_capacity(runnable.len());

    for chunk in runnable.chunks(chunk_size) {
        let futures = chunk.iter().map(|(call, precheck)| {
            execute_single_tool(call.clone(), precheck.clone(), registry, hooks)
        });
        results.extend(join_all(futures).await);
    }

    for result in &results {
        state
            .message_list_state
            .push(Message::tool(result.tool_call_id.clone(), result.as_model_text()));
    }
    state.record_step(StepKind::ToolExecution);

    Ok((state, ToolStepOutcome::Completed(results)))
}

/// Execute a single tool call inside its own span, matching the teacher's
/// `execute_single_tool`'s per-call `info_span!("tool", name = ..., id = ...)`.
#[instrument(skip(registry, hooks, precheck), fields(tool_name = %call.tool_name, tool_call_id = %call.tool_call_id))]
async fn execute_single_tool(
    call: ToolCall,
    precheck: Result<(), String>,
    registry: &ToolRegistry,
    hooks: &SharedRunHooks,
) -> ToolResult {
    if let Err(message) = precheck {
        return ToolResult::err(call.tool_call_id, call.tool_name, message);
    }

    hooks.on_tool_start(&call).await;

    let result = match registry.dispatch(&call).await {
        Ok(value) => ToolResult::ok(call.tool_call_id.clone(), call.tool_name.clone(), value),
        Err(err) => ToolResult::err(call.tool_call_id.clone(), call.tool_name.clone(), err.to_string()),
    };

    hooks.on_tool_end(&result).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::hooks::SharedRunHooks;
    use crate::message::MessageListState;
    use crate::tool::registry::{NoopConfirmationHandler, ToolDefinition, ToolRegistry};
    use crate::workflow::state::LoopOptions;
    use async_trait::async_trait;
    use serde_json::json;
    use uuid::Uuid;

    struct EchoTool;

    #[async_trait]
    impl crate::tool::registry::ToolHandler for EchoTool {
        async fn call(&self, args: serde_json::Value) -> Result<serde_json::Value, crate::error::ToolError> {
            Ok(args)
        }
    }

    fn state() -> IterationState {
        IterationState::new(
            Uuid::new_v4(),
            "agent-1",
            "demo",
            MessageListState::new(None, Message::user("hi")),
            LoopOptions::default(),
        )
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolDefinition::new("echo", "echoes its input", json!({"type": "object"})),
            ToolExecutionPolicy::Auto,
            std::sync::Arc::new(EchoTool),
        );
        registry
    }

    #[tokio::test]
    async fn completed_calls_are_folded_into_messages() {
        let calls = vec![ToolCall::new("echo", json!({"x": 1}))];
        let (state, outcome) = execute_tool_calls(
            state(),
            calls,
            &registry(),
            &NoopConfirmationHandler,
            &SharedRunHooks::noop(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, ToolStepOutcome::Completed(results) if results.len() == 1));
        assert_eq!(state.message_list_state.messages.len(), 2);
    }

    #[tokio::test]
    async fn forbidden_tool_is_reported_as_error_result() {
        let mut registry = registry();
        registry.set_policy("echo", ToolExecutionPolicy::Forbidden);
        let calls = vec![ToolCall::new("echo", json!({}))];
        let (_, outcome) = execute_tool_calls(
            state(),
            calls,
            &registry,
            &NoopConfirmationHandler,
            &SharedRunHooks::noop(),
        )
        .await
        .unwrap();
        match outcome {
            ToolStepOutcome::Completed(results) => assert!(results[0].is_error()),
            ToolStepOutcome::Suspended { .. } => panic!("expected completion"),
        }
    }
}
