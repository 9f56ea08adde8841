//! The outer/inner do-while agentic loop (§4.2): `AGENTIC_LOOP` drives
//! iterations until a finish signal or the step cap, dispatching each
//! iteration's work through `AGENTIC_EXECUTION`.
//!
//! Grounded on the teacher's `Runner::run_inner`'s `for step in
//! 1..=state.max_steps` do-while structure, and its tracing policy of
//! wrapping the whole run in one span with per-iteration child spans
//! (§4.2's `agent_run > model_generation > model_step`/`tool_call` shape).
//!
//! Each iteration also publishes its `StreamEvent`s (§4.5) from inside the
//! same `wrap_durable_operation` boundary that memoizes the iteration, so a
//! replayed iteration never re-publishes events a subscriber already saw.
//! `TextDelta`/`ToolCallStreamingStart`/`ToolCallDelta`/`ToolCallStreamingFinish`
//! are published per-chunk from `llm_step::execute_llm_step` as the model's
//! stream is consumed; `TextDone` still marks the iteration's assembled
//! final text once streaming completes.

use std::sync::Arc;

use tracing::instrument;

use uuid::Uuid;

use crate::callback::hooks::{RunHooks, SharedRunHooks};
use crate::engine::{wrap_durable_operation, DurableContext};
use crate::error::AgentFlowError;
use crate::guardrail::{run_input_guardrails, run_output_guardrails, InputGuardrail, OutputGuardrail};
use crate::message::Message;
use crate::model::{Model, ToolSpec};
use crate::pubsub::Bus;
use crate::span::SpanKind;
use crate::store::WorkflowStore;
use crate::tool::registry::{ConfirmationHandler, ToolRegistry};
use crate::workflow::events::StreamEvent;
use crate::workflow::llm_step::{execute_llm_step, LlmStepOutcome};
use crate::workflow::snapshot::StepResult;
use crate::workflow::state::{IterationState, ToolCall};
use crate::workflow::tool_step::{execute_tool_calls, ToolStepOutcome};

/// Everything the agentic loop needs to drive one run, bundled so
/// `AGENTIC_LOOP` doesn't carry a dozen separate parameters. Mirrors the
/// teacher's `RunState<'a>` in spirit, though ownership here is split across
/// `Arc`s since the loop runs as a free function rather than a method on a
/// borrowed struct.
pub struct LoopDeps {
    /// The model invoked for every LLM step.
    pub model: Arc<dyn Model>,
    /// Tools available to this run.
    pub tools: Arc<ToolRegistry>,
    /// Confirmation handler for gated tool calls.
    pub confirmation: Arc<dyn ConfirmationHandler>,
    /// Lifecycle hooks.
    pub hooks: SharedRunHooks,
    /// Input guardrails, run before every LLM step.
    pub input_guardrails: Arc<Vec<Box<dyn InputGuardrail>>>,
    /// Output guardrails, run once a final answer is produced.
    pub output_guardrails: Arc<Vec<Box<dyn OutputGuardrail>>>,
    /// Event bus events are published to as the loop progresses (§4.5).
    /// Publishing happens inside the same `wrap_durable_operation` boundary
    /// as the rest of the iteration, so a replayed (memoized) iteration does
    /// not re-publish events a subscriber already saw.
    pub bus: Bus,
}

/// Drive the agentic loop to completion (or suspension, or a terminal
/// failure), persisting a snapshot after every step via
/// `wrap_durable_operation`. This is `AGENTIC_LOOP`: the outer do-while.
#[instrument(skip(state, deps, store), fields(run_id = %state.run_id))]
pub async fn run_agentic_loop(
    mut state: IterationState,
    deps: &LoopDeps,
    store: &dyn WorkflowStore,
) -> Result<StepResult, AgentFlowError> {
    deps.hooks.on_run_start(&state).await;

    loop {
        if state.at_max_steps() {
            return Err(AgentFlowError::MaxSteps(state.options.max_steps));
        }

        // The memoization key is the number of snapshots already persisted
        // for this run, not `state.step_index`: `step_index` counts
        // sub-steps (one per `record_step` call) and can advance by more
        // than one within a single iteration (an LLM call plus a tool
        // fan-out), while `WorkflowStore::append_snapshot` requires each
        // write's sequence to equal the store's current length exactly.
        // Deriving it from the store instead of from in-memory state also
        // means a resumed suspension gets a fresh, non-colliding sequence
        // automatically, since the suspend attempt already appended one
        // snapshot before control returned to the caller.
        let sequence = store
            .list_snapshots(state.run_id)
            .await
            .map_err(|err| AgentFlowError::Store(err.to_string()))?
            .len() as u64;
        let ctx = DurableContext {
            run_id: state.run_id,
            sequence,
            store,
        };

        let tool_specs = deps.tools.tool_specs();
        let step_result = run_single_iteration(state, &ctx, deps, &tool_specs).await?;

        match &step_result {
            StepResult::Continue { state: next } => {
                state = next.clone();
            }
            StepResult::ToolResultsReady { state: next, .. } => {
                state = next.clone();
            }
            StepResult::ToolCallsRequested { .. }
            | StepResult::Finished { .. }
            | StepResult::Suspended { .. }
            | StepResult::Failed { .. }
            | StepResult::Tripped { .. } => return Ok(step_result),
        }

        state.iteration_count += 1;
    }
}

/// `AGENTIC_EXECUTION`: a single loop iteration — one LLM step, and, if it
/// requested tool calls, the fan-out to execute them and fold results back
/// in. Wrapped in `wrap_durable_operation` so the whole iteration is
/// replay-safe as one memoized unit.
async fn run_single_iteration(
    state: IterationState,
    ctx: &DurableContext<'_>,
    deps: &LoopDeps,
    tool_specs: &[ToolSpec],
) -> Result<StepResult, AgentFlowError> {
    wrap_durable_operation(ctx, SpanKind::ModelStep, "agentic_execution", || async {
        let run_id = state.run_id;
        deps.bus
            .publish(run_id, StreamEvent::IterationStarted {
                iteration: state.iteration_count + 1,
            })
            .await;

        // A suspension for confirmation (`NeedsApproval`) leaves the model's
        // tool-call request unanswered in the conversation: the last message
        // is an assistant turn with tool calls and no folded-in results yet.
        // Resuming such a run should dispatch those calls now that a
        // confirmation decision may have changed, not ask the model again.
        if let Some(calls) = pending_tool_calls(&state) {
            return dispatch_tool_calls(state, calls, deps, run_id).await;
        }

        let guardrail_verdict = run_input_guardrails(&deps.input_guardrails, &state.message_list_state).await;
        if let Some(tripwire) = guardrail_verdict.into_tripwire() {
            return Err(AgentFlowError::from(tripwire));
        }

        deps.hooks.on_llm_start(&state).await;
        let policies: Vec<_> = deps
            .tools
            .tool_specs()
            .iter()
            .map(|spec| (spec.name.clone(), deps.tools.policy(&spec.name)))
            .collect();
        let (state, outcome) =
            execute_llm_step(state, deps.model.as_ref(), tool_specs, &policies, &deps.bus, run_id).await?;
        deps.hooks.on_llm_end(&state).await;

        match outcome {
            LlmStepOutcome::FinalOutput(text) => {
                let guardrail_verdict = run_output_guardrails(&deps.output_guardrails, &text).await;
                if let Some(tripwire) = guardrail_verdict.into_tripwire() {
                    return Err(AgentFlowError::from(tripwire));
                }
                deps.bus
                    .publish(run_id, StreamEvent::TextDone { text: text.clone() })
                    .await;
                Ok(StepResult::Finished {
                    state,
                    output: text,
                })
            }
            LlmStepOutcome::ToolCalls(calls) => dispatch_tool_calls(state, calls, deps, run_id).await,
            LlmStepOutcome::NeedsApproval(calls) => Ok(StepResult::Suspended {
                state,
                reason: format!(
                    "{} tool call(s) require confirmation before this run can continue",
                    calls.len()
                ),
            }),
        }
    })
    .await
}

/// The last message is an unanswered assistant tool-call request — i.e. this
/// state was suspended before its tool calls ran (see
/// [`LlmStepOutcome::NeedsApproval`]) and is now being resumed.
fn pending_tool_calls(state: &IterationState) -> Option<Vec<ToolCall>> {
    match state.message_list_state.messages.last()? {
        Message::Assistant { tool_calls, .. } if !tool_calls.is_empty() => Some(tool_calls.clone()),
        _ => None,
    }
}

/// Publish the tool-call lifecycle events and fan out `calls` via
/// `tool_step::execute_tool_calls`, folding their policy/confirmation outcome
/// into the next [`StepResult`].
async fn dispatch_tool_calls(
    state: IterationState,
    calls: Vec<ToolCall>,
    deps: &LoopDeps,
    run_id: Uuid,
) -> Result<StepResult, AgentFlowError> {
    deps.bus
        .publish(run_id, StreamEvent::ToolCallsRequested { calls: calls.clone() })
        .await;
    for call in &calls {
        deps.bus
            .publish(run_id, StreamEvent::ToolCallStarted {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
            })
            .await;
    }
    let (state, tool_outcome) =
        execute_tool_calls(state, calls, &deps.tools, deps.confirmation.as_ref(), &deps.hooks).await?;
    match tool_outcome {
        ToolStepOutcome::Completed(results) => {
            for result in &results {
                deps.bus
                    .publish(run_id, StreamEvent::ToolCallCompleted { result: result.clone() })
                    .await;
            }
            Ok(StepResult::Continue { state })
        }
        ToolStepOutcome::Suspended { .. } => Ok(StepResult::Suspended {
            state,
            reason: "tool call awaiting confirmation".into(),
        }),
    }
}
