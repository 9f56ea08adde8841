//! The LLM step contract (§4.3): calling the model, classifying its
//! response, and folding the result back into [`IterationState`].
//!
//! Grounded on the teacher's `agent/runner.rs::process_step`, which
//! classifies a model response into `NextStep::{FinalOutput, ToolCalls,
//! NeedsApproval}` — here restated as a tagged `LlmStepOutcome` and matched
//! exhaustively per the REDESIGN FLAGS.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::error::AgentFlowError;
use crate::message::Message;
use crate::model::{Chunk, Model, ModelResponse, ToolSpec};
use crate::pubsub::Bus;
use crate::tool::registry::ToolExecutionPolicy;
use crate::usage::Usage;
use crate::workflow::events::StreamEvent;
use crate::workflow::state::{IterationState, LastStepResult, StepKind, ToolCall};

/// A tool call whose arguments are still streaming in, accumulated from a
/// run of [`Chunk::ToolCallStart`]/[`Chunk::ToolCallDelta`] until
/// [`Chunk::ToolCallDone`] closes it out.
struct PendingToolCall {
    tool_call_id: String,
    tool_name: String,
    partial_json: String,
}

/// The classification of a single LLM step's result, mirroring the
/// teacher's `NextStep` enum.
#[derive(Debug, Clone)]
pub enum LlmStepOutcome {
    /// The model produced a final answer.
    FinalOutput(String),
    /// The model requested tool calls, none of which require confirmation.
    ToolCalls(Vec<ToolCall>),
    /// The model requested tool calls, at least one of which requires
    /// confirmation before it can run (§4.7's `requireApproval`).
    NeedsApproval(Vec<ToolCall>),
}

/// Run one LLM step: invoke the model's streaming interface, publishing
/// `text-delta` and the `tool-call-streaming-{start,delta,finish}` trio to
/// `bus` as chunks arrive (§4.3), then classify the assembled response and
/// append an assistant message to the conversation. Returns the updated
/// state and the classified outcome.
///
/// Called from inside the iteration's `wrap_durable_operation` boundary, so
/// every publish here only happens on first execution — a replayed
/// iteration never re-streams.
///
/// The span covering this call is opened by the caller (`agentic_loop`) per
/// §4.2's tracing policy (`model_generation > model_step`); this function
/// only records fields on `tracing::Span::current()`.
#[instrument(skip(model, tool_specs, policies, bus), fields(run_id = %state.run_id, iteration = state.iteration_count))]
pub async fn execute_llm_step(
    mut state: IterationState,
    model: &dyn Model,
    tool_specs: &[ToolSpec],
    policies: &[(String, ToolExecutionPolicy)],
    bus: &Bus,
    run_id: Uuid,
) -> Result<(IterationState, LlmStepOutcome), AgentFlowError> {
    let response = stream_llm_response(model, &state.message_list_state, tool_specs, bus, run_id).await?;

    state.accumulated_usage += response.usage;
    tracing::Span::current().record("usage_total", response.usage.total_tokens);

    let outcome = classify_response(&response, policies);

    state.message_list_state.push(Message::assistant_tool_calls(
        response.text.clone(),
        response.tool_calls.clone(),
    ));
    state.record_step(StepKind::LlmCall);

    state.last_step_result = Some(match &outcome {
        LlmStepOutcome::FinalOutput(text) => LastStepResult::FinalOutput { text: text.clone() },
        LlmStepOutcome::ToolCalls(calls) | LlmStepOutcome::NeedsApproval(calls) => {
            LastStepResult::ToolCalls {
                calls: calls.clone(),
            }
        }
    });

    Ok((state, outcome))
}

/// Drive `model.stream(...)` to completion, publishing each chunk's
/// `StreamEvent` to `bus` and assembling the final [`ModelResponse`] from
/// the stream rather than a separate `generate()` call.
async fn stream_llm_response(
    model: &dyn Model,
    messages: &crate::message::MessageListState,
    tool_specs: &[ToolSpec],
    bus: &Bus,
    run_id: Uuid,
) -> Result<ModelResponse, AgentFlowError> {
    let mut chunks = model.stream(messages, tool_specs).await?;

    let mut text = String::new();
    let mut pending_calls: HashMap<usize, PendingToolCall> = HashMap::new();
    let mut tool_calls = Vec::new();
    let mut usage = Usage::zero();

    while let Some(chunk) = chunks.next().await {
        match chunk {
            Chunk::Text(delta) => {
                text.push_str(&delta);
                bus.publish(run_id, StreamEvent::TextDelta { delta }).await;
            }
            Chunk::ToolCallStart { index, id, name } => {
                bus.publish(run_id, StreamEvent::ToolCallStreamingStart {
                    tool_call_id: id.clone(),
                    tool_name: name.clone(),
                })
                .await;
                pending_calls.insert(
                    index,
                    PendingToolCall {
                        tool_call_id: id,
                        tool_name: name,
                        partial_json: String::new(),
                    },
                );
            }
            Chunk::ToolCallDelta { index, partial_json } => {
                if let Some(call) = pending_calls.get_mut(&index) {
                    call.partial_json.push_str(&partial_json);
                    bus.publish(run_id, StreamEvent::ToolCallDelta {
                        tool_call_id: call.tool_call_id.clone(),
                        partial_json,
                    })
                    .await;
                }
            }
            Chunk::ToolCallDone { index } => {
                if let Some(call) = pending_calls.remove(&index) {
                    bus.publish(run_id, StreamEvent::ToolCallStreamingFinish {
                        tool_call_id: call.tool_call_id.clone(),
                    })
                    .await;
                    let args: Value = serde_json::from_str(&call.partial_json).unwrap_or(Value::Null);
                    tool_calls.push(ToolCall {
                        tool_call_id: call.tool_call_id,
                        tool_name: call.tool_name,
                        args,
                    });
                }
            }
            Chunk::Usage(recorded) => usage = recorded,
            Chunk::Done => {}
        }
    }

    Ok(ModelResponse {
        text: if text.is_empty() { None } else { Some(text) },
        tool_calls,
        usage,
    })
}

/// Classify a raw model response into an [`LlmStepOutcome`], consulting
/// execution policies to decide whether confirmation is required before any
/// dispatched tool call can run.
fn classify_response(
    response: &ModelResponse,
    policies: &[(String, ToolExecutionPolicy)],
) -> LlmStepOutcome {
    if !response.requested_tool_calls() {
        return LlmStepOutcome::FinalOutput(response.text.clone().unwrap_or_default());
    }

    let needs_approval = response.tool_calls.iter().any(|call| {
        policies
            .iter()
            .find(|(name, _)| name == &call.tool_name)
            .is_some_and(|(_, policy)| matches!(policy, ToolExecutionPolicy::RequireConfirmation))
    });

    if needs_approval {
        LlmStepOutcome::NeedsApproval(response.tool_calls.clone())
    } else {
        LlmStepOutcome::ToolCalls(response.tool_calls.clone())
    }
}

/// Helper for callers that already hold an `Arc<dyn Model>`, avoiding an
/// extra reborrow at call sites (the teacher's runner threads `Arc<dyn
/// CompletionModel>` through `RunState` the same way).
pub async fn execute_llm_step_arc(
    state: IterationState,
    model: &Arc<dyn Model>,
    tool_specs: &[ToolSpec],
    policies: &[(String, ToolExecutionPolicy)],
    bus: &Bus,
    run_id: Uuid,
) -> Result<(IterationState, LlmStepOutcome), AgentFlowError> {
    execute_llm_step(state, model.as_ref(), tool_specs, policies, bus, run_id).await
}
