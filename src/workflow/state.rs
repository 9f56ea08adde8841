//! Per-run state threaded through the agentic loop.
//!
//! Grounded on the teacher's `agent/runner.rs` `RunState<'a>` (the struct that
//! holds every piece of mutable state for one run) and on
//! `other_examples`'s `everruns-core::step::{LoopStep, StepResult}`, which
//! supplies the `iteration`/`kind`/`result` shape spec.md §3 describes as
//! `IterationState`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::message::MessageListState;
use crate::usage::Usage;

/// A tool call requested by the model.
///
/// Spec §3: "a `ToolCall` is `{ toolCallId (opaque), toolName, args }`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque id correlating this call to its eventual [`ToolResult`].
    pub tool_call_id: String,
    /// Name of the tool to invoke, as registered in `tool::registry`.
    pub tool_name: String,
    /// Arguments, as decoded from the model's tool-call payload.
    pub args: Value,
}

impl ToolCall {
    /// Build a tool call, generating a fresh opaque id.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, args: Value) -> Self {
        Self {
            tool_call_id: Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            args,
        }
    }
}

/// The outcome of executing a single [`ToolCall`].
///
/// Spec §3: "a `ToolResult` is `{ toolCallId, toolName, result | error }`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the [`ToolCall`] this result answers.
    pub tool_call_id: String,
    /// Name of the tool that ran.
    pub tool_name: String,
    /// Outcome: exactly one of a success payload or an error message.
    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

/// The success/failure split of a [`ToolResult`], flattened into its parent
/// on the wire so JSON carries either a `result` or an `error` key, never
/// both — matching spec.md's `result | error` union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool ran to completion.
    Result {
        /// The tool's return value, serialized for model consumption.
        result: Value,
    },
    /// The tool failed; this is always captured here, never propagated as a
    /// Rust-level `Err` out of the tool step (§4.4, §7 category 3).
    Error {
        /// A human/model-readable description of the failure.
        error: String,
    },
}

impl ToolResult {
    /// Build a successful result.
    #[must_use]
    pub fn ok(tool_call_id: impl Into<String>, tool_name: impl Into<String>, result: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Result { result },
        }
    }

    /// Build a failed result.
    #[must_use]
    pub fn err(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Error {
                error: error.into(),
            },
        }
    }

    /// True if this result represents a tool failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error { .. })
    }

    /// Render the outcome as a string suitable for feeding back to the model
    /// as a `Message::Tool` turn.
    #[must_use]
    pub fn as_model_text(&self) -> String {
        match &self.outcome {
            ToolOutcome::Result { result } => {
                serde_json::to_string(result).unwrap_or_else(|_| result.to_string())
            }
            ToolOutcome::Error { error } => format!("Error: {error}"),
        }
    }
}

/// Per-iteration bookkeeping for [`IterationState::accumulated_steps`],
/// grounded on `everruns-core::step::LoopStep`'s `{ kind, result }` pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based index of the iteration this step belongs to.
    pub iteration: usize,
    /// What kind of step this was.
    pub kind: StepKind,
}

/// The kind of a single recorded step within an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// A model call that produced text and/or tool calls.
    LlmCall,
    /// A single tool invocation within the fan-out.
    ToolExecution,
    /// The loop concluded: a final answer was produced or a cap was hit.
    Finalize,
}

/// Options controlling loop termination and fan-out concurrency.
///
/// Mirrors spec.md §3's `options.maxSteps`; grounded on the teacher's
/// `AgentConfig`/`RunConfig` builder pattern (`agent/config.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopOptions {
    /// Hard cap on the number of loop iterations before forcing a stop.
    pub max_steps: usize,
    /// Maximum number of tool calls executed concurrently per iteration.
    /// `None` means unbounded (all calls in one `join_all`).
    pub max_tool_concurrency: Option<usize>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_steps: 32,
            max_tool_concurrency: None,
        }
    }
}

/// The full state of one agentic run, threaded through every loop iteration.
///
/// Spec §3: "`IterationState` (agentic loop): `runId`, `agentId`, `agentName`,
/// `messageListState` ... `iterationCount`, `accumulatedSteps` ...
/// `accumulatedUsage` ... `lastStepResult` ... plus `stepIndex`".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationState {
    /// Id of the run this state belongs to.
    pub run_id: Uuid,
    /// Id of the agent executing the run.
    pub agent_id: String,
    /// Human-readable name of the agent, for logging/events.
    pub agent_name: String,
    /// The conversation so far.
    pub message_list_state: MessageListState,
    /// Number of completed loop iterations.
    pub iteration_count: usize,
    /// Flat history of every step taken across all iterations.
    pub accumulated_steps: Vec<StepRecord>,
    /// Token usage summed across every LLM call in the run.
    pub accumulated_usage: Usage,
    /// The result of the most recently completed step, if any.
    pub last_step_result: Option<LastStepResult>,
    /// Monotonically increasing index into `accumulated_steps`, used as the
    /// replay/time-travel cursor (§4.4).
    pub step_index: usize,
    /// Loop termination/concurrency configuration for this run.
    pub options: LoopOptions,
}

/// A compact summary of the most recent step's outcome, enough for the next
/// iteration to decide whether to continue, fan out tool calls, or stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LastStepResult {
    /// The model produced a final answer; the loop should stop.
    FinalOutput {
        /// The final assistant text.
        text: String,
    },
    /// The model requested tool calls; the loop should fan out and continue.
    ToolCalls {
        /// The tool calls requested.
        calls: Vec<ToolCall>,
    },
    /// The loop is suspended awaiting external input (confirmation, signal).
    Suspended {
        /// Why execution is paused.
        reason: String,
    },
}

impl IterationState {
    /// Start fresh state for a new run.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        message_list_state: MessageListState,
        options: LoopOptions,
    ) -> Self {
        Self {
            run_id,
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            message_list_state,
            iteration_count: 0,
            accumulated_steps: Vec::new(),
            accumulated_usage: Usage::zero(),
            last_step_result: None,
            step_index: 0,
            options,
        }
    }

    /// Record a step and advance the replay cursor.
    pub fn record_step(&mut self, kind: StepKind) {
        self.accumulated_steps.push(StepRecord {
            iteration: self.iteration_count,
            kind,
        });
        self.step_index += 1;
    }

    /// True once the iteration cap has been reached.
    #[must_use]
    pub const fn at_max_steps(&self) -> bool {
        self.iteration_count >= self.options.max_steps
    }
}
