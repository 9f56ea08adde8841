//! Durable run records: `Run`, `Snapshot`, `StepResult`, `RunStatus`.
//!
//! Grounded on `other_examples`'s `everruns-durable` prelude (`WorkflowStatus`,
//! `WorkflowEvent`) for the status/record split, and on the teacher's
//! `agent/result.rs` for the shape of a completed run's public result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::span::ExportedSpan;
use crate::usage::Usage;
use crate::workflow::state::{IterationState, ToolCall, ToolResult};

/// The lifecycle status of a run (spec §3's `RunStatus`).
///
/// REDESIGN FLAG applied: matched exhaustively everywhere, never compared by
/// string literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run has been created but not yet dispatched.
    Pending,
    /// The agentic loop is actively executing.
    Running,
    /// Execution is paused awaiting external input (tool confirmation, a
    /// signal, or a nested workflow).
    Suspended,
    /// The run finished with a final answer.
    Completed,
    /// The run terminated due to an unrecoverable error.
    Failed,
    /// A guardrail tripwire halted the run (§7 category 4).
    Tripped,
    /// The run was canceled via `workflow.cancel.{workflowId}` (§5, §6).
    Canceled,
}

impl RunStatus {
    /// Whether this status is terminal (no further steps will execute).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Tripped | Self::Canceled)
    }
}

/// The outcome of a single memoized workflow step (spec §3's `StepResult`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepResult {
    /// The step completed and the loop should continue.
    Continue {
        /// State after applying this step.
        state: IterationState,
    },
    /// The step produced tool calls that must be dispatched.
    ToolCallsRequested {
        /// State after applying this step.
        state: IterationState,
        /// The calls to dispatch.
        calls: Vec<ToolCall>,
    },
    /// A tool call fan-out completed; results are folded back into state.
    ToolResultsReady {
        /// State after folding in the results.
        state: IterationState,
        /// The results produced.
        results: Vec<ToolResult>,
    },
    /// The loop concluded with a final answer.
    Finished {
        /// Final state.
        state: IterationState,
        /// The final assistant text.
        output: String,
    },
    /// Execution is suspended and must be resumed externally.
    Suspended {
        /// State as of suspension.
        state: IterationState,
        /// Why execution paused.
        reason: String,
    },
    /// The step failed unrecoverably.
    Failed {
        /// State as of the failure, for diagnostics.
        state: IterationState,
        /// The serialized failure.
        error: crate::error::SerializedError,
    },
    /// A guardrail tripwire halted the run (§7 category 4), distinct from
    /// `Failed`: the run did what it was asked, a guardrail judged the
    /// result unsafe, and execution stopped on purpose.
    Tripped {
        /// State as of the halt, for diagnostics.
        state: IterationState,
        /// Why the tripwire fired.
        reason: String,
    },
}

impl StepResult {
    /// Borrow the `IterationState` carried by any variant.
    #[must_use]
    pub const fn state(&self) -> &IterationState {
        match self {
            Self::Continue { state }
            | Self::ToolCallsRequested { state, .. }
            | Self::ToolResultsReady { state, .. }
            | Self::Finished { state, .. }
            | Self::Suspended { state, .. }
            | Self::Failed { state, .. }
            | Self::Tripped { state, .. } => state,
        }
    }

    /// The `RunStatus` this step result implies.
    #[must_use]
    pub const fn run_status(&self) -> RunStatus {
        match self {
            Self::Continue { .. }
            | Self::ToolCallsRequested { .. }
            | Self::ToolResultsReady { .. } => RunStatus::Running,
            Self::Finished { .. } => RunStatus::Completed,
            Self::Suspended { .. } => RunStatus::Suspended,
            Self::Failed { .. } => RunStatus::Failed,
            Self::Tripped { .. } => RunStatus::Tripped,
        }
    }
}

/// A durable, point-in-time record of a run, persisted by `store::WorkflowStore`
/// after every step so replay can resume exactly where execution left off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Id of the run this snapshot belongs to.
    pub run_id: Uuid,
    /// Sequence number of this snapshot within the run, starting at 0.
    pub sequence: u64,
    /// The step result captured at this point.
    pub step_result: StepResult,
    /// The observability span covering this step, if telemetry is enabled.
    pub span: Option<ExportedSpan>,
    /// When this snapshot was written.
    pub recorded_at: DateTime<Utc>,
}

impl Snapshot {
    /// Build a new snapshot, stamping the current time.
    #[must_use]
    pub fn new(run_id: Uuid, sequence: u64, step_result: StepResult, span: Option<ExportedSpan>) -> Self {
        Self {
            run_id,
            sequence,
            step_result,
            span,
            recorded_at: Utc::now(),
        }
    }
}

/// The top-level durable record of one agentic run: identity, status, the
/// latest snapshot, and cumulative usage. This is what `facade::DurableAgent`
/// hands back from `prepare`/`observe` and what `store::WorkflowStore`
/// persists as its unit of durability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique id of this run.
    pub id: Uuid,
    /// Id of the agent that owns this run.
    pub agent_id: String,
    /// Opaque owner id (e.g. the end user or tenant this run belongs to),
    /// used only for filtering in `WorkflowStore::list_runs` (spec §6).
    pub resource_id: Option<String>,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// The state the run was prepared with, before its first step executes.
    /// Read by `facade::DurableAgent::stream` as the starting point for a
    /// run that has no snapshot yet — kept off the numbered snapshot
    /// sequence entirely (rather than seeded as snapshot 0) so it can never
    /// collide with the first real step's memoization key, which also
    /// starts at sequence 0 (see `engine::finalize`'s note on the same
    /// hazard for `Suspended` results).
    pub initial_state: Option<IterationState>,
    /// The most recently persisted snapshot, if any steps have executed.
    pub latest_snapshot: Option<Snapshot>,
    /// Usage accumulated so far.
    pub usage: Usage,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run last transitioned status.
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Create a new, pending run.
    #[must_use]
    pub fn new(id: Uuid, agent_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            agent_id: agent_id.into(),
            resource_id: None,
            status: RunStatus::Pending,
            initial_state: None,
            latest_snapshot: None,
            usage: Usage::zero(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the owner id this run belongs to, for later `list_runs` filtering.
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Attach the state this run was prepared with, read back by `stream`
    /// before any snapshot exists.
    #[must_use]
    pub fn with_initial_state(mut self, state: IterationState) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Apply a new snapshot, updating status and usage from it.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.status = snapshot.step_result.run_status();
        self.usage = snapshot.step_result.state().accumulated_usage;
        self.updated_at = Utc::now();
        self.latest_snapshot = Some(snapshot);
    }

    /// Mark this run canceled out of band, without a new snapshot. Spec §5:
    /// a `workflow.cancel.{workflowId}` event "sets the snapshot status to
    /// `canceled`" directly, independent of whatever step is in flight.
    pub fn cancel(&mut self) {
        self.status = RunStatus::Canceled;
        self.updated_at = Utc::now();
    }
}
