//! `execute_workflow_step`: dispatching a nested (sub-)workflow, with
//! fresh/resume/time-travel entry modes.
//!
//! Spec §4.4: suspend payloads travel through the same `StepResult::Suspended`
//! variant nested workflows use, and a suspended nested run can be resumed
//! independently of its parent. Time-travel re-execution reconstructs the
//! context as of an earlier step rather than replaying every step since.
//! Grounded on `everruns-durable`'s `WorkflowExecutor`/`ClaimedTask` model
//! for claiming and resuming a specific run, and on the teacher's
//! `dispatch_managed_agent` for the idea of a workflow invoking another
//! workflow-shaped unit of work as a single step.

use uuid::Uuid;

use crate::error::AgentFlowError;
use crate::store::WorkflowStore;
use crate::workflow::snapshot::{Run, Snapshot, StepResult};

/// How a nested workflow step should be entered.
#[derive(Debug, Clone, Copy)]
pub enum EntryMode {
    /// Start a brand-new run.
    Fresh,
    /// Resume an existing, suspended run from its latest snapshot.
    Resume {
        /// Id of the run to resume.
        run_id: Uuid,
    },
    /// Reconstruct context as of a specific earlier snapshot and re-execute
    /// from there, discarding any snapshots recorded after it. Used to
    /// replay "what would have happened" from a chosen point, e.g. for
    /// debugging or branching a run.
    TimeTravel {
        /// Id of the run to rewind.
        run_id: Uuid,
        /// The snapshot sequence to rewind to (inclusive).
        sequence: u64,
    },
}

/// The reconstructed starting point for a nested workflow step: either a
/// brand-new run or a specific snapshot to resume/rewind from.
pub enum StartingPoint {
    /// A fresh run with no prior snapshots.
    New,
    /// An existing run, resuming after its latest (or a rewound) snapshot.
    Existing {
        /// The run's durable record.
        run: Run,
        /// The snapshot execution should resume after.
        snapshot: Snapshot,
    },
}

/// Resolve an [`EntryMode`] into a concrete [`StartingPoint`] by reading
/// from `store`. This is read-only; it is the caller's job to then run the
/// agentic loop from the resolved point and persist new snapshots via
/// `engine::durable_op::wrap_durable_operation`.
pub async fn resolve_entry_point(
    store: &dyn WorkflowStore,
    mode: EntryMode,
) -> Result<StartingPoint, AgentFlowError> {
    match mode {
        EntryMode::Fresh => Ok(StartingPoint::New),
        EntryMode::Resume { run_id } => {
            let run = store
                .get_run(run_id)
                .await
                .map_err(|err| AgentFlowError::Store(err.to_string()))?;
            let snapshots = store
                .list_snapshots(run_id)
                .await
                .map_err(|err| AgentFlowError::Store(err.to_string()))?;
            let snapshot = snapshots
                .into_iter()
                .last()
                .ok_or_else(|| AgentFlowError::Store(format!("run {run_id} has no snapshots to resume from")))?;
            Ok(StartingPoint::Existing { run, snapshot })
        }
        EntryMode::TimeTravel { run_id, sequence } => {
            let run = store
                .get_run(run_id)
                .await
                .map_err(|err| AgentFlowError::Store(err.to_string()))?;
            let snapshot = store
                .get_snapshot(run_id, sequence)
                .await
                .map_err(|err| AgentFlowError::Store(err.to_string()))?;
            Ok(StartingPoint::Existing { run, snapshot })
        }
    }
}

/// True if a [`StepResult`] demands the nested workflow be treated as
/// suspended from the parent's point of view, i.e. the parent step itself
/// should also report [`StepResult::Suspended`] rather than continuing.
#[must_use]
pub fn propagates_suspension(result: &StepResult) -> bool {
    matches!(result, StepResult::Suspended { .. })
}
