//! The `finalize` step: lifecycle callbacks, snapshot persistence, and the
//! workflow-finish transition (§4.1).
//!
//! Grounded on the teacher's `Runner::run`/`run_streamed` wrapping the whole
//! run in a `tracing` span and calling `RunHooks::on_agent_end` exactly
//! once regardless of success/failure path, and on §7's best-effort
//! telemetry policy (publish/hook failures must never mask the run's own
//! outcome).

use uuid::Uuid;

use crate::callback::hooks::{RunHooks, SharedRunHooks};
use crate::error::{AgentFlowError, FailureCause};
use crate::pubsub::Bus;
use crate::store::WorkflowStore;
use crate::workflow::events::StreamEvent;
use crate::workflow::snapshot::{Snapshot, StepResult};

/// Run the finalize step for a completed, failed, or suspended
/// [`StepResult`]: persist the final snapshot, publish the corresponding
/// terminal (or suspension) event, and invoke the matching lifecycle hook.
///
/// Hook and publish failures are logged and swallowed, never surfaced to the
/// caller — per §7, best-effort telemetry must not mask the run's actual
/// outcome, which is already captured in `result` and the persisted
/// snapshot by the time this runs.
pub async fn finalize(
    run_id: Uuid,
    sequence: u64,
    result: StepResult,
    store: &dyn WorkflowStore,
    bus: &Bus,
    hooks: &SharedRunHooks,
) -> Result<StepResult, AgentFlowError> {
    // `Suspended` is skipped here: `wrap_durable_operation`'s own persist
    // already wrote the authoritative snapshot for this result (and already
    // updated the run's status via `apply_snapshot`), so writing a second,
    // identical copy here would only waste a sequence slot.
    if !matches!(result, StepResult::Suspended { .. }) {
        let snapshot = Snapshot::new(run_id, sequence, result.clone(), None);
        store
            .append_snapshot(snapshot)
            .await
            .map_err(|err| AgentFlowError::Store(err.to_string()))?;
    }

    let event = match &result {
        StepResult::Finished { output, .. } => StreamEvent::Finished {
            output: output.clone(),
        },
        StepResult::Suspended { reason, .. } => StreamEvent::Suspended {
            reason: reason.clone(),
        },
        StepResult::Failed { error, .. } => StreamEvent::Failed {
            error: error.clone(),
        },
        StepResult::Tripped { reason, .. } => StreamEvent::Tripped {
            reason: reason.clone(),
        },
        StepResult::Continue { .. }
        | StepResult::ToolCallsRequested { .. }
        | StepResult::ToolResultsReady { .. } => {
            // Not a finalize-worthy result; publish nothing further here.
            return Ok(result);
        }
    };

    bus.publish(run_id, event).await;

    match &result {
        StepResult::Finished { state, output } => {
            hooks.on_run_finish(state, output).await;
        }
        StepResult::Failed { state, error } => {
            hooks.on_run_error(state, error).await;
        }
        _ => {}
    }

    Ok(result)
}

/// Build the durable failure envelope for an unrecoverable error, the Rust
/// equivalent of spec §4.1's `{ status: "failed", error, endedAt }` record.
#[must_use]
pub fn format_result_error(error: &AgentFlowError) -> FailureCause {
    FailureCause::new(error.to_serialized())
}
