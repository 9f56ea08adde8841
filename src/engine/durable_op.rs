//! `wrap_durable_operation`: the memoization boundary every durable step
//! goes through.
//!
//! Spec §4.1: a workflow function must be replay-safe — re-executing it
//! after a crash must not re-run side effects that already completed.
//! Grounded on `everruns-durable`'s `ActivityContext`/`WorkflowExecutor`
//! split (activities are the unit of memoized work) and on the teacher's
//! `tracing`-spanned async boundaries (`agent/runner.rs`'s `.instrument(span)`
//! wrapping around each major phase).

use std::future::Future;

use uuid::Uuid;

use crate::error::AgentFlowError;
use crate::span::{rebuild_span, ExportedSpan, Span, SpanKind};
use crate::store::{StoreError, WorkflowStore};
use crate::workflow::snapshot::{Snapshot, StepResult};

/// Context passed to a durable operation: identifies the run and the
/// sequence number this operation would occupy if it actually executes.
pub struct DurableContext<'a> {
    /// Id of the run this operation belongs to.
    pub run_id: Uuid,
    /// The sequence number this operation will be recorded at if it runs.
    pub sequence: u64,
    /// The store snapshots are read from and appended to.
    pub store: &'a dyn WorkflowStore,
}

/// Wrap an async operation so that, if a snapshot already exists at
/// `ctx.sequence`, its recorded [`StepResult`] is returned directly without
/// re-executing `operation` (the memoization check); otherwise `operation`
/// runs, its result is persisted as a new snapshot, and that result is
/// returned. This is the single chokepoint every workflow step (`llm_step`,
/// `tool_step`, `nested::execute_workflow_step`) goes through, matching
/// spec §4.1's requirement that all durable work be memoized uniformly.
pub async fn wrap_durable_operation<F, Fut>(
    ctx: &DurableContext<'_>,
    span_kind: SpanKind,
    span_name: &str,
    operation: F,
) -> Result<StepResult, AgentFlowError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<StepResult, AgentFlowError>>,
{
    if let Ok(existing) = ctx.store.get_snapshot(ctx.run_id, ctx.sequence).await {
        tracing::debug!(
            run_id = %ctx.run_id,
            sequence = ctx.sequence,
            "replaying memoized step result without re-executing"
        );
        return Ok(existing.step_result);
    }

    let mut span = Span::new(span_kind, span_name, None);
    span.record_attribute("run_id", serde_json::Value::String(ctx.run_id.to_string()));
    span.record_attribute("sequence", serde_json::Value::from(ctx.sequence));

    let result = operation().await;

    let exported = match &result {
        Ok(step_result) => span.end(serde_json::to_value(step_result).unwrap_or_default()),
        Err(err) => span.error(&err.to_string()),
    };

    let step_result = result?;
    persist(ctx, step_result.clone(), Some(exported)).await?;
    Ok(step_result)
}

/// Persist a step result as the next snapshot, tolerating a concurrent
/// writer having already appended the same sequence (the memoization race:
/// two replays of the same step both finish `operation` and race to
/// persist — the loser's write is a benign no-op since the reader path
/// above will now find the snapshot).
async fn persist(
    ctx: &DurableContext<'_>,
    step_result: StepResult,
    span: Option<ExportedSpan>,
) -> Result<(), AgentFlowError> {
    let snapshot = Snapshot::new(ctx.run_id, ctx.sequence, step_result, span);
    match ctx.store.append_snapshot(snapshot).await {
        Ok(()) | Err(StoreError::OutOfSequence { .. }) => Ok(()),
        Err(err) => Err(AgentFlowError::Store(err.to_string())),
    }
}

/// Reopen a span previously exported for a given snapshot, used when a
/// multi-phase step needs to continue annotating a span across an `await`
/// boundary that spans a replay point.
#[must_use]
pub fn reopen_span(exported: ExportedSpan) -> Span {
    rebuild_span(exported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, MessageListState};
    use crate::store::memory::InMemoryStore;
    use crate::workflow::snapshot::Run;
    use crate::workflow::state::{IterationState, LoopOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn iteration_state(run_id: Uuid) -> IterationState {
        IterationState::new(
            run_id,
            "agent-1",
            "demo",
            MessageListState::new(None, Message::user("hi")),
            LoopOptions::default(),
        )
    }

    #[tokio::test]
    async fn replays_without_reexecuting() {
        let store = InMemoryStore::new();
        let run_id = Uuid::new_v4();
        store.create_run(Run::new(run_id, "agent-1")).await.unwrap();

        let ctx = DurableContext {
            run_id,
            sequence: 0,
            store: &store,
        };

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let state = iteration_state(run_id);

        wrap_durable_operation(&ctx, SpanKind::Internal, "test-op", || {
            let calls = calls_clone.clone();
            let state = state.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(StepResult::Finished {
                    state,
                    output: "first".into(),
                })
            }
        })
        .await
        .unwrap();

        let calls_clone = calls.clone();
        let result = wrap_durable_operation(&ctx, SpanKind::Internal, "test-op", || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                panic!("should not re-execute a memoized step");
                #[allow(unreachable_code)]
                Ok(StepResult::Finished {
                    state: iteration_state(run_id),
                    output: "second".into(),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, StepResult::Finished { output, .. } if output == "first"));
    }
}
