//! Input/output guardrails that can raise a tripwire to halt a run.
//!
//! Grounded on the teacher's `agent/runner.rs` guardrail running
//! (`run_input_guardrails`/`run_output_guardrails` triggering
//! `AgentError::input_guardrail_triggered`/`output_guardrail_triggered`),
//! restated as explicit traits per SPEC_FULL.md §2 since spec.md names the
//! terminal status but not the mechanism.

use async_trait::async_trait;

use crate::error::Tripwire;
use crate::message::MessageListState;

/// The verdict of running a single guardrail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailVerdict {
    /// The content passed; the loop continues normally.
    Passed,
    /// A tripwire was raised; the loop must halt with this reason.
    Tripped(String),
}

impl GuardrailVerdict {
    /// Convert a tripped verdict into a [`Tripwire`] error, if tripped.
    #[must_use]
    pub fn into_tripwire(self) -> Option<Tripwire> {
        match self {
            Self::Passed => None,
            Self::Tripped(reason) => Some(Tripwire::new(reason)),
        }
    }
}

/// Inspects the conversation before it is sent to the model.
#[async_trait]
pub trait InputGuardrail: Send + Sync {
    /// A name identifying this guardrail in logs and tripwire reasons.
    fn name(&self) -> &str;

    /// Whether this guardrail may run concurrently with others, matching the
    /// teacher's `is_parallel()` on its guardrail trait.
    fn is_parallel(&self) -> bool {
        true
    }

    /// Inspect the conversation, returning a verdict.
    async fn run(&self, messages: &MessageListState) -> GuardrailVerdict;
}

/// Inspects the model's final output before it is returned to the caller.
#[async_trait]
pub trait OutputGuardrail: Send + Sync {
    /// A name identifying this guardrail in logs and tripwire reasons.
    fn name(&self) -> &str;

    /// Whether this guardrail may run concurrently with others.
    fn is_parallel(&self) -> bool {
        true
    }

    /// Inspect the final output text, returning a verdict.
    async fn run(&self, output: &str) -> GuardrailVerdict;
}

/// Run every input guardrail, short-circuiting on the first tripwire found.
/// Guardrails marked `is_parallel()` run concurrently with each other; any
/// guardrail not marked parallel runs afterward, sequentially, so it can
/// observe a conversation already vetted by the parallel set.
pub async fn run_input_guardrails(
    guardrails: &[Box<dyn InputGuardrail>],
    messages: &MessageListState,
) -> GuardrailVerdict {
    let (parallel, sequential): (Vec<_>, Vec<_>) =
        guardrails.iter().partition(|guardrail| guardrail.is_parallel());

    let parallel_results =
        futures::future::join_all(parallel.iter().map(|guardrail| guardrail.run(messages))).await;
    if let Some(tripped) = parallel_results.into_iter().find(|v| *v != GuardrailVerdict::Passed) {
        return tripped;
    }

    for guardrail in sequential {
        let verdict = guardrail.run(messages).await;
        if verdict != GuardrailVerdict::Passed {
            return verdict;
        }
    }

    GuardrailVerdict::Passed
}

/// Run every output guardrail, short-circuiting on the first tripwire found.
pub async fn run_output_guardrails(
    guardrails: &[Box<dyn OutputGuardrail>],
    output: &str,
) -> GuardrailVerdict {
    let (parallel, sequential): (Vec<_>, Vec<_>) =
        guardrails.iter().partition(|guardrail| guardrail.is_parallel());

    let parallel_results =
        futures::future::join_all(parallel.iter().map(|guardrail| guardrail.run(output))).await;
    if let Some(tripped) = parallel_results.into_iter().find(|v| *v != GuardrailVerdict::Passed) {
        return tripped;
    }

    for guardrail in sequential {
        let verdict = guardrail.run(output).await;
        if verdict != GuardrailVerdict::Passed {
            return verdict;
        }
    }

    GuardrailVerdict::Passed
}
