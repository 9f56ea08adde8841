//! The per-run context handed to guardrails, hooks, and tool dispatch.
//!
//! Grounded on the teacher's `agent/executor.rs`/`RunState` fields that are
//! read-only from the perspective of a hook or guardrail (run id, agent
//! identity, options) as opposed to the mutable `IterationState` they
//! observe.

use uuid::Uuid;

use crate::tool::registry::ToolRegistry;
use crate::workflow::state::LoopOptions;

/// Immutable identity and configuration for a run, passed alongside the
/// mutable [`crate::workflow::state::IterationState`] to anything that needs
/// to know *which* run it's observing without being able to mutate it.
pub struct RunContext<'a> {
    /// Id of this run.
    pub run_id: Uuid,
    /// Id of the agent executing it.
    pub agent_id: &'a str,
    /// Loop termination/concurrency options.
    pub options: LoopOptions,
    /// The tool registry available to this run.
    pub tools: &'a ToolRegistry,
}

impl<'a> RunContext<'a> {
    /// Build a run context.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        agent_id: &'a str,
        options: LoopOptions,
        tools: &'a ToolRegistry,
    ) -> Self {
        Self {
            run_id,
            agent_id,
            options,
            tools,
        }
    }
}
