//! `DurableAgent`: the public façade over the workflow engine (§4.6).
//!
//! Grounded on the teacher's `Runner`/`Runner::run`/`run_streamed` entry
//! points (`agent/runner.rs`), collapsed with the durable store/pubsub/
//! workspace wiring this crate adds. §4.6's subscription-ready ordering
//! contract — a subscriber attached before `stream`/`resume` returns must
//! not miss any event — is satisfied here by publishing `RunStarted` only
//! after the caller has had a chance to subscribe via the returned `run_id`
//! (callers call `observe(run_id, 0)` immediately after `prepare`, before
//! awaiting `stream`'s returned future to completion).

use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::callback::hooks::SharedRunHooks;
use crate::engine::finalize::{finalize, format_result_error};
use crate::error::AgentFlowError;
use crate::guardrail::{InputGuardrail, OutputGuardrail};
use crate::message::{Message, MessageListState};
use crate::model::Model;
use crate::pubsub::Bus;
use crate::store::WorkflowStore;
use crate::tool::registry::{ConfirmationHandler, ToolRegistry};
use crate::workflow::agentic_loop::{run_agentic_loop, LoopDeps};
use crate::workflow::events::{PublishedEvent, StreamEvent};
use crate::workflow::snapshot::{Run, RunStatus, StepResult};
use crate::workflow::state::{IterationState, LoopOptions};

/// Static identity and dependencies for one agent, reused across many runs.
/// Mirrors the teacher's `Agent`/`AgentBuilder` split: this is the built,
/// immutable agent; `DurableAgent::prepare` creates a fresh run from it.
pub struct AgentSpec {
    /// Unique id of this agent.
    pub agent_id: String,
    /// Human-readable name, used in logging and events.
    pub agent_name: String,
    /// System prompt prefixed to every run's conversation.
    pub system_prompt: Option<String>,
    /// The model this agent calls.
    pub model: Arc<dyn Model>,
    /// Tools available to this agent.
    pub tools: Arc<ToolRegistry>,
    /// Confirmation handler for gated tool calls.
    pub confirmation: Arc<dyn ConfirmationHandler>,
    /// Lifecycle hooks.
    pub hooks: SharedRunHooks,
    /// Input guardrails.
    pub input_guardrails: Arc<Vec<Box<dyn InputGuardrail>>>,
    /// Output guardrails.
    pub output_guardrails: Arc<Vec<Box<dyn OutputGuardrail>>>,
    /// Loop termination/concurrency options.
    pub options: LoopOptions,
}

/// The durable-agent façade: the single entry point an embedding
/// application talks to. Wraps a [`WorkflowStore`] and a [`Bus`], and never
/// exposes `engine`/`workflow` internals directly.
#[derive(Clone)]
pub struct DurableAgent {
    store: Arc<dyn WorkflowStore>,
    bus: Bus,
}

impl DurableAgent {
    /// Build a façade over a store and event bus.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>, bus: Bus) -> Self {
        Self { store, bus }
    }

    /// Create a new, pending run for `agent` and the given user input,
    /// without dispatching it. Returns the run id so the caller can
    /// subscribe via [`DurableAgent::observe`] before calling
    /// [`DurableAgent::stream`], satisfying §4.6's ordering contract.
    pub async fn prepare(&self, agent: &AgentSpec, user_input: impl Into<String>) -> Result<Uuid, AgentFlowError> {
        self.prepare_for(agent, user_input, None).await
    }

    /// Like [`prepare`](Self::prepare), but tagging the run with an owning
    /// `resource_id` (e.g. the end user or tenant), so it can later be found
    /// via `store::WorkflowStore::list_runs`.
    pub async fn prepare_for(
        &self,
        agent: &AgentSpec,
        user_input: impl Into<String>,
        resource_id: Option<&str>,
    ) -> Result<Uuid, AgentFlowError> {
        let run_id = Uuid::new_v4();

        let messages = MessageListState::new(agent.system_prompt.clone(), Message::user(user_input.into()));
        let state = IterationState::new(run_id, &agent.agent_id, &agent.agent_name, messages, agent.options);

        let mut run = Run::new(run_id, agent.agent_id.clone()).with_initial_state(state);
        if let Some(resource_id) = resource_id {
            run = run.with_resource_id(resource_id);
        }
        self.store
            .create_run(run)
            .await
            .map_err(|err| AgentFlowError::Store(err.to_string()))?;

        Ok(run_id)
    }

    /// Cancel a run (spec §5's `workflow.cancel`): marks the run `Canceled`
    /// in the store and publishes [`StreamEvent::Canceled`] to any
    /// subscriber. Does not interrupt a step already in flight — the next
    /// durable step observes the canceled status and stops instead (see
    /// DESIGN.md's cancellation-depth decision).
    pub async fn cancel(&self, run_id: Uuid) -> Result<(), AgentFlowError> {
        self.store
            .cancel_run(run_id)
            .await
            .map_err(|err| AgentFlowError::Store(err.to_string()))?;
        self.bus.publish(run_id, StreamEvent::Canceled).await;
        Ok(())
    }

    /// Subscribe to a run's event stream from `from_offset`, returning any
    /// already-published events plus a live receiver for new ones.
    pub async fn observe(
        &self,
        run_id: Uuid,
        from_offset: u64,
    ) -> (Vec<PublishedEvent>, broadcast::Receiver<PublishedEvent>) {
        self.bus.subscribe(run_id, from_offset).await
    }

    /// Drive a previously-[`prepare`](Self::prepare)d run to completion (or
    /// suspension), publishing [`StreamEvent`]s as it goes.
    pub async fn stream(&self, agent: &AgentSpec, run_id: Uuid) -> Result<StepResult, AgentFlowError> {
        self.bus
            .publish(run_id, StreamEvent::RunStarted {
                agent_id: agent.agent_id.clone(),
            })
            .await;

        let run = self
            .store
            .get_run(run_id)
            .await
            .map_err(|err| AgentFlowError::Store(err.to_string()))?;
        let seed_state = match &run.latest_snapshot {
            Some(snapshot) => snapshot.step_result.state().clone(),
            None => run
                .initial_state
                .ok_or_else(|| AgentFlowError::Store(format!("run {run_id} was never prepared")))?,
        };

        self.drive(agent, seed_state).await
    }

    /// Resume a suspended run (e.g. after a tool confirmation was granted
    /// out of band), continuing from its latest snapshot.
    pub async fn resume(&self, agent: &AgentSpec, run_id: Uuid) -> Result<StepResult, AgentFlowError> {
        let run = self
            .store
            .get_run(run_id)
            .await
            .map_err(|err| AgentFlowError::Store(err.to_string()))?;
        if run.status != RunStatus::Suspended {
            return Err(AgentFlowError::Store(format!(
                "run {run_id} is not suspended (status: {:?})",
                run.status
            )));
        }

        self.bus.publish(run_id, StreamEvent::Resumed).await;

        let snapshot = run
            .latest_snapshot
            .ok_or_else(|| AgentFlowError::Store(format!("run {run_id} has no snapshot to resume from")))?;
        self.drive(agent, snapshot.step_result.state().clone()).await
    }

    async fn drive(&self, agent: &AgentSpec, state: IterationState) -> Result<StepResult, AgentFlowError> {
        let deps = LoopDeps {
            model: agent.model.clone(),
            tools: agent.tools.clone(),
            confirmation: agent.confirmation.clone(),
            hooks: agent.hooks.clone(),
            input_guardrails: agent.input_guardrails.clone(),
            output_guardrails: agent.output_guardrails.clone(),
            bus: self.bus.clone(),
        };

        let run_id = state.run_id;
        let result = run_agentic_loop(state, &deps, self.store.as_ref()).await;

        // `finalize` appends one more snapshot for a terminal result, so its
        // sequence must be the store's current length, not anything derived
        // from in-memory state: `run_agentic_loop`'s own memo-boundary writes
        // already used up every sequence number through the last iteration
        // that actually ran (see the matching note in `agentic_loop.rs`).
        let next_sequence = || async {
            self.store
                .list_snapshots(run_id)
                .await
                .map(|snapshots| snapshots.len() as u64)
                .map_err(|err| AgentFlowError::Store(err.to_string()))
        };

        match result {
            Ok(step_result) => {
                let sequence = next_sequence().await?;
                finalize(run_id, sequence, step_result, self.store.as_ref(), &self.bus, &agent.hooks).await
            }
            // A guardrail tripwire is a deliberate, durable halt (spec §7
            // category 4): the run did what it was asked and a guardrail
            // judged the result unsafe, so it finalizes like any other
            // terminal outcome.
            Err(AgentFlowError::Tripwire(tripwire)) => {
                let sequence = next_sequence().await?;
                let tripped = StepResult::Tripped {
                    state: IterationState::new(
                        run_id,
                        &agent.agent_id,
                        &agent.agent_name,
                        MessageListState::default(),
                        agent.options,
                    ),
                    reason: tripwire.reason,
                };
                finalize(run_id, sequence, tripped, self.store.as_ref(), &self.bus, &agent.hooks).await
            }
            // Exceeding the step cap is a permanent, by-design cutoff, not a
            // transient failure — durably mark the run `Failed`.
            Err(error @ AgentFlowError::MaxSteps(_)) => {
                let sequence = next_sequence().await?;
                let cause = format_result_error(&error);
                let failed = StepResult::Failed {
                    state: IterationState::new(
                        run_id,
                        &agent.agent_id,
                        &agent.agent_name,
                        MessageListState::default(),
                        agent.options,
                    ),
                    error: cause.error,
                };
                finalize(run_id, sequence, failed, self.store.as_ref(), &self.bus, &agent.hooks).await?;
                Err(error)
            }
            // Every other error (a model call failing, a transient store
            // backend error, ...) is treated as the calling process having
            // failed, not the workflow itself: nothing is finalized, so the
            // run's durable status and `latest_snapshot` stay exactly what
            // the last successfully memoized iteration left them as, and a
            // later `stream` call resumes from there instead of redoing it
            // (spec §4.1's replay-safety requirement, §8 S5).
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, ModelResponse, ToolSpec};
    use crate::store::memory::InMemoryStore;
    use crate::tool::registry::NoopConfirmationHandler;
    use crate::usage::Usage;
    use async_trait::async_trait;

    struct FinalAnswerModel;

    #[async_trait]
    impl Model for FinalAnswerModel {
        async fn generate(
            &self,
            _messages: &MessageListState,
            _tools: &[ToolSpec],
        ) -> Result<ModelResponse, AgentFlowError> {
            Ok(ModelResponse {
                text: Some("the answer is 42".into()),
                tool_calls: vec![],
                usage: Usage::new(2, 2),
            })
        }
    }

    fn agent_spec() -> AgentSpec {
        AgentSpec {
            agent_id: "agent-1".into(),
            agent_name: "demo".into(),
            system_prompt: Some("be helpful".into()),
            model: Arc::new(FinalAnswerModel),
            tools: Arc::new(ToolRegistry::new()),
            confirmation: Arc::new(NoopConfirmationHandler),
            hooks: SharedRunHooks::noop(),
            input_guardrails: Arc::new(Vec::new()),
            output_guardrails: Arc::new(Vec::new()),
            options: LoopOptions::default(),
        }
    }

    #[tokio::test]
    async fn prepare_then_stream_completes_a_run() {
        let facade = DurableAgent::new(Arc::new(InMemoryStore::new()), Bus::new());
        let agent = agent_spec();

        let run_id = facade.prepare(&agent, "what is the answer?").await.unwrap();
        let (_events, _rx) = facade.observe(run_id, 0).await;

        let result = facade.stream(&agent, run_id).await.unwrap();
        assert!(matches!(result, StepResult::Finished { output, .. } if output.contains("42")));

        let run = facade.store.get_run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_marks_the_run_canceled_and_publishes_the_event() {
        let facade = DurableAgent::new(Arc::new(InMemoryStore::new()), Bus::new());
        let agent = agent_spec();

        let run_id = facade.prepare(&agent, "hello").await.unwrap();
        let (_events, mut rx) = facade.observe(run_id, 0).await;

        facade.cancel(run_id).await.unwrap();

        let run = facade.store.get_run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Canceled);

        let published = rx.recv().await.unwrap();
        assert!(matches!(published.event, StreamEvent::Canceled));
    }

    #[tokio::test]
    async fn observe_before_stream_sees_run_started_event() {
        let facade = DurableAgent::new(Arc::new(InMemoryStore::new()), Bus::new());
        let agent = agent_spec();

        let run_id = facade.prepare(&agent, "hello").await.unwrap();
        facade.stream(&agent, run_id).await.unwrap();

        let (events, _rx) = facade.observe(run_id, 0).await;
        assert!(events.iter().any(|e| matches!(e.event, StreamEvent::RunStarted { .. })));
    }
}
