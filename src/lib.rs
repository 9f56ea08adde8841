//! A durable execution engine for long-running, resumable agentic
//! tool-calling loops.
//!
//! An agent run is a do-while loop: call a model, optionally fan out the
//! tool calls it requests, fold the results back into the conversation, and
//! repeat until a final answer, a suspension, or the step cap. What this
//! crate adds over an in-process agent loop is durability: every step is
//! memoized against a [`store::WorkflowStore`], so a process restart mid-run
//! resumes exactly where it left off rather than replaying side effects or
//! losing the run entirely.
//!
//! Start at [`facade::DurableAgent`]: `prepare` a run, `observe` its event
//! stream, then `stream` it to completion (or `resume` it later if it
//! suspended).

pub mod callback;
pub mod engine;
pub mod error;
pub mod facade;
pub mod guardrail;
pub mod message;
pub mod model;
pub mod pubsub;
pub mod span;
pub mod store;
pub mod tool;
pub mod usage;
pub mod util;
pub mod workflow;
pub mod workspace;

/// Common imports for embedding applications.
pub mod prelude {
    pub use crate::callback::hooks::{NoopHooks, RunHooks, SharedRunHooks};
    pub use crate::engine::{execute_step_with_retry, wrap_durable_operation, DurableContext, RetryPolicy};
    pub use crate::error::{AgentFlowError, SerializedError, ToolError, Tripwire};
    pub use crate::facade::{AgentSpec, DurableAgent};
    pub use crate::guardrail::{GuardrailVerdict, InputGuardrail, OutputGuardrail};
    pub use crate::message::{Message, MessageListState};
    pub use crate::model::{Chunk, Model, ModelResponse, ToolSpec};
    pub use crate::pubsub::Bus;
    pub use crate::store::memory::InMemoryStore;
    pub use crate::store::{ListRunsQuery, RunPage, WorkflowStore};
    pub use crate::tool::registry::{
        ConfirmationHandler, NoopConfirmationHandler, ToolDefinition, ToolExecutionPolicy, ToolHandler,
        ToolRegistry,
    };
    pub use crate::usage::Usage;
    pub use crate::workflow::{IterationState, LoopOptions, Run, RunStatus, Snapshot, StepResult, StreamEvent, ToolCall, ToolResult};
    pub use crate::workspace::{tools::register_all as register_workspace_tools, WorkspaceConfig, WorkspaceContext};
}
