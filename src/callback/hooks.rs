//! Lifecycle hooks observing a run without altering it.
//!
//! Grounded on the teacher's `callback/hooks.rs` `RunHooks`/`AgentHooks`
//! dual-layer `#[async_trait]` traits with all-default no-op methods, and
//! `BoxedRunHooks`/`SharedRunHooks` aliases, collapsed here to the single
//! `RunHooks` layer this crate needs (there is no managed-agent/handoff
//! concept, so the teacher's per-agent `AgentHooks` split is not carried).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SerializedError;
use crate::workflow::state::{IterationState, ToolCall, ToolResult};

/// Observes a run's lifecycle. Every method defaults to a no-op so
/// implementors only override what they care about, matching the teacher's
/// `RunHooks` trait.
#[async_trait]
pub trait RunHooks: Send + Sync {
    /// Called once before the first loop iteration.
    async fn on_run_start(&self, _state: &IterationState) {}

    /// Called before each LLM call.
    async fn on_llm_start(&self, _state: &IterationState) {}

    /// Called after each LLM call completes.
    async fn on_llm_end(&self, _state: &IterationState) {}

    /// Called before a tool call is dispatched.
    async fn on_tool_start(&self, _call: &ToolCall) {}

    /// Called after a tool call completes, successfully or not.
    async fn on_tool_end(&self, _result: &ToolResult) {}

    /// Called once the run reaches a terminal status successfully.
    async fn on_run_finish(&self, _state: &IterationState, _output: &str) {}

    /// Called if the run terminates with an error.
    async fn on_run_error(&self, _state: &IterationState, _error: &SerializedError) {}
}

/// A [`RunHooks`] implementation that does nothing, used when no caller
/// supplies hooks.
pub struct NoopHooks;

#[async_trait]
impl RunHooks for NoopHooks {}

/// A boxed, shareable handle to a [`RunHooks`] implementation, threaded
/// through the workflow modules the way the teacher threads
/// `BoxedRunHooks`/`SharedRunHooks` through `RunState`.
#[derive(Clone)]
pub struct SharedRunHooks(Arc<dyn RunHooks>);

impl SharedRunHooks {
    /// Wrap any `RunHooks` implementation for sharing across the loop.
    #[must_use]
    pub fn new(hooks: Arc<dyn RunHooks>) -> Self {
        Self(hooks)
    }

    /// The default no-op hooks.
    #[must_use]
    pub fn noop() -> Self {
        Self(Arc::new(NoopHooks))
    }
}

#[async_trait]
impl RunHooks for SharedRunHooks {
    async fn on_run_start(&self, state: &IterationState) {
        self.0.on_run_start(state).await;
    }

    async fn on_llm_start(&self, state: &IterationState) {
        self.0.on_llm_start(state).await;
    }

    async fn on_llm_end(&self, state: &IterationState) {
        self.0.on_llm_end(state).await;
    }

    async fn on_tool_start(&self, call: &ToolCall) {
        self.0.on_tool_start(call).await;
    }

    async fn on_tool_end(&self, result: &ToolResult) {
        self.0.on_tool_end(result).await;
    }

    async fn on_run_finish(&self, state: &IterationState, output: &str) {
        self.0.on_run_finish(state, output).await;
    }

    async fn on_run_error(&self, state: &IterationState, error: &SerializedError) {
        self.0.on_run_error(state, error).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, MessageListState};
    use crate::workflow::state::LoopOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingHooks {
        tool_starts: AtomicUsize,
    }

    #[async_trait]
    impl RunHooks for CountingHooks {
        async fn on_tool_start(&self, _call: &ToolCall) {
            self.tool_starts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn shared_hooks_delegate_to_inner() {
        let hooks = SharedRunHooks::new(Arc::new(CountingHooks {
            tool_starts: AtomicUsize::new(0),
        }));
        let call = ToolCall::new("echo", serde_json::json!({}));
        hooks.on_tool_start(&call).await;
        hooks.on_tool_start(&call).await;

        let state = IterationState::new(
            Uuid::new_v4(),
            "agent-1",
            "demo",
            MessageListState::new(None, Message::user("hi")),
            LoopOptions::default(),
        );
        hooks.on_run_start(&state).await;
    }
}
