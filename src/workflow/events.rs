//! `StreamEvent`: the tagged union published over `pubsub` and yielded by
//! `facade::DurableAgent::stream`/`observe`.
//!
//! Grounded on the teacher's `stream::StreamChunk` (`#[serde(tag = "type",
//! rename_all = "snake_case")] #[non_exhaustive]` with constructor methods)
//! and extended with the run-lifecycle variants spec §3/§4.5 require for a
//! durable, replayable stream rather than an in-process one.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SerializedError;
use crate::usage::Usage;
use crate::workflow::state::{ToolCall, ToolResult};

/// A single event in a run's observable stream.
///
/// Every variant carries `run_id` implicitly via the channel it is published
/// on (`pubsub::channel` keys by run id), so it is not repeated per event.
/// Tagged and `#[non_exhaustive]` per the teacher's `StreamChunk`, so adding
/// a variant later does not break downstream exhaustive matches outside this
/// crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum StreamEvent {
    /// The run was created and dispatched.
    RunStarted {
        /// Id of the agent executing the run.
        agent_id: String,
    },
    /// A new loop iteration began.
    IterationStarted {
        /// 1-based iteration number.
        iteration: usize,
    },
    /// Incremental text from the model, as it streams.
    TextDelta {
        /// The text fragment.
        delta: String,
    },
    /// The model's full text for this iteration is final.
    TextDone {
        /// The complete text for this iteration.
        text: String,
    },
    /// The model requested one or more tool calls.
    ToolCallsRequested {
        /// The calls requested.
        calls: Vec<ToolCall>,
    },
    /// The model began streaming a tool call's arguments. Emitted once per
    /// call, before any [`StreamEvent::ToolCallDelta`] for it.
    ToolCallStreamingStart {
        /// Opaque id for this call.
        tool_call_id: String,
        /// Name of the tool being called.
        tool_name: String,
    },
    /// An incremental fragment of a tool call's argument JSON, as the model
    /// streams it.
    ToolCallDelta {
        /// Id of the call this fragment belongs to.
        tool_call_id: String,
        /// Partial JSON text.
        partial_json: String,
    },
    /// A tool call's arguments finished streaming (the model has committed
    /// to this call; execution has not necessarily started yet).
    ToolCallStreamingFinish {
        /// Id of the call that finished streaming.
        tool_call_id: String,
    },
    /// A single tool call started executing.
    ToolCallStarted {
        /// Id of the call that started.
        tool_call_id: String,
        /// Name of the tool.
        tool_name: String,
    },
    /// A single tool call finished.
    ToolCallCompleted {
        /// The result.
        result: ToolResult,
    },
    /// Usage was recorded for an LLM call.
    UsageRecorded {
        /// Usage for this call (not cumulative).
        usage: Usage,
    },
    /// Execution suspended awaiting external input.
    Suspended {
        /// Why execution paused.
        reason: String,
    },
    /// Execution resumed after a suspension.
    Resumed,
    /// The run was canceled via an external `workflow.cancel` event (§5).
    Canceled,
    /// The run finished with a final answer.
    Finished {
        /// The final assistant text.
        output: String,
    },
    /// The run failed.
    Failed {
        /// The serialized failure.
        error: SerializedError,
    },
    /// A guardrail tripwire halted the run.
    Tripped {
        /// Why the tripwire fired.
        reason: String,
    },
    /// The replay cache evicted events before a subscriber could read them.
    /// Injected in place of the evicted range so a subscriber reading from
    /// an offset older than the retained window can detect the gap instead
    /// of silently starting later than it asked for.
    CacheTruncated {
        /// First offset still present in the replay cache.
        resumed_at_offset: u64,
    },
}

impl StreamEvent {
    /// True for events that terminate the stream (no further events for this
    /// run will follow).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Failed { .. } | Self::Tripped { .. } | Self::Canceled
        )
    }
}

/// An event plus the run and monotonic offset it was published at, the unit
/// actually stored in `pubsub::channel`'s replay cache (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedEvent {
    /// Id of the run this event belongs to.
    pub run_id: Uuid,
    /// Monotonically increasing offset within the run's channel, starting at 0.
    pub offset: u64,
    /// The event itself.
    pub event: StreamEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(StreamEvent::Finished { output: "ok".into() }.is_terminal());
        assert!(!StreamEvent::Resumed.is_terminal());
        assert!(StreamEvent::Tripped { reason: "x".into() }.is_terminal());
    }

    #[test]
    fn tagged_serialization_shape() {
        let event = StreamEvent::TextDelta { delta: "hi".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text_delta");
        assert_eq!(json["delta"], "hi");
    }
}
