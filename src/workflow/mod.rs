//! The agentic-loop workflow: state, snapshots, events, and the do-while
//! loop itself (spec §3, §4.2, §4.3, §4.4).

pub mod agentic_loop;
pub mod events;
pub mod llm_step;
pub mod snapshot;
pub mod state;
pub mod tool_step;

pub use agentic_loop::{run_agentic_loop, LoopDeps};
pub use events::StreamEvent;
pub use snapshot::{Run, RunStatus, Snapshot, StepResult};
pub use state::{IterationState, LoopOptions, ToolCall, ToolResult};
