//! Error types, spanning the user-facing enum, the durable wire envelope,
//! and the tripwire halt used by guardrails.
//!
//! Grounded on the teacher's `thiserror`-based `AgentError`/`agent/error.rs`
//! `StreamingError` (one `#[derive(thiserror::Error)]` enum per subsystem)
//! and on `everruns-durable`'s `WorkflowError`/`ExecutorError`/`StoreError`
//! split, which argued for keeping subsystem errors separate rather than one
//! crate-wide enum.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The durable, serializable form of any Rust error, preserving custom
/// fields across the cause-envelope boundary (spec §4.1, §8's round-trip
/// invariant).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerializedError {
    /// Human-readable message.
    pub message: String,
    /// The error's "name" (its variant/type name), used by observers to
    /// branch without string-matching `message`.
    pub name: String,
    /// Optional backtrace/stack text, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Arbitrary custom fields attached to the originating error, preserved
    /// verbatim so downstream consumers see whatever properties the error
    /// carried at the point of failure.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    /// The error that caused this one, if any, recursively serialized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<SerializedError>>,
}

impl SerializedError {
    /// Build a serialized error with no properties or cause.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: name.into(),
            stack: None,
            properties: Map::new(),
            cause: None,
        }
    }

    /// Attach a custom property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Attach a cause, boxing it.
    #[must_use]
    pub fn with_cause(mut self, cause: Self) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for SerializedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for SerializedError {}

/// Serialize any `std::error::Error` into its durable form, walking `source()`
/// to build the `cause` chain.
pub fn serialize_error(err: &(dyn std::error::Error + 'static)) -> SerializedError {
    let mut serialized = SerializedError::new(
        std::any::type_name_of_val(err),
        err.to_string(),
    );
    if let Some(source) = err.source() {
        serialized = serialized.with_cause(serialize_error(source));
    }
    serialized
}

/// The `{ status: "failed", error, endedAt }` envelope from spec §4.1,
/// attached as the terminal record of a failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureCause {
    /// Always `"failed"`; kept as a literal field (not an enum) because this
    /// struct is a single-shape envelope, not a tagged union.
    pub status: String,
    /// The serialized failure.
    pub error: SerializedError,
    /// When the failure was recorded.
    pub ended_at: chrono::DateTime<chrono::Utc>,
}

impl FailureCause {
    /// Build a failure envelope from any error, stamping the current time.
    #[must_use]
    pub fn new(error: SerializedError) -> Self {
        Self {
            status: "failed".to_string(),
            error,
            ended_at: chrono::Utc::now(),
        }
    }
}

/// User-facing errors raised by configuration, model invocation, or
/// validation (spec §7 category 2). Tool failures are never represented
/// here — see [`ToolError`] and `workflow::state::ToolResult`.
#[derive(Debug, thiserror::Error)]
pub enum AgentFlowError {
    /// The agent, model, or loop configuration was invalid.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The model call itself failed (network, auth, malformed response).
    #[error("model call failed: {0}")]
    Model(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The model's output could not be parsed into the expected shape.
    #[error("failed to parse model output: {0}")]
    Parsing(String),

    /// The run exceeded `LoopOptions::max_steps`.
    #[error("run exceeded the configured step limit ({0} steps)")]
    MaxSteps(usize),

    /// A guardrail tripwire halted execution.
    #[error("guardrail tripwire triggered: {0}")]
    Tripwire(#[from] Tripwire),

    /// The durable store rejected an operation (e.g. duplicate run id,
    /// missing snapshot).
    #[error("workflow store error: {0}")]
    Store(String),

    /// A workspace filesystem tool failed in a way that should abort the
    /// whole run rather than be reported as a tool-level error (e.g. the
    /// write lock was poisoned).
    #[error("workspace error: {0}")]
    Workspace(String),

    /// Any other unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentFlowError {
    /// Serialize into the durable wire form, preserving the variant name.
    #[must_use]
    pub fn to_serialized(&self) -> SerializedError {
        let name = match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::Model(_) => "ModelError",
            Self::Parsing(_) => "ParsingError",
            Self::MaxSteps(_) => "MaxStepsError",
            Self::Tripwire(_) => "TripwireError",
            Self::Store(_) => "StoreError",
            Self::Workspace(_) => "WorkspaceError",
            Self::Internal(_) => "InternalError",
        };
        let mut serialized = SerializedError::new(name, self.to_string());
        if let Self::MaxSteps(steps) = self {
            serialized = serialized.with_property("max_steps", Value::from(*steps));
        }
        if let Self::Tripwire(tripwire) = self {
            serialized = serialized.with_property("reason", Value::String(tripwire.reason.clone()));
        }
        serialized
    }
}

/// Tool-specific failures. Always captured as a `ToolResult::Error` by the
/// tool step (§4.4) rather than propagated as a Rust-level `Err`, so this
/// type never appears inside `AgentFlowError` except via [`AgentFlowError::Workspace`]
/// for failures severe enough to abort the run.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ToolError {
    /// No tool is registered under the requested name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The arguments the model supplied did not match the tool's schema.
    #[error("invalid arguments for tool {tool}: {message}")]
    InvalidArgs {
        /// The tool's name.
        tool: String,
        /// Why the arguments were rejected.
        message: String,
    },

    /// Execution was denied by the tool's execution policy.
    #[error("execution of tool {0} requires confirmation, which was not granted")]
    ConfirmationDenied(String),

    /// The tool itself failed while running.
    #[error("tool {tool} failed: {message}")]
    ExecutionFailed {
        /// The tool's name.
        tool: String,
        /// The failure message.
        message: String,
    },
}

/// The named-halt error raised by a guardrail tripwire (§7 category 4,
/// §9 glossary "Tripwire"). Carries only a reason: the point of a tripwire
/// is to stop the loop, not to report a recoverable failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("tripwire triggered: {reason}")]
pub struct Tripwire {
    /// Which guardrail raised it and why.
    pub reason: String,
}

impl Tripwire {
    /// Build a tripwire with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_error_round_trips_properties() {
        let err = SerializedError::new("ToolError", "boom")
            .with_property("tool_name", Value::String("read_file".into()))
            .with_cause(SerializedError::new("IoError", "file not found"));

        let json = serde_json::to_string(&err).unwrap();
        let back: SerializedError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.properties["tool_name"], Value::String("read_file".into()));
        assert_eq!(back.cause.unwrap().message, "file not found");
    }

    #[test]
    fn agent_flow_error_to_serialized_preserves_variant_name() {
        let err = AgentFlowError::MaxSteps(32);
        let serialized = err.to_serialized();
        assert_eq!(serialized.name, "MaxStepsError");
        assert_eq!(serialized.properties["max_steps"], Value::from(32));
    }

    #[test]
    fn tripwire_carries_reason() {
        let err = AgentFlowError::from(Tripwire::new("unsafe output detected"));
        assert!(matches!(err, AgentFlowError::Tripwire(_)));
        assert_eq!(err.to_serialized().name, "TripwireError");
    }
}
