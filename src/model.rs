//! The abstract LLM contract the agentic loop drives.
//!
//! Spec §6 requires the engine to be model-agnostic; this mirrors the
//! teacher's provider abstraction (`providers::common::Model` /
//! `CompletionModel`) collapsed to the one method the loop actually calls,
//! plus a streaming `Chunk` type grounded on `stream::StreamChunk`.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::MessageListState;
use crate::usage::Usage;
use crate::workflow::state::ToolCall;

/// A boxed, owned stream of [`Chunk`]s, returned by [`Model::stream`].
/// Boxing erases the concrete generator type so trait objects
/// (`Arc<dyn Model>`) can return it without an associated type.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Chunk> + Send>>;

/// A tool definition offered to the model, as exposed by `tool::registry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// The tool's unique name.
    pub name: String,
    /// A human/model-readable description of what it does.
    pub description: String,
    /// JSON Schema describing its arguments.
    pub parameters: Value,
}

/// One streamed fragment of a model response.
///
/// Grounded on the teacher's `StreamChunk`: tagged, `#[non_exhaustive]`,
/// constructed via small helper functions rather than struct literals at
/// call sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Chunk {
    /// Incremental assistant text.
    Text(String),
    /// A tool call started streaming; `index` disambiguates concurrent calls.
    ToolCallStart {
        /// Position of this call among the response's tool calls.
        index: usize,
        /// Opaque id for this call.
        id: String,
        /// Name of the tool being called.
        name: String,
    },
    /// Incremental JSON for a tool call's arguments.
    ToolCallDelta {
        /// Which call this delta belongs to.
        index: usize,
        /// Partial JSON text.
        partial_json: String,
    },
    /// A tool call finished streaming its arguments.
    ToolCallDone {
        /// Which call finished.
        index: usize,
    },
    /// Usage for the whole response, emitted once at the end.
    Usage(Usage),
    /// The response stream ended.
    Done,
}

impl Chunk {
    /// Build a text chunk.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// The final, assembled result of a model call: the text it produced plus
/// any tool calls it requested, and the usage it consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Assistant text, if the model produced any.
    pub text: Option<String>,
    /// Tool calls requested, if any.
    pub tool_calls: Vec<ToolCall>,
    /// Tokens consumed by this call.
    pub usage: Usage,
}

impl ModelResponse {
    /// True if the model asked for tool calls rather than finishing.
    #[must_use]
    pub fn requested_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The model-agnostic contract the agentic loop drives.
///
/// Implementors wrap a specific provider's client; the loop never depends on
/// provider-specific types beyond this trait (spec §6).
#[async_trait]
pub trait Model: Send + Sync {
    /// Invoke the model with the given conversation and tool specs, returning
    /// the fully assembled response. Implementations that stream internally
    /// should still return the assembled [`ModelResponse`] here and expose
    /// incremental [`Chunk`]s only through [`Model::stream`].
    async fn generate(
        &self,
        messages: &MessageListState,
        tools: &[ToolSpec],
    ) -> Result<ModelResponse, crate::error::AgentFlowError>;

    /// Invoke the model and yield incremental [`Chunk`]s as an
    /// `AsyncIterable` (spec §6's `fullStream`). The default implementation
    /// calls [`Model::generate`] and replays its already-assembled result as
    /// a generator — splitting text into whitespace-bounded fragments and
    /// each tool call into its start/delta/done triple — so simple
    /// (non-streaming) providers only need to implement `generate`; a
    /// provider whose underlying API actually streams tokens should override
    /// this instead to forward them as they arrive.
    async fn stream(
        &self,
        messages: &MessageListState,
        tools: &[ToolSpec],
    ) -> Result<ChunkStream, crate::error::AgentFlowError> {
        let response = self.generate(messages, tools).await?;
        Ok(Box::pin(async_stream::stream! {
            if let Some(text) = response.text {
                for delta in split_into_deltas(&text) {
                    yield Chunk::text(delta);
                }
            }
            for (index, call) in response.tool_calls.iter().enumerate() {
                yield Chunk::ToolCallStart {
                    index,
                    id: call.tool_call_id.clone(),
                    name: call.tool_name.clone(),
                };
                yield Chunk::ToolCallDelta {
                    index,
                    partial_json: call.args.to_string(),
                };
                yield Chunk::ToolCallDone { index };
            }
            yield Chunk::Usage(response.usage);
            yield Chunk::Done;
        }))
    }
}

/// Split `text` into whitespace-bounded fragments that concatenate back to
/// the original (each fragment but the last carries its trailing space), so
/// the default [`Model::stream`] implementation yields more than one
/// `Chunk::Text` for any multi-word response instead of a single blob.
fn split_into_deltas(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= 1 {
        return vec![text.to_string()];
    }
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i + 1 < words.len() {
                format!("{word} ")
            } else {
                (*word).to_string()
            }
        })
        .collect()
}
