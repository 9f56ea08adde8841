//! The opaque conversation state threaded through the agentic loop.
//!
//! Spec §3 calls this `messageListState` and treats it as an opaque blob
//! passed to the LLM step and mutated by `llm-mapping`. It is modeled here
//! as a concrete, serializable message list (grounded on the teacher's
//! `message::ChatMessage`) rather than a truly opaque type, so that
//! `Snapshot`s round-trip through `serde_json` without a type-erasure layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single role-tagged turn in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// System instructions, always first when present.
    System {
        /// The rendered system prompt text.
        content: String,
    },
    /// A user turn.
    User {
        /// User-provided content (text or structured parts).
        content: Value,
    },
    /// An assistant turn, possibly carrying tool calls.
    Assistant {
        /// Assistant text content, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        /// Tool calls requested by the assistant, if any.
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        tool_calls: Vec<crate::workflow::state::ToolCall>,
    },
    /// The result of a single tool call, correlated by `tool_call_id`.
    Tool {
        /// The id of the `ToolCall` this message answers.
        tool_call_id: String,
        /// The tool's result, serialized as a string for model consumption.
        content: String,
    },
}

impl Message {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Build a user message from plain text.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: Value::String(content.into()),
        }
    }

    /// Build an assistant message carrying only text.
    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Build an assistant message carrying tool calls (and optional text).
    pub fn assistant_tool_calls(
        content: Option<String>,
        tool_calls: Vec<crate::workflow::state::ToolCall>,
    ) -> Self {
        Self::Assistant {
            content,
            tool_calls,
        }
    }

    /// Build a tool-result message.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    /// Returns the plain-text content of this message, if it has any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } => Some(content.as_str()),
            Self::User { content } => content.as_str(),
            Self::Assistant { content, .. } => content.as_deref(),
            Self::Tool { content, .. } => Some(content.as_str()),
        }
    }
}

/// The opaque, serializable conversation state passed between iterations.
///
/// Equivalent to spec §3's `messageListState`: the LLM step reads it to build
/// a model request and `llm-mapping` (§4.2 step 6) rewrites it with the new
/// assistant turn and tool results merged in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageListState {
    /// Ordered conversation turns.
    pub messages: Vec<Message>,
}

impl MessageListState {
    /// Start a fresh conversation from a system prompt and the first user turn.
    #[must_use]
    pub fn new(system_prompt: Option<String>, user_message: Message) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(prompt) = system_prompt {
            if !prompt.is_empty() {
                messages.push(Message::system(prompt));
            }
        }
        messages.push(user_message);
        Self { messages }
    }

    /// Append a message in place.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append many messages in place, in order.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_skips_empty_system_prompt() {
        let state = MessageListState::new(Some(String::new()), Message::user("hi"));
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn new_keeps_system_prompt_when_present() {
        let state = MessageListState::new(Some("be helpful".into()), Message::user("hi"));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].text(), Some("be helpful"));
    }
}
