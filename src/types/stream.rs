//! Streaming types shared by model backends and the tool loop.

use serde::{Deserialize, Serialize};

use super::message::ModelMessage;
use super::tool_call::ToolCallFragment;

/// One partial output chunk from a model backend.
///
/// Backends differ in how their wire chunks expose text and tool calls; each
/// one normalizes into this shape so the tool loop is written once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_fragments: Vec<ToolCallFragment>,
}

impl ModelChunk {
    /// A chunk carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_call_fragments: Vec::new(),
        }
    }

    /// A chunk carrying only tool-call fragments.
    pub fn tool_calls(fragments: Vec<ToolCallFragment>) -> Self {
        Self {
            text: None,
            tool_call_fragments: fragments,
        }
    }
}

/// Events produced by the round-bounded tool loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmStreamEvent {
    /// A text chunk as received from the model.
    Token { text: String },
    /// A tool is about to be invoked.
    ToolStart { name: String, call_id: String },
    /// A tool produced a result (possibly an `Error: ...` result).
    ToolEnd {
        name: String,
        call_id: String,
        result: String,
    },
    /// The loop finished; `messages` is the full running message list.
    Done { messages: Vec<ModelMessage> },
}
