//! Message types: persisted conversation messages and model-facing turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tool_call::ToolCall;

/// Author of a persisted message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// Completion status of a persisted message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Complete,
}

/// A single part of message content. Only text is produced today.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { value: String },
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }
}

/// A conversation message as stored by the persistence collaborator.
///
/// Immutable once saved; ordering within a conversation is insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Assigned by the store when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a complete text message for a conversation.
    pub fn text(conversation_id: impl Into<String>, role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: None,
            conversation_id: conversation_id.into(),
            role,
            content: vec![ContentPart::text(text)],
            tool_call_id: None,
            status: MessageStatus::Complete,
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Builder: set the message id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder: add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Concatenate all text parts.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                ContentPart::Text { value } => value.as_str(),
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Role of a turn sent to a model backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    System,
    Human,
    Ai,
    Tool,
}

/// A turn in the running message list handed to a model backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMessage {
    pub role: ModelRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ModelMessage {
    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(ModelRole::System, text)
    }

    /// Create a human (user) message.
    pub fn human(text: impl Into<String>) -> Self {
        Self::plain(ModelRole::Human, text)
    }

    /// Create an AI (assistant) message.
    pub fn ai(text: impl Into<String>) -> Self {
        Self::plain(ModelRole::Ai, text)
    }

    /// Create an AI message that also carries the tool calls it requested.
    pub fn ai_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(ModelRole::Ai, text)
        }
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(ModelRole::Tool, content)
        }
    }

    fn plain(role: ModelRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Convert a persisted message into a model turn.
    ///
    /// `user` becomes `human` and `assistant` becomes `ai`; every other role is
    /// dropped from replayed history.
    pub fn from_stored(message: &Message) -> Option<Self> {
        match message.role {
            MessageRole::User => Some(Self::human(message.text_content())),
            MessageRole::Assistant => Some(Self::ai(message.text_content())),
            MessageRole::System | MessageRole::Tool => None,
        }
    }
}
