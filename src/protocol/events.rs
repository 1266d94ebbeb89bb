//! Protocol events emitted by the stream orchestrator.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{ErrorCode, ParleyError};
use crate::types::Message;

/// Why the agent is thinking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingReason {
    RetrievingContext,
    Planning,
}

/// Kind of content carried by a `message.delta`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeltaType {
    #[default]
    Text,
}

/// Error payload of `chat.failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureInfo {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl From<&ParleyError> for FailureInfo {
    fn from(err: &ParleyError) -> Self {
        Self {
            code: err.wire_code(),
            message: err.to_string(),
            recoverable: true,
        }
    }
}

/// Wire names of the protocol event variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum EventKind {
    #[strum(serialize = "chat.started")]
    ChatStarted,
    #[strum(serialize = "agent.thinking")]
    AgentThinking,
    #[strum(serialize = "message.delta")]
    MessageDelta,
    #[strum(serialize = "message.completed")]
    MessageCompleted,
    #[strum(serialize = "chat.completed")]
    ChatCompleted,
    #[strum(serialize = "chat.failed")]
    ChatFailed,
    #[strum(serialize = "chat.interrupted")]
    ChatInterrupted,
}

impl EventKind {
    /// Whether this event ends a stream.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ChatCompleted | Self::ChatFailed | Self::ChatInterrupted
        )
    }
}

/// Variant-specific payload. The `event` tag carries the wire name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum EventPayload {
    #[serde(rename = "chat.started")]
    ChatStarted,
    #[serde(rename = "agent.thinking")]
    AgentThinking { reason: ThinkingReason },
    #[serde(rename = "message.delta")]
    MessageDelta {
        #[serde(rename = "type", default)]
        delta_type: DeltaType,
        value: String,
    },
    #[serde(rename = "message.completed")]
    MessageCompleted { message: Message },
    #[serde(rename = "chat.completed")]
    ChatCompleted,
    #[serde(rename = "chat.failed")]
    ChatFailed { error: FailureInfo },
    #[serde(rename = "chat.interrupted")]
    ChatInterrupted,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ChatStarted => EventKind::ChatStarted,
            Self::AgentThinking { .. } => EventKind::AgentThinking,
            Self::MessageDelta { .. } => EventKind::MessageDelta,
            Self::MessageCompleted { .. } => EventKind::MessageCompleted,
            Self::ChatCompleted => EventKind::ChatCompleted,
            Self::ChatFailed { .. } => EventKind::ChatFailed,
            Self::ChatInterrupted => EventKind::ChatInterrupted,
        }
    }
}

/// One event of a chat stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolEvent {
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ProtocolEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Stamps every event of one stream with its conversation and message ids.
#[derive(Debug, Clone)]
pub struct EventFactory {
    conversation_id: String,
    message_id: String,
}

impl EventFactory {
    pub fn new(conversation_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
        }
    }

    fn event(&self, payload: EventPayload) -> ProtocolEvent {
        ProtocolEvent {
            conversation_id: self.conversation_id.clone(),
            message_id: Some(self.message_id.clone()),
            payload,
        }
    }

    pub fn started(&self) -> ProtocolEvent {
        self.event(EventPayload::ChatStarted)
    }

    pub fn thinking(&self, reason: ThinkingReason) -> ProtocolEvent {
        self.event(EventPayload::AgentThinking { reason })
    }

    pub fn delta(&self, value: impl Into<String>) -> ProtocolEvent {
        self.event(EventPayload::MessageDelta {
            delta_type: DeltaType::Text,
            value: value.into(),
        })
    }

    pub fn message_completed(&self, message: Message) -> ProtocolEvent {
        self.event(EventPayload::MessageCompleted { message })
    }

    pub fn completed(&self) -> ProtocolEvent {
        self.event(EventPayload::ChatCompleted)
    }

    pub fn failed(&self, err: &ParleyError) -> ProtocolEvent {
        self.event(EventPayload::ChatFailed { error: err.into() })
    }

    pub fn interrupted(&self) -> ProtocolEvent {
        self.event(EventPayload::ChatInterrupted)
    }
}
