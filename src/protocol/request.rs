//! Request and acknowledgement bodies for the stream and control calls.

use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};
use crate::types::{ContentPart, MessageRole};

/// The user turn carried by a stream initiation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomingMessage {
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
}

impl IncomingMessage {
    pub fn user_text(value: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentPart::text(value)],
        }
    }

    /// Concatenated text of the message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                ContentPart::Text { value } => value.as_str(),
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Body of a stream initiation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatStreamRequest {
    pub conversation_id: String,
    pub message: IncomingMessage,
}

impl ChatStreamRequest {
    pub fn new(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message: IncomingMessage::user_text(text),
        }
    }

    /// Reject requests that cannot start a stream.
    pub fn validate(&self) -> Result<()> {
        if self.conversation_id.trim().is_empty() {
            return Err(ParleyError::InvalidArgument(
                "conversation_id must not be empty".into(),
            ));
        }
        if self.message.role != MessageRole::User {
            return Err(ParleyError::InvalidArgument(
                "stream requests must carry a user message".into(),
            ));
        }
        if self.message.text().trim().is_empty() {
            return Err(ParleyError::InvalidArgument(
                "message text must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Out-of-band command for an in-flight stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    Interrupt,
}

/// Decision on a pending agent action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionDecision {
    Confirm,
    Cancel,
    Modify,
}

/// Body of a control call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ControlRequest {
    Command {
        conversation_id: String,
        command: ControlCommand,
    },
    Action {
        conversation_id: String,
        action_id: String,
        decision: ActionDecision,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameters_override: Option<serde_json::Value>,
    },
}

impl ControlRequest {
    pub fn interrupt(conversation_id: impl Into<String>) -> Self {
        Self::Command {
            conversation_id: conversation_id.into(),
            command: ControlCommand::Interrupt,
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            Self::Command {
                conversation_id, ..
            }
            | Self::Action {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// Acknowledgement returned by a control call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlAck {
    pub ok: bool,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
