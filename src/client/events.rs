//! Normalization of decoded frames into the consumer's event union.

use serde_json::Value;

use crate::types::Message;
use crate::wire::RawFrame;

/// What the consumer state machine reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// `chat.started` / `assistant.start`.
    Start { message_id: Option<String> },
    /// `message.delta` / `assistant.delta`.
    Delta { text: String },
    /// `message.completed`: the persisted assistant message.
    Message(Box<Message>),
    /// `chat.completed`, `chat.interrupted` / `assistant.end`.
    End { interrupted: bool },
    /// `chat.failed` / `error`.
    Error { code: Option<String>, message: String },
    /// `action.required`: the server awaits a decision for `action_id`.
    ActionRequired { action_id: String, payload: Value },
}

impl ClientEvent {
    /// Map a decoded frame; frames the consumer has no use for yield `None`.
    pub fn from_frame(frame: &RawFrame) -> Option<Self> {
        let data = &frame.data;
        match frame.event.as_str() {
            "chat.started" | "assistant.start" => Some(Self::Start {
                message_id: str_field(data, "message_id"),
            }),
            "message.delta" | "assistant.delta" => {
                // `value` is canonical, `content` the legacy name.
                let text = str_field(data, "value").or_else(|| str_field(data, "content"))?;
                Some(Self::Delta { text })
            }
            "message.completed" => data
                .get("message")
                .cloned()
                .and_then(|m| serde_json::from_value::<Message>(m).ok())
                .map(|m| Self::Message(Box::new(m))),
            "chat.completed" | "assistant.end" => Some(Self::End { interrupted: false }),
            "chat.interrupted" => Some(Self::End { interrupted: true }),
            "chat.failed" | "error" => {
                let error = data.get("error");
                let message = error
                    .and_then(|e| str_field(e, "message"))
                    .or_else(|| str_field(data, "message"))
                    .or_else(|| error.and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| "stream failed".to_string());
                let code = error
                    .and_then(|e| str_field(e, "code"))
                    .or_else(|| str_field(data, "code"));
                Some(Self::Error { code, message })
            }
            "action.required" => {
                let action_id = str_field(data, "action_id")?;
                Some(Self::ActionRequired {
                    action_id,
                    payload: data.clone(),
                })
            }
            _ => None,
        }
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(event: &str, data: Value) -> RawFrame {
        RawFrame {
            event: event.into(),
            data,
        }
    }

    #[test]
    fn delta_prefers_canonical_field() {
        let both = frame("message.delta", json!({"value": "new", "content": "old"}));
        assert_eq!(
            ClientEvent::from_frame(&both),
            Some(ClientEvent::Delta { text: "new".into() })
        );
        let legacy = frame("assistant.delta", json!({"content": "old"}));
        assert_eq!(
            ClientEvent::from_frame(&legacy),
            Some(ClientEvent::Delta { text: "old".into() })
        );
    }

    #[test]
    fn failure_reads_nested_error() {
        let failed = frame(
            "chat.failed",
            json!({"error": {"code": "PERMISSION_DENIED", "message": "nope", "recoverable": true}}),
        );
        assert_eq!(
            ClientEvent::from_frame(&failed),
            Some(ClientEvent::Error {
                code: Some("PERMISSION_DENIED".into()),
                message: "nope".into()
            })
        );
    }

    #[test]
    fn interrupted_ends_the_stream() {
        assert_eq!(
            ClientEvent::from_frame(&frame("chat.interrupted", json!({}))),
            Some(ClientEvent::End { interrupted: true })
        );
    }

    #[test]
    fn thinking_is_not_surfaced() {
        assert_eq!(
            ClientEvent::from_frame(&frame("agent.thinking", json!({"reason": "planning"}))),
            None
        );
    }
}
