//! Consumer-side protocol frame decoding.
//!
//! Two framings are accepted: an explicit `event: <type>` header followed by
//! `data:` lines, and data-only frames whose JSON carries an `event` field.
//! Frames without a resolvable type and frames with malformed JSON are
//! dropped; decoding always continues with the next frame.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use super::sse::{SseBuffer, SseFrame};
use crate::error::{ParleyError, Result};
use crate::protocol::ProtocolEvent;

/// A decoded frame: resolved event type plus its JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub event: String,
    pub data: serde_json::Value,
}

impl RawFrame {
    /// Decode into a typed protocol event.
    ///
    /// The resolved frame type is authoritative over any embedded `event`.
    pub fn to_event(&self) -> Result<ProtocolEvent> {
        let mut data = self.data.clone();
        match data.as_object_mut() {
            Some(obj) => {
                obj.insert(
                    "event".to_string(),
                    serde_json::Value::String(self.event.clone()),
                );
            }
            None => {
                return Err(ParleyError::ProtocolDecode(format!(
                    "{} payload is not an object",
                    self.event
                )))
            }
        }
        serde_json::from_value(data).map_err(|e| ParleyError::ProtocolDecode(e.to_string()))
    }
}

/// Incremental decoder from raw bytes to [`RawFrame`]s.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    sse: SseBuffer,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read; returns the frames it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.sse.push(chunk).into_iter().filter_map(resolve).collect()
    }

    /// Flush a trailing frame that lacked its blank-line terminator.
    pub fn finish(&mut self) -> Option<RawFrame> {
        self.sse.finish().and_then(resolve)
    }
}

fn resolve(frame: SseFrame) -> Option<RawFrame> {
    let data = if frame.data.trim().is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        match serde_json::from_str::<serde_json::Value>(&frame.data) {
            Ok(value) => value,
            Err(e) => {
                let err = ParleyError::ProtocolDecode(e.to_string());
                tracing::warn!(
                    event = frame.event.as_deref().unwrap_or("<none>"),
                    error = %err,
                    "dropping malformed frame"
                );
                return None;
            }
        }
    };

    let event = frame.event.or_else(|| {
        data.get("event")
            .and_then(|e| e.as_str())
            .map(str::to_string)
    });
    match event {
        Some(event) => Some(RawFrame { event, data }),
        None => {
            tracing::debug!("dropping frame without event type");
            None
        }
    }
}

/// Decode a byte stream into a frame stream.
///
/// A transport error is forwarded once and ends the stream.
pub fn decode_frames(
    bytes: BoxStream<'static, std::result::Result<Bytes, ParleyError>>,
) -> BoxStream<'static, Result<RawFrame>> {
    let stream = async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        let mut inner = bytes;
        while let Some(chunk) = inner.next().await {
            match chunk {
                Ok(chunk) => {
                    for frame in decoder.push(&chunk) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        if let Some(frame) = decoder.finish() {
            yield Ok(frame);
        }
    };
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_only_frame_uses_embedded_event() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"data: {\"event\":\"chat.started\",\"conversation_id\":\"c1\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "chat.started");
    }

    #[test]
    fn frame_without_type_is_discarded() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"value\":\"orphan\"}\n\n").is_empty());
    }

    #[test]
    fn header_overrides_embedded_event() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"event: message.delta\ndata: {\"event\":\"other\",\"value\":\"x\"}\n\n");
        assert_eq!(frames[0].event, "message.delta");
        assert_eq!(frames[0].data["value"], "x");
    }

    #[test]
    fn typed_decode_of_header_only_payload() {
        let frame = RawFrame {
            event: "message.delta".into(),
            data: json!({"conversation_id": "c1", "value": "hi"}),
        };
        let event = frame.to_event().unwrap();
        assert_eq!(event.conversation_id, "c1");
        assert_eq!(event.kind(), crate::protocol::EventKind::MessageDelta);
    }

    #[test]
    fn typed_decode_rejects_unknown_event() {
        let frame = RawFrame {
            event: "mystery".into(),
            data: json!({"conversation_id": "c1"}),
        };
        assert!(matches!(frame.to_event(), Err(ParleyError::ProtocolDecode(_))));
    }
}
