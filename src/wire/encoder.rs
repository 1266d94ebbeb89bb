//! Protocol event encoding.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::{ParleyError, Result};
use crate::protocol::ProtocolEvent;

/// Encode one event as a frame: `event: <type>`, one `data:` line with the
/// JSON payload (whose embedded `event` field repeats the type), blank line.
pub fn encode_event(event: &ProtocolEvent) -> Result<String> {
    let kind: &'static str = event.kind().into();
    let json = serde_json::to_string(event)?;
    let mut frame = String::with_capacity(json.len() + kind.len() + 16);
    frame.push_str("event: ");
    frame.push_str(kind);
    frame.push('\n');
    for line in json.lines() {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    Ok(frame)
}

/// Encode an event stream into frame bytes, one item per event.
pub fn encode_stream(
    events: BoxStream<'static, ProtocolEvent>,
) -> BoxStream<'static, std::result::Result<Bytes, ParleyError>> {
    events
        .map(|event| encode_event(&event).map(Bytes::from))
        .boxed()
}
