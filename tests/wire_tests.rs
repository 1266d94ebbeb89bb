//! Event framing: encode on one side, decode on the other.

use bytes::Bytes;
use futures::StreamExt;
use parley::error::ParleyError;
use parley::protocol::{EventFactory, EventKind, ProtocolEvent, ThinkingReason};
use parley::types::{Message, MessageRole};
use parley::wire::{decode_frames, encode_event, encode_stream, FrameDecoder, RawFrame};
use pretty_assertions::assert_eq;

fn sample_events() -> Vec<ProtocolEvent> {
    let events = EventFactory::new("c1", "m1");
    let message = Message::text("c1", MessageRole::Assistant, "Hi there, friend")
        .with_id("m1")
        .with_metadata("tool_rounds", 1);
    vec![
        events.started(),
        events.thinking(ThinkingReason::RetrievingContext),
        events.thinking(ThinkingReason::Planning),
        events.delta("Hi there, "),
        events.delta("friend"),
        events.message_completed(message),
        events.completed(),
    ]
}

fn encoded(events: &[ProtocolEvent]) -> Vec<u8> {
    events
        .iter()
        .flat_map(|e| encode_event(e).unwrap().into_bytes())
        .collect()
}

fn decode_all(chunks: &[&[u8]]) -> Vec<ProtocolEvent> {
    let mut decoder = FrameDecoder::new();
    let mut frames: Vec<RawFrame> = chunks.iter().flat_map(|c| decoder.push(c)).collect();
    frames.extend(decoder.finish());
    frames.iter().map(|f| f.to_event().unwrap()).collect()
}

#[test]
fn full_stream_decodes_back_to_the_same_events() {
    let events = sample_events();
    let bytes = encoded(&events);

    assert_eq!(decode_all(&[bytes.as_slice()]), events);
}

#[test]
fn any_split_point_decodes_identically() {
    let events = sample_events();
    let bytes = encoded(&events);

    for split in 0..=bytes.len() {
        let (head, tail) = bytes.split_at(split);
        assert_eq!(decode_all(&[head, tail]), events, "split at byte {split}");
    }
}

#[test]
fn malformed_frame_is_skipped() {
    let events = EventFactory::new("c1", "m1");
    let mut bytes = encode_event(&events.started()).unwrap();
    bytes.push_str("event: message.delta\ndata: {not json\n\n");
    bytes.push_str(&encode_event(&events.completed()).unwrap());

    let decoded = decode_all(&[bytes.as_bytes()]);

    let kinds: Vec<_> = decoded.iter().map(ProtocolEvent::kind).collect();
    assert_eq!(kinds, vec![EventKind::ChatStarted, EventKind::ChatCompleted]);
}

#[test]
fn data_only_and_header_framings_agree() {
    let event = EventFactory::new("c1", "m1").delta("hello");
    let json = serde_json::to_string(&event).unwrap();
    let data_only = format!("data: {json}\n\n");
    let with_header = encode_event(&event).unwrap();

    assert_eq!(decode_all(&[data_only.as_bytes()]), vec![event.clone()]);
    assert_eq!(decode_all(&[with_header.as_bytes()]), vec![event]);
}

#[test]
fn frame_without_any_type_is_dropped() {
    let decoded = decode_all(&[b"data: {\"conversation_id\":\"c1\"}\n\n".as_slice()]);
    assert!(decoded.is_empty());
}

#[tokio::test]
async fn encoded_stream_round_trips_through_decode_frames() {
    let events = sample_events();
    let source = futures::stream::iter(events.clone()).boxed();

    let frames: Vec<_> = decode_frames(encode_stream(source)).collect().await;

    let decoded: Vec<ProtocolEvent> = frames
        .into_iter()
        .map(|f| f.unwrap().to_event().unwrap())
        .collect();
    assert_eq!(decoded, events);
}

#[tokio::test]
async fn transport_error_is_forwarded_and_ends_decoding() {
    let started = encode_event(&EventFactory::new("c1", "m1").started()).unwrap();
    let chunks: Vec<Result<Bytes, ParleyError>> = vec![
        Ok(Bytes::from(started)),
        Err(ParleyError::Transport("connection reset".into())),
        Ok(Bytes::from_static(b"event: chat.completed\ndata: {}\n\n")),
    ];

    let frames: Vec<_> = decode_frames(futures::stream::iter(chunks).boxed())
        .collect()
        .await;

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].as_ref().unwrap().event, "chat.started");
    assert!(matches!(&frames[1], Err(ParleyError::Transport(_))));
}
