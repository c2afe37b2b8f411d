//! Unit tests for the stream event wire codec.

use chat_relay::relay::codec::{decode_payload, decode_record, encode, encode_connect};
use chat_relay::relay::event::StreamEvent;
use chat_relay::AppError;

#[test]
fn start_encodes_with_type_only() {
    let data = encode(&StreamEvent::Start).expect("encode");
    assert_eq!(data, r#"{"type":"START"}"#);
}

#[test]
fn content_encodes_with_content_field() {
    let data = encode(&StreamEvent::Content("hello".into())).expect("encode");
    assert_eq!(data, r#"{"type":"CONTENT","content":"hello"}"#);
}

#[test]
fn end_encodes_with_content_field() {
    let data = encode(&StreamEvent::End("done".into())).expect("encode");
    assert_eq!(data, r#"{"type":"END","content":"done"}"#);
}

#[test]
fn error_encodes_with_error_field() {
    let data = encode(&StreamEvent::Error("boom".into())).expect("encode");
    assert_eq!(data, r#"{"type":"ERROR","error":"boom"}"#);
}

#[test]
fn special_characters_are_escaped() {
    let data = encode(&StreamEvent::Content("a \"b\"\n\r\tc".into())).expect("encode");
    assert_eq!(data, r#"{"type":"CONTENT","content":"a \"b\"\n\r\tc"}"#);
}

#[test]
fn encoded_content_round_trips() {
    let original = StreamEvent::Content("line one\nline two \"quoted\"".into());
    let data = encode(&original).expect("encode");
    let decoded = decode_record(&data).expect("decode");
    assert_eq!(decoded, Some(original));
}

#[test]
fn connect_payload_carries_session_id() {
    let data = encode_connect("abc-123").expect("encode");
    assert_eq!(data, r#"{"type":"CONNECT","streamId":"abc-123"}"#);
}

#[test]
fn content_with_missing_text_defaults_to_empty() {
    let decoded = decode_record(r#"{"type":"CONTENT"}"#).expect("decode");
    assert_eq!(decoded, Some(StreamEvent::Content(String::new())));
}

#[test]
fn end_with_missing_text_defaults_to_empty() {
    let decoded = decode_record(r#"{"type":"END"}"#).expect("decode");
    assert_eq!(decoded, Some(StreamEvent::End(String::new())));
}

#[test]
fn error_with_missing_message_gets_placeholder() {
    let decoded = decode_record(r#"{"type":"ERROR"}"#).expect("decode");
    assert_eq!(decoded, Some(StreamEvent::Error("unknown error".into())));
}

#[test]
fn unknown_kind_decodes_to_none() {
    let decoded = decode_record(r#"{"type":"HEARTBEAT","content":"x"}"#).expect("decode");
    assert_eq!(decoded, None);
}

#[test]
fn malformed_record_is_a_codec_error() {
    let result = decode_record("{not json");
    assert!(matches!(result, Err(AppError::Codec(_))));
}

#[test]
fn payload_decodes_multiple_data_records() {
    let raw = concat!(
        "data: {\"type\":\"CONTENT\",\"content\":\"hi\"}\n",
        "data: {\"type\":\"CONTENT\",\"content\":\"hi there\"}\n",
        "data: {\"type\":\"END\",\"content\":\"hi there\"}\n",
    );
    let events = decode_payload(raw).expect("decode");
    assert_eq!(
        events,
        vec![
            StreamEvent::Content("hi".into()),
            StreamEvent::Content("hi there".into()),
            StreamEvent::End("hi there".into()),
        ]
    );
}

#[test]
fn payload_ignores_lines_without_data_prefix() {
    let raw = "event: chunk\n: keep-alive\n\ndata: {\"type\":\"START\"}\n";
    let events = decode_payload(raw).expect("decode");
    assert_eq!(events, vec![StreamEvent::Start]);
}

#[test]
fn empty_payload_decodes_to_no_events() {
    let events = decode_payload("").expect("decode");
    assert!(events.is_empty());
}

#[test]
fn payload_with_malformed_record_fails() {
    let raw = "data: {\"type\":\"CONTENT\",\"content\":\"ok\"}\ndata: {broken\n";
    assert!(decode_payload(raw).is_err());
}
