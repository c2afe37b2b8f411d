//! Unit tests for domain models and stream events.

use chat_relay::models::message::MessageRole;
use chat_relay::relay::event::StreamEvent;

#[test]
fn role_wire_names_are_lowercase() {
    assert_eq!(MessageRole::User.as_str(), "user");
    assert_eq!(MessageRole::Assistant.as_str(), "assistant");
}

#[test]
fn role_parses_its_own_wire_names() {
    assert_eq!(MessageRole::parse("user"), Ok(MessageRole::User));
    assert_eq!(MessageRole::parse("assistant"), Ok(MessageRole::Assistant));
}

#[test]
fn unknown_role_is_returned_verbatim() {
    assert_eq!(MessageRole::parse("system"), Err("system".to_owned()));
}

#[test]
fn role_serializes_to_snake_case() {
    let json = serde_json::to_string(&MessageRole::Assistant).expect("serialize");
    assert_eq!(json, "\"assistant\"");
}

#[test]
fn end_and_error_are_terminal() {
    assert!(StreamEvent::End("x".into()).is_terminal());
    assert!(StreamEvent::Error("x".into()).is_terminal());
}

#[test]
fn start_and_content_are_not_terminal() {
    assert!(!StreamEvent::Start.is_terminal());
    assert!(!StreamEvent::Content("x".into()).is_terminal());
}
