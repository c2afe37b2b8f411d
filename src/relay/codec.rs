//! Wire codec for stream events.
//!
//! Each pushed event is one SSE message named `chunk` whose data line is a
//! JSON object: `{"type": ..., "content": ...?, "error": ...?}`. The decoder
//! accepts the same shape from the upstream backend, where a fetch returns a
//! text body of newline-delimited `data: ` records.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::relay::event::StreamEvent;
use crate::{AppError, Result};

/// Prefix of a data record inside an upstream fetch body.
const DATA_PREFIX: &str = "data: ";

/// JSON payload of one `chunk` message.
#[derive(Debug, Serialize, Deserialize)]
struct ChunkPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ChunkPayload {
    fn new(kind: &str, content: Option<String>, error: Option<String>) -> Self {
        Self {
            kind: kind.to_owned(),
            content,
            error,
        }
    }
}

/// JSON payload of the initial `connect` message.
#[derive(Debug, Serialize, Deserialize)]
struct ConnectPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "streamId")]
    stream_id: String,
}

/// Encode one event as the data payload of a `chunk` message.
///
/// # Errors
///
/// Returns `AppError::Codec` if JSON serialization fails.
pub fn encode(event: &StreamEvent) -> Result<String> {
    let payload = match event {
        StreamEvent::Start => ChunkPayload::new("START", None, None),
        StreamEvent::Content(text) => ChunkPayload::new("CONTENT", Some(text.clone()), None),
        StreamEvent::End(text) => ChunkPayload::new("END", Some(text.clone()), None),
        StreamEvent::Error(message) => ChunkPayload::new("ERROR", None, Some(message.clone())),
    };
    serde_json::to_string(&payload).map_err(|err| AppError::Codec(err.to_string()))
}

/// Encode the data payload of the initial `connect` message.
///
/// # Errors
///
/// Returns `AppError::Codec` if JSON serialization fails.
pub fn encode_connect(session_id: &str) -> Result<String> {
    let payload = ConnectPayload {
        kind: "CONNECT".into(),
        stream_id: session_id.to_owned(),
    };
    serde_json::to_string(&payload).map_err(|err| AppError::Codec(err.to_string()))
}

/// Decode one JSON record into a stream event.
///
/// Required fields per kind: `CONTENT`/`END` default a missing `content` to
/// the empty string; a missing `error` on `ERROR` becomes "unknown error".
/// A well-formed record of unrecognised kind decodes to `None`.
///
/// # Errors
///
/// Returns `AppError::Codec` if the record is not valid JSON of the expected
/// shape.
pub fn decode_record(record: &str) -> Result<Option<StreamEvent>> {
    let payload: ChunkPayload =
        serde_json::from_str(record).map_err(|err| AppError::Codec(err.to_string()))?;
    let event = match payload.kind.as_str() {
        "START" => Some(StreamEvent::Start),
        "CONTENT" => Some(StreamEvent::Content(payload.content.unwrap_or_default())),
        "END" => Some(StreamEvent::End(payload.content.unwrap_or_default())),
        "ERROR" => Some(StreamEvent::Error(
            payload.error.unwrap_or_else(|| "unknown error".into()),
        )),
        _ => {
            debug!(record, "skipping record of unknown kind");
            None
        }
    };
    Ok(event)
}

/// Decode an upstream fetch body into the events it carries.
///
/// Lines without the `data: ` prefix (comments, blank keep-alives) are
/// ignored, matching the upstream framing.
///
/// # Errors
///
/// Returns `AppError::Codec` on the first malformed data record.
pub fn decode_payload(raw: &str) -> Result<Vec<StreamEvent>> {
    let mut events = Vec::new();
    for line in raw.lines() {
        let Some(record) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        if let Some(event) = decode_record(record)? {
            events.push(event);
        }
    }
    Ok(events)
}
