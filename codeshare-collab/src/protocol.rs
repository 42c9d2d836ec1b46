//! JSON wire protocol between clients and rooms.
//!
//! Inbound (client → room):
//! ```text
//! {"event":"text_update","type":"insert","pos":3,"value":"abc"}
//! {"event":"text_update","type":"delete","from":3,"to":6}
//! {"event":"run_code","language":"Python","room":"one"}
//! ```
//!
//! Outbound (room → client):
//! ```text
//! {"event":"input_update","update":{...echo of the inbound edit...}}
//! {"event":"output_update","update":"captured program output"}
//! {"event":"connection_update","update":"full buffer snapshot"}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A position-addressed edit on the shared buffer.
///
/// Offsets are signed so that negative values from a misbehaving client
/// reach the buffer's bounds check instead of failing deserialisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EditOperation {
    Insert { pos: i64, value: String },
    Delete { from: i64, to: i64 },
}

/// Control events a client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlEvent {
    RunCode,
    /// Placeholder; accepted and ignored.
    #[serde(alias = "save_code")]
    CodeSave,
    CodeReview,
}

/// Control request, over the socket or the HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub event: ControlEvent,
    /// Language tag; validated by the dispatcher, not here.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
}

/// A parsed inbound socket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Edit(EditOperation),
    Control(ApiRequest),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    event: Option<String>,
}

impl ClientMessage {
    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(raw).map_err(ProtocolError::Malformed)?;
        match envelope.event.as_deref() {
            Some("text_update") => serde_json::from_str(raw)
                .map(Self::Edit)
                .map_err(ProtocolError::Malformed),
            Some("run_code" | "code_save" | "save_code" | "code_review") => serde_json::from_str(raw)
                .map(Self::Control)
                .map_err(ProtocolError::Malformed),
            Some(other) => Err(ProtocolError::UnknownEvent(other.to_string())),
            None => Err(ProtocolError::MissingEvent),
        }
    }
}

/// Outbound event tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateEvent {
    /// Another client's edit.
    InputUpdate,
    /// Output of a run, sent to everyone in the room.
    OutputUpdate,
    /// Full buffer snapshot for a newly attached client.
    ConnectionUpdate,
    /// Review result, sent to the requester only.
    ReviewUpdate,
}

/// Payload of an outbound update: plain text or the structured echo of
/// an inbound edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpdatePayload {
    Text(String),
    Edit(serde_json::Value),
}

/// Top-level outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundUpdate {
    pub event: UpdateEvent,
    pub update: UpdatePayload,
}

impl OutboundUpdate {
    pub fn text(event: UpdateEvent, text: impl Into<String>) -> Self {
        Self {
            event,
            update: UpdatePayload::Text(text.into()),
        }
    }

    /// Echo a raw inbound message as structured JSON.
    pub fn echo(event: UpdateEvent, raw: &str) -> Result<Self, ProtocolError> {
        let value = serde_json::from_str(raw).map_err(ProtocolError::Malformed)?;
        Ok(Self {
            event,
            update: UpdatePayload::Edit(value),
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::Malformed)
    }
}

/// Outcome class of a control request, mapped to HTTP status by the
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStatus {
    Ok,
    BadRequest,
    NotFound,
    InternalError,
}

/// Body of a control response: `{"message": ...}` or `{"review": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlBody {
    Message(String),
    Review(String),
}

impl ControlBody {
    pub fn text(&self) -> &str {
        match self {
            Self::Message(text) | Self::Review(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub status: ControlStatus,
    pub body: ControlBody,
}

impl ControlResponse {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            status: ControlStatus::Ok,
            body: ControlBody::Message(text.into()),
        }
    }

    pub fn review(text: impl Into<String>) -> Self {
        Self {
            status: ControlStatus::Ok,
            body: ControlBody::Review(text.into()),
        }
    }

    pub fn review_failed() -> Self {
        Self {
            status: ControlStatus::InternalError,
            body: ControlBody::Review("internal server error".to_string()),
        }
    }

    pub fn bad_request(text: impl Into<String>) -> Self {
        Self {
            status: ControlStatus::BadRequest,
            body: ControlBody::Message(text.into()),
        }
    }

    pub fn not_found(text: impl Into<String>) -> Self {
        Self {
            status: ControlStatus::NotFound,
            body: ControlBody::Message(text.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ControlStatus::Ok
    }
}

/// Protocol errors. All of them drop the offending message; none close
/// the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("message has no event field")]
    MissingEvent,
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("failed to encode update: {0}")]
    Encode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_insert() {
        let msg = ClientMessage::parse(
            r#"{"event":"text_update","type":"insert","pos":3,"value":"abc"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Edit(EditOperation::Insert {
                pos: 3,
                value: "abc".into()
            })
        );
    }

    #[test]
    fn test_parse_delete() {
        let msg =
            ClientMessage::parse(r#"{"event":"text_update","type":"delete","from":1,"to":4}"#)
                .unwrap();
        assert_eq!(msg, ClientMessage::Edit(EditOperation::Delete { from: 1, to: 4 }));
    }

    #[test]
    fn test_parse_negative_offset_survives_to_buffer() {
        let msg =
            ClientMessage::parse(r#"{"event":"text_update","type":"insert","pos":-1,"value":"x"}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::Edit(EditOperation::Insert { pos: -1, .. })));
    }

    #[test]
    fn test_parse_control() {
        let msg =
            ClientMessage::parse(r#"{"event":"run_code","language":"Python","room":"one"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Control(ApiRequest {
                event: ControlEvent::RunCode,
                language: Some("Python".into()),
                room: Some("one".into()),
            })
        );
    }

    #[test]
    fn test_parse_save_code_alias() {
        let msg = ClientMessage::parse(r#"{"event":"save_code","language":null}"#).unwrap();
        match msg {
            ClientMessage::Control(req) => {
                assert_eq!(req.event, ControlEvent::CodeSave);
                assert!(req.language.is_none());
            }
            other => panic!("expected control, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_event() {
        let err = ClientMessage::parse(r#"{"event":"launch_missiles"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(ref e) if e == "launch_missiles"));
    }

    #[test]
    fn test_parse_rejects_missing_event() {
        let err = ClientMessage::parse(r#"{"type":"insert","pos":0,"value":"x"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingEvent));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ClientMessage::parse("not json").unwrap_err(),
            ProtocolError::Malformed(_)
        ));
        assert!(matches!(
            ClientMessage::parse("[1,2,3]").unwrap_err(),
            ProtocolError::Malformed(_)
        ));
    }

    #[test]
    fn test_parse_rejects_edit_missing_fields() {
        let err = ClientMessage::parse(r#"{"event":"text_update","type":"insert","pos":0}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err = ClientMessage::parse(r#"{"event":"text_update","type":"replace"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_outbound_text_shape() {
        let encoded = OutboundUpdate::text(UpdateEvent::OutputUpdate, "hi\n")
            .encode()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["event"], "output_update");
        assert_eq!(value["update"], "hi\n");
    }

    #[test]
    fn test_outbound_echo_is_structured() {
        let raw = r#"{"event":"text_update","type":"insert","pos":0,"value":"a"}"#;
        let encoded = OutboundUpdate::echo(UpdateEvent::InputUpdate, raw)
            .unwrap()
            .encode()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["event"], "input_update");
        assert_eq!(value["update"]["type"], "insert");
        assert_eq!(value["update"]["pos"], 0);
    }

    #[test]
    fn test_outbound_decode_distinguishes_payloads() {
        let text = OutboundUpdate::decode(r#"{"event":"connection_update","update":"abc"}"#).unwrap();
        assert_eq!(text.update, UpdatePayload::Text("abc".into()));

        let echo =
            OutboundUpdate::decode(r#"{"event":"input_update","update":{"type":"delete"}}"#)
                .unwrap();
        assert!(matches!(echo.update, UpdatePayload::Edit(_)));
    }

    #[test]
    fn test_control_body_shapes() {
        let message = serde_json::to_value(ControlBody::Message("ok".into())).unwrap();
        assert_eq!(message, serde_json::json!({"message": "ok"}));
        let review = serde_json::to_value(ControlResponse::review_failed().body).unwrap();
        assert_eq!(review, serde_json::json!({"review": "internal server error"}));
    }
}
