//! Classification of frames received from the media server.

use crate::error::{ProtocolError, RpcError};
use crate::protocol::message::{CallId, ObjectId};
use serde_json::Value;

/// Method name the server uses for pushed events.
pub const EVENT_METHOD: &str = "onEvent";

/// An event pushed by the server for a subscribed object.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Object that raised the event.
    pub object: ObjectId,
    /// Event type, e.g. `IceCandidateFound`.
    pub event_type: String,
    /// The complete `params.value` object as pushed.
    pub value: Value,
}

/// A decoded frame, routed by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Unsolicited `onEvent` push.
    Event {
        /// The event itself.
        event: Event,
        /// Session id carried alongside the event, if any.
        session_id: Option<String>,
    },
    /// Rejection of a call.
    Error {
        /// Call being rejected.
        id: CallId,
        /// What the server reported.
        error: RpcError,
    },
    /// Successful reply. `value` is `null` when the server sent no value.
    Reply {
        /// Call being answered.
        id: CallId,
        /// `result.value`, or `null`.
        value: Value,
        /// `result.sessionId`, if present.
        session_id: Option<String>,
    },
}

impl Incoming {
    /// Decode and classify a text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the text is not JSON or matches no
    /// known envelope.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        Self::classify(frame)
    }

    /// Classify a decoded frame.
    ///
    /// The `onEvent` check comes first because event frames may also carry
    /// an `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the frame matches no known envelope.
    pub fn classify(mut frame: Value) -> Result<Self, ProtocolError> {
        if frame.get("method").and_then(Value::as_str) == Some(EVENT_METHOD) {
            return Self::classify_event(&mut frame);
        }

        let id = frame.get("id").and_then(CallId::from_value);

        if let Some(error) = frame.get_mut("error").map(Value::take) {
            let id = id.ok_or_else(|| unrecognized("error reply without id", &frame))?;
            return Ok(Self::Error {
                id,
                error: RpcError::from_payload(error),
            });
        }

        if let Some(result) = frame.get_mut("result").map(Value::take) {
            let id = id.ok_or_else(|| unrecognized("reply without id", &frame))?;
            let (value, session_id) = match result {
                Value::Object(mut fields) => {
                    let session_id = fields
                        .get("sessionId")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    let value = fields.remove("value").unwrap_or(Value::Null);
                    (value, session_id)
                }
                other => (other, None),
            };
            return Ok(Self::Reply {
                id,
                value,
                session_id,
            });
        }

        Err(unrecognized("no method, error or result", &frame))
    }

    fn classify_event(frame: &mut Value) -> Result<Self, ProtocolError> {
        let session_id = frame
            .pointer("/params/sessionId")
            .and_then(Value::as_str)
            .map(str::to_string);

        let value = frame
            .pointer_mut("/params/value")
            .map(Value::take)
            .ok_or_else(|| unrecognized("event without params.value", frame))?;

        let object = value
            .get("object")
            .and_then(ObjectId::from_value)
            .ok_or_else(|| unrecognized("event without object", &value))?;

        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| unrecognized("event without type", &value))?
            .to_string();

        Ok(Self::Event {
            event: Event {
                object,
                event_type,
                value,
            },
            session_id,
        })
    }
}

fn unrecognized(reason: &str, frame: &Value) -> ProtocolError {
    ProtocolError::UnrecognizedFrame(format!("{reason}: {frame}"))
}
