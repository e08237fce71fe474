//! Error types for the Kurento RPC transport.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for transport operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection-related errors.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The server rejected a call.
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// A frame or reply did not have the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The transport was stopped while the call was outstanding.
    #[error("Transport has been stopped")]
    Teardown,

    /// A caller-requested timeout expired before the reply arrived.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Call parameters were not a JSON object.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Serialization of an outgoing frame failed.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The result slot was dropped without being fulfilled.
    #[error("Channel closed")]
    ChannelClosed,
}

impl Error {
    /// Returns the server-side rejection if this error carries one.
    #[must_use]
    pub const fn as_rpc(&self) -> Option<&RpcError> {
        match self {
            Self::Rpc(err) => Some(err),
            _ => None,
        }
    }
}

/// Connection-specific errors.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// The configured URL could not be used.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to establish the connection.
    #[error("Failed to connect to {target}: {reason}")]
    ConnectFailed {
        /// Where we tried to connect.
        target: String,
        /// Why the attempt failed.
        reason: String,
    },

    /// Connection attempt did not finish in time.
    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Connection closed by the peer.
    #[error("Connection closed")]
    Closed,

    /// WebSocket-level failure while reading or writing.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The reconnection policy gave up.
    #[error("Gave up reconnecting after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Consecutive failed attempts.
        attempts: u32,
        /// The last failure observed.
        last_error: String,
    },
}

/// Rejection reported by the server in an `error` reply.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct RpcError {
    /// JSON-RPC error code, when the server supplied one.
    pub code: Option<i64>,
    /// Human-readable message from the server.
    pub message: String,
    /// The `data` member of the error, if any.
    pub data: Option<Value>,
    /// The full `error` object as received.
    pub payload: Value,
}

impl RpcError {
    /// Build from the raw `error` member of a reply frame.
    #[must_use]
    pub fn from_payload(payload: Value) -> Self {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Error")
            .to_string();
        let code = payload.get("code").and_then(Value::as_i64);
        let data = payload.get("data").cloned();

        Self {
            code,
            message,
            data,
            payload,
        }
    }
}

/// Protocol-level errors.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// Frame was not valid JSON.
    #[error("Invalid JSON frame: {0}")]
    InvalidJson(String),

    /// Frame did not match any recognized envelope.
    #[error("Unrecognized frame: {0}")]
    UnrecognizedFrame(String),

    /// A reply value had the wrong shape for the call that produced it.
    #[error("Unexpected result for {method}: {value}")]
    UnexpectedResult {
        /// Method that was called.
        method: String,
        /// Value the server returned.
        value: Value,
    },
}
