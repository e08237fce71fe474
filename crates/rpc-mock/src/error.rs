//! Error types for the mock media server.

use std::time::Duration;
use thiserror::Error;

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the mock media server.
#[derive(Debug, Error)]
pub enum Error {
    /// Binding or accepting failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The client sent something that is not a JSON-RPC request.
    #[error("Invalid frame from client: {0}")]
    InvalidFrame(String),

    /// JSON encoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Nothing happened within the wait limit.
    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(Duration, &'static str),

    /// The client closed the connection.
    #[error("Connection closed by client")]
    Closed,
}
