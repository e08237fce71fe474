//! The single physical connection to the media server.

use crate::error::ConnectionError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::fmt::Debug;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;

/// A connected, frame-oriented channel to the server.
///
/// Only the transport's supervisor task touches a connection, so writes are
/// serialized by construction.
#[async_trait]
pub trait Connection: Send + Debug {
    /// Send one text frame.
    async fn send(&mut self, frame: String) -> Result<(), ConnectionError>;

    /// Wait for the next text frame.
    ///
    /// Returns `None` once the peer has closed the connection. Must be
    /// cancel-safe: the supervisor races it against outgoing frames.
    async fn recv(&mut self) -> Option<Result<String, ConnectionError>>;

    /// Send a keepalive probe.
    async fn ping(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Opens connections on behalf of the transport, once per (re)connect.
#[async_trait]
pub trait Connector: Send + Sync + Debug + 'static {
    /// Establish a new connection.
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// Connects to a media server over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Create a connector for a `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or has another scheme.
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self, ConnectionError> {
        let url = Url::parse(url)
            .map_err(|e| ConnectionError::InvalidUrl(format!("{url}: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectionError::InvalidUrl(format!(
                "{url}: expected ws or wss scheme"
            )));
        }

        Ok(Self {
            url,
            connect_timeout,
        })
    }

    /// The URL this connector dials.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        debug!("Connecting to WebSocket at {}", self.url);

        let (stream, _) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| ConnectionError::ConnectTimeout(self.connect_timeout))?
            .map_err(|e| ConnectionError::ConnectFailed {
                target: self.url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(WebSocketConnection { stream }))
    }
}

/// Client side of a WebSocket connection.
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&mut self, frame: String) -> Result<(), ConnectionError> {
        self.stream
            .send(Message::text(frame))
            .await
            .map_err(|e| ConnectionError::WebSocket(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ConnectionError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => {
                    return Some(String::from_utf8(data.to_vec()).map_err(|e| {
                        ConnectionError::WebSocket(format!("non UTF-8 binary frame: {e}"))
                    }));
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Server closed the connection");
                    return None;
                }
                // Ping, pong and raw frames
                Ok(_) => {}
                Err(e) => return Some(Err(ConnectionError::WebSocket(e.to_string()))),
            }
        }
    }

    async fn ping(&mut self) -> Result<(), ConnectionError> {
        self.stream
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|e| ConnectionError::WebSocket(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ConnectionError::WebSocket(e.to_string()))
    }
}
