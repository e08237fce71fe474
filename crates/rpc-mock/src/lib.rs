//! Mock media server for testing RPC clients.
//!
//! Speaks just enough JSON-RPC over WebSocket to script server behavior from
//! a test: read the client's requests, answer them in any order, push
//! events, and drop the connection at will.

#![warn(missing_docs)]

mod error;

pub use error::{Error, Result};

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, warn};

/// How long the waiting helpers block before failing.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// A WebSocket server on a random local port.
#[derive(Debug)]
pub struct MockMediaServer {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<MockConnection>,
    accept_task: JoinHandle<()>,
}

impl MockMediaServer {
    /// Bind to `127.0.0.1` on a free port and start accepting clients.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, connections) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_loop(listener, tx));

        debug!(%addr, "Mock media server listening");
        Ok(Self {
            addr,
            connections,
            accept_task,
        })
    }

    /// URL clients should connect to.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}/kurento", self.addr)
    }

    /// Address the server is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the next client connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no client connects within [`DEFAULT_WAIT`].
    pub async fn accept(&mut self) -> Result<MockConnection> {
        timeout(DEFAULT_WAIT, self.connections.recv())
            .await
            .map_err(|_| Error::Timeout(DEFAULT_WAIT, "a connection"))?
            .ok_or(Error::Closed)
    }

    /// Close the listener so further connection attempts are refused.
    ///
    /// Connections already accepted stay open.
    pub fn stop_accepting(&self) {
        self.accept_task.abort();
    }
}

impl Drop for MockMediaServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, connections: mpsc::UnboundedSender<MockConnection>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Accept error");
                continue;
            }
        };

        let stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(%peer, error = %e, "WebSocket handshake failed");
                continue;
            }
        };

        debug!(%peer, "Client connected");
        if connections.send(MockConnection { stream, peer }).is_err() {
            break;
        }
    }
}

/// A request as received by the server.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    /// Call id chosen by the client.
    pub id: Value,
    /// JSON-RPC method name.
    pub method: String,
    /// Request params, `Null` if absent.
    pub params: Value,
}

impl ReceivedRequest {
    fn parse(text: &str) -> Result<Self> {
        let mut frame: Value = serde_json::from_str(text)?;

        if frame["jsonrpc"] != "2.0" {
            return Err(Error::InvalidFrame(format!("missing jsonrpc version: {text}")));
        }
        let Some(method) = frame["method"].as_str().map(str::to_string) else {
            return Err(Error::InvalidFrame(format!("missing method: {text}")));
        };
        let Some(id) = frame.get_mut("id").map(Value::take) else {
            return Err(Error::InvalidFrame(format!("missing id: {text}")));
        };
        let params = frame.get_mut("params").map(Value::take).unwrap_or_default();

        Ok(Self { id, method, params })
    }

    /// A named param, `Null` if absent.
    #[must_use]
    pub fn param(&self, name: &str) -> &Value {
        &self.params[name]
    }

    /// The `sessionId` param, if the client attached one.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.params.get("sessionId").and_then(Value::as_str)
    }
}

/// Scripted answer for [`MockConnection::respond_with`].
#[derive(Debug, Clone)]
pub enum Reply {
    /// Reply with `{"value": ...}` as the result.
    Value(Value),
    /// Reply with this exact result.
    Result(Value),
    /// Reply with an error.
    Error {
        /// Error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// Do not answer.
    Ignore,
}

/// One accepted client connection.
#[derive(Debug)]
pub struct MockConnection {
    stream: WebSocketStream<TcpStream>,
    peer: SocketAddr,
}

impl MockConnection {
    /// Address of the connected client.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Wait for the next request.
    ///
    /// # Errors
    ///
    /// Returns an error if the client disconnects, sends a malformed frame,
    /// or sends nothing within [`DEFAULT_WAIT`].
    pub async fn recv_request(&mut self) -> Result<ReceivedRequest> {
        self.recv_request_within(DEFAULT_WAIT)
            .await?
            .ok_or(Error::Timeout(DEFAULT_WAIT, "a request"))
    }

    /// Wait up to `wait` for the next request, `None` if none arrived.
    ///
    /// # Errors
    ///
    /// Returns an error if the client disconnects or sends a malformed frame.
    pub async fn recv_request_within(&mut self, wait: Duration) -> Result<Option<ReceivedRequest>> {
        match timeout(wait, self.next_request()).await {
            Ok(request) => request.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Wait until the client closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if a request arrives first or nothing happens within
    /// [`DEFAULT_WAIT`].
    pub async fn wait_closed(&mut self) -> Result<()> {
        match timeout(DEFAULT_WAIT, self.next_request()).await {
            Ok(Err(Error::Closed)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Ok(Ok(request)) => Err(Error::InvalidFrame(format!(
                "expected close, got {} request",
                request.method
            ))),
            Err(_) => Err(Error::Timeout(DEFAULT_WAIT, "the client to close")),
        }
    }

    async fn next_request(&mut self) -> Result<ReceivedRequest> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return ReceivedRequest::parse(text.as_str()),
                Some(Ok(Message::Close(_))) | None => return Err(Error::Closed),
                Some(Ok(_)) => {}
                Some(Err(
                    tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::AlreadyClosed
                    | tungstenite::Error::Protocol(
                        tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
                    ),
                )) => return Err(Error::Closed),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Send a successful reply with an arbitrary result.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    pub async fn reply(&mut self, request: &ReceivedRequest, result: Value) -> Result<()> {
        self.send_json(&json!({
            "jsonrpc": "2.0",
            "id": request.id,
            "result": result,
        }))
        .await
    }

    /// Send a successful reply carrying `{"value": value}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    pub async fn reply_value(&mut self, request: &ReceivedRequest, value: Value) -> Result<()> {
        self.reply(request, json!({ "value": value })).await
    }

    /// Send an error reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    pub async fn reply_error(
        &mut self,
        request: &ReceivedRequest,
        code: i64,
        message: &str,
    ) -> Result<()> {
        self.send_json(&json!({
            "jsonrpc": "2.0",
            "id": request.id,
            "error": {"code": code, "message": message},
        }))
        .await
    }

    /// Push an `onEvent` notification for `object`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    pub async fn push_event(&mut self, object: &str, event_type: &str, data: Value) -> Result<()> {
        self.send_json(&json!({
            "jsonrpc": "2.0",
            "method": "onEvent",
            "params": {
                "value": {
                    "object": object,
                    "type": event_type,
                    "data": data,
                },
            },
        }))
        .await
    }

    /// Send a text frame verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    pub async fn send_raw(&mut self, text: impl Into<String>) -> Result<()> {
        self.stream.send(Message::text(text.into())).await?;
        Ok(())
    }

    async fn send_json(&mut self, frame: &Value) -> Result<()> {
        let text = serde_json::to_string(frame)?;
        self.send_raw(text).await
    }

    /// Close the connection with a close handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the close frame cannot be written.
    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }

    /// Drop the TCP connection without a close handshake.
    pub fn drop_abruptly(self) {
        debug!(peer = %self.peer, "Dropping client connection");
    }

    /// Answer every request with `respond` until the client disconnects.
    pub fn respond_with<F>(mut self, mut respond: F) -> JoinHandle<Result<()>>
    where
        F: FnMut(&ReceivedRequest) -> Reply + Send + 'static,
    {
        tokio::spawn(async move {
            loop {
                let request = match self.next_request().await {
                    Ok(request) => request,
                    Err(Error::Closed) => return Ok(()),
                    Err(e) => return Err(e),
                };

                match respond(&request) {
                    Reply::Value(value) => self.reply_value(&request, value).await?,
                    Reply::Result(result) => self.reply(&request, result).await?,
                    Reply::Error { code, message } => {
                        self.reply_error(&request, code, &message).await?;
                    }
                    Reply::Ignore => {}
                }
            }
        })
    }
}
