//! JSON-RPC transport for Kurento-style media servers.
//!
//! All calls to the media server are multiplexed over one long-lived
//! WebSocket. Replies are correlated to their calls by id, events pushed by
//! the server are routed to per-object subscribers, and the connection is
//! re-established transparently when it drops.
//!
//! # Features
//!
//! - **Lazy Connection**: The socket is opened by the first call
//! - **Transparent Reconnection**: Calls in flight survive a dropped connection
//! - **Session Tracking**: The server-assigned session id is attached to every request
//! - **Ordered Events**: Each subscriber sees its events in arrival order
//!
//! # Example
//!
//! ```no_run
//! use kurento_rpc::{Event, RpcTransport};
//! use serde_json::json;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = RpcTransport::builder()
//!         .url("ws://localhost:8888/kurento")
//!         .build()?;
//!
//!     let pipeline = transport.create("MediaPipeline", json!({})).await?;
//!     let player = transport
//!         .create(
//!             "PlayerEndpoint",
//!             json!({"mediaPipeline": pipeline, "uri": "file:///tmp/video.webm"}),
//!         )
//!         .await?;
//!
//!     transport
//!         .subscribe(&player, "EndOfStream", |event: Event| {
//!             println!("finished: {}", event.value);
//!         })
//!         .await?;
//!     transport.invoke(&player, "play", json!({})).await?;
//!
//!     transport.release(&pipeline).await?;
//!     transport.stop().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use error::{ConnectionError, Error, ProtocolError, Result, RpcError};
pub use protocol::{CallId, Event, Method, ObjectId, SubscriptionId};
pub use transport::{
    client::{PendingReply, RequestOptions, RpcTransport, TransportBuilder, TransportConfig},
    connection::{Connection, Connector, WebSocketConnector},
    reconnect::{ConnectionState, ReconnectPolicy},
    subscriptions::EventHandler,
};

// Re-export dependencies that are part of our public API
pub use serde_json::Value;
