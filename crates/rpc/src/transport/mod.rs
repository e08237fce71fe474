//! Transport layer for the media server RPC.
//!
//! This module owns the single connection to the server and everything
//! multiplexed over it: correlating replies to calls, routing pushed events
//! to subscribers, tracking the session, and reconnecting when the
//! connection drops.

pub mod client;
pub mod connection;
pub mod correlation;
pub mod reconnect;
pub mod session;
pub mod subscriptions;

pub use client::{PendingReply, RequestOptions, RpcTransport, TransportBuilder, TransportConfig};
pub use connection::{Connection, Connector, WebSocketConnection, WebSocketConnector};
pub use correlation::CorrelationTable;
pub use reconnect::{ConnectionState, ReconnectPolicy};
pub use session::SessionState;
pub use subscriptions::{EventHandler, SubscriptionRegistry};
