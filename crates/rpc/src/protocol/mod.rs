//! Protocol layer for the media server RPC.
//!
//! This module contains the wire-level definitions:
//! - Identifiers and the outgoing request envelope
//! - Classification of incoming frames into replies, errors and events

pub mod incoming;
pub mod message;

pub use incoming::{EVENT_METHOD, Event, Incoming};
pub use message::{CallId, JSONRPC_VERSION, Method, ObjectId, Request, SubscriptionId};
