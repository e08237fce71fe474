//! Identifiers and the outgoing request envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use uuid::Uuid;

/// JSON-RPC protocol version sent on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlates a request with its reply.
///
/// Random UUIDs, so ids are never reused across reconnections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Recover an identifier from the `id` member of a frame.
    ///
    /// Servers echo the id back verbatim, but numeric ids are accepted too.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// The identifier as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire form of a server-assigned handle, kept exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(Number),
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        ///
        /// Servers may hand out strings or numbers; either is sent back in the
        /// form it was received.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(RawId);

        impl $name {
            /// Convert a server-supplied value. Only strings and numbers
            /// are identifiers.
            #[must_use]
            pub fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::String(s) => Some(Self(RawId::Text(s.clone()))),
                    Value::Number(n) => Some(Self(RawId::Number(n.clone()))),
                    _ => None,
                }
            }

            /// The identifier, if the server assigned a string.
            #[must_use]
            pub fn as_str(&self) -> Option<&str> {
                match &self.0 {
                    RawId::Text(s) => Some(s),
                    RawId::Number(_) => None,
                }
            }

            /// The identifier as sent on the wire.
            #[must_use]
            pub fn to_value(&self) -> Value {
                match &self.0 {
                    RawId::Text(s) => Value::String(s.clone()),
                    RawId::Number(n) => Value::Number(n.clone()),
                }
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(RawId::Text(value.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(RawId::Text(value))
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(RawId::Number(value.into()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match &self.0 {
                    RawId::Text(s) => f.write_str(s),
                    RawId::Number(n) => write!(f, "{n}"),
                }
            }
        }
    };
}

opaque_id!(
    /// Server-assigned handle of a remote media object.
    ObjectId
);

opaque_id!(
    /// Server-assigned handle of an event subscription.
    SubscriptionId
);

/// Methods of the media server protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Construct a remote object.
    Create,
    /// Call an operation on a remote object.
    Invoke,
    /// Start receiving events from a remote object.
    Subscribe,
    /// Stop receiving events.
    Unsubscribe,
    /// Destroy a remote object.
    Release,
}

impl Method {
    /// Wire name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Invoke => "invoke",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing JSON-RPC request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Correlation id.
    pub id: CallId,
    /// Method being called.
    pub method: Method,
    /// Method-specific parameters, plus `sessionId` once known.
    pub params: Map<String, Value>,
}

impl Request {
    /// Build a request, attaching the session id when one is known.
    #[must_use]
    pub fn new(
        id: CallId,
        method: Method,
        mut params: Map<String, Value>,
        session_id: Option<&str>,
    ) -> Self {
        if let Some(session_id) = session_id {
            params.insert("sessionId".to_string(), Value::from(session_id));
        }

        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }

    /// Serialize to a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters cannot be serialized.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
