//! Error types for media object proxies.

use thiserror::Error;

/// Result type alias for media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying call failed.
    #[error(transparent)]
    Rpc(#[from] kurento_rpc::Error),

    /// A reply or event did not decode into the expected type.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl Error {
    /// Returns the server-side rejection if this error carries one.
    #[must_use]
    pub const fn as_rpc(&self) -> Option<&kurento_rpc::RpcError> {
        match self {
            Self::Rpc(err) => err.as_rpc(),
            Self::Codec(_) => None,
        }
    }
}
