//! Entry point to a media server.

use crate::error::Result;
use crate::pipeline::MediaPipeline;
use kurento_rpc::{ObjectId, RpcTransport};
use tracing::info;

/// Client for one media server.
///
/// Cheap to clone; clones share the underlying connection.
#[derive(Debug, Clone)]
pub struct KurentoClient {
    transport: RpcTransport,
}

impl KurentoClient {
    /// Connect to the media server at `url` with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or no connection could be
    /// established within the reconnection policy.
    pub async fn connect(url: &str) -> Result<Self> {
        let transport = RpcTransport::builder().url(url).build()?;
        transport.connect().await?;

        info!(url, "Connected to media server");
        Ok(Self { transport })
    }

    /// Use an already configured transport.
    #[must_use]
    pub const fn with_transport(transport: RpcTransport) -> Self {
        Self { transport }
    }

    /// The transport every proxy created by this client shares.
    #[must_use]
    pub const fn transport(&self) -> &RpcTransport {
        &self.transport
    }

    /// Create a new media pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create_pipeline(&self) -> Result<MediaPipeline> {
        MediaPipeline::create(&self.transport).await
    }

    /// Wrap an existing pipeline without contacting the server.
    #[must_use]
    pub fn pipeline(&self, id: impl Into<ObjectId>) -> MediaPipeline {
        MediaPipeline::from_id(self.transport.clone(), id)
    }

    /// Stop the transport, failing any outstanding calls.
    pub async fn stop(&self) {
        self.transport.stop().await;
    }
}
