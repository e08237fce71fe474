//! Media elements and the endpoint capabilities they share.

use crate::error::Result;
use crate::ice::IceCandidate;
use crate::object::MediaObject;
use crate::types::MediaType;
use async_trait::async_trait;
use kurento_rpc::SubscriptionId;
use kurento_rpc::transport::EventHandler;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// An object inside a pipeline that media can flow into or out of.
#[async_trait]
pub trait MediaElement: MediaObject {
    /// Send this element's media to `sink`.
    async fn connect(&self, sink: &dyn MediaElement) -> Result<()> {
        self.invoke("connect", json!({ "sink": sink.id() })).await?;
        Ok(())
    }

    /// Stop sending media to `sink`.
    async fn disconnect(&self, sink: &dyn MediaElement) -> Result<()> {
        self.invoke("disconnect", json!({ "sink": sink.id() }))
            .await?;
        Ok(())
    }

    /// Restrict the audio format this element produces.
    async fn set_audio_format(&self, caps: Value) -> Result<()> {
        self.invoke("setAudioFormat", json!({ "caps": caps })).await?;
        Ok(())
    }

    /// Restrict the video format this element produces.
    async fn set_video_format(&self, caps: Value) -> Result<()> {
        self.invoke("setVideoFormat", json!({ "caps": caps })).await?;
        Ok(())
    }

    /// Connections feeding media of `media_type` into this element.
    async fn get_source_connections(&self, media_type: MediaType) -> Result<Value> {
        self.invoke("getSourceConnections", json!({ "mediaType": media_type }))
            .await
    }

    /// Connections taking media of `media_type` out of this element.
    async fn get_sink_connections(&self, media_type: MediaType) -> Result<Value> {
        self.invoke("getSinkConnections", json!({ "mediaType": media_type }))
            .await
    }
}

/// Endpoint reading from or writing to a URI.
#[async_trait]
pub trait UriEndpoint: MediaElement {
    /// The URI the endpoint was created with.
    async fn get_uri(&self) -> Result<String> {
        decode(self.invoke("getUri", Value::Null).await?)
    }

    /// Pause the media flow.
    async fn pause(&self) -> Result<()> {
        self.invoke("pause", Value::Null).await?;
        Ok(())
    }

    /// Stop the media flow.
    async fn stop(&self) -> Result<()> {
        self.invoke("stop", Value::Null).await?;
        Ok(())
    }
}

/// Endpoint that negotiates a media session with a peer.
#[async_trait]
pub trait SessionEndpoint: MediaElement {
    /// Notify `handler` when a media session starts.
    async fn on_media_session_started<H>(&self, handler: H) -> Result<SubscriptionId>
    where
        Self: Sized,
        H: EventHandler,
    {
        self.on_event("MediaSessionStarted", handler).await
    }

    /// Notify `handler` when a media session ends.
    async fn on_media_session_terminated<H>(&self, handler: H) -> Result<SubscriptionId>
    where
        Self: Sized,
        H: EventHandler,
    {
        self.on_event("MediaSessionTerminated", handler).await
    }
}

/// Session endpoint exposed over HTTP.
#[async_trait]
pub trait HttpEndpoint: SessionEndpoint {
    /// URL clients use to reach the endpoint.
    async fn get_url(&self) -> Result<String> {
        decode(self.invoke("getUrl", Value::Null).await?)
    }
}

/// Session endpoint negotiated with SDP offers and answers.
#[async_trait]
pub trait SdpEndpoint: SessionEndpoint {
    /// Generate an SDP offer.
    async fn generate_offer(&self) -> Result<String> {
        decode(self.invoke("generateOffer", Value::Null).await?)
    }

    /// Process a remote offer, returning the SDP answer.
    async fn process_offer(&self, offer: &str) -> Result<String> {
        decode(self.invoke("processOffer", json!({ "offer": offer })).await?)
    }

    /// Process the remote answer to an offer made by this endpoint.
    async fn process_answer(&self, answer: &str) -> Result<String> {
        decode(
            self.invoke("processAnswer", json!({ "answer": answer }))
                .await?,
        )
    }

    /// Local SDP as negotiated so far.
    async fn get_local_session_descriptor(&self) -> Result<String> {
        decode(
            self.invoke("getLocalSessionDescriptor", Value::Null)
                .await?,
        )
    }

    /// Remote SDP as negotiated so far.
    async fn get_remote_session_descriptor(&self) -> Result<String> {
        decode(
            self.invoke("getRemoteSessionDescriptor", Value::Null)
                .await?,
        )
    }

    /// Start gathering local ICE candidates.
    async fn gather_candidates(&self) -> Result<()> {
        self.invoke("gatherCandidates", Value::Null).await?;
        Ok(())
    }

    /// Add a candidate received from the remote peer.
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.invoke("addIceCandidate", json!({ "candidate": candidate }))
            .await?;
        Ok(())
    }
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}
