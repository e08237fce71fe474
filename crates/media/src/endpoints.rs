//! Endpoints: elements where media enters or leaves a pipeline.

use crate::element::{HttpEndpoint, MediaElement, SdpEndpoint, SessionEndpoint, UriEndpoint};
use crate::error::Result;
use crate::object::{MediaObject, media_object};
use crate::pipeline::MediaPipeline;
use kurento_rpc::SubscriptionId;
use kurento_rpc::transport::EventHandler;
use serde_json::{Value, json};

media_object! {
    /// Plays media from a file or stream URI into the pipeline.
    PlayerEndpoint
}

impl MediaElement for PlayerEndpoint {}
impl UriEndpoint for PlayerEndpoint {}

impl PlayerEndpoint {
    /// Create a player reading from `uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline, uri: &str) -> Result<Self> {
        pipeline.create_element(json!({ "uri": uri })).await
    }

    /// Start playing.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the operation.
    pub async fn play(&self) -> Result<()> {
        self.invoke("play", Value::Null).await?;
        Ok(())
    }

    /// Notify `handler` when the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the subscription.
    pub async fn on_end_of_stream<H: EventHandler>(&self, handler: H) -> Result<SubscriptionId> {
        self.on_event("EndOfStream", handler).await
    }
}

media_object! {
    /// Records the media it receives to a URI.
    RecorderEndpoint
}

impl MediaElement for RecorderEndpoint {}
impl UriEndpoint for RecorderEndpoint {}

impl RecorderEndpoint {
    /// Create a recorder writing to `uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline, uri: &str) -> Result<Self> {
        pipeline.create_element(json!({ "uri": uri })).await
    }

    /// Start recording.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the operation.
    pub async fn record(&self) -> Result<()> {
        self.invoke("record", Value::Null).await?;
        Ok(())
    }
}

media_object! {
    /// Serves the pipeline's media to HTTP GET clients.
    HttpGetEndpoint
}

impl MediaElement for HttpGetEndpoint {}
impl SessionEndpoint for HttpGetEndpoint {}
impl HttpEndpoint for HttpGetEndpoint {}

impl HttpGetEndpoint {
    /// Create an HTTP GET endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline) -> Result<Self> {
        pipeline.create_element(Value::Null).await
    }
}

media_object! {
    /// Accepts media uploaded with HTTP POST.
    HttpPostEndpoint
}

impl MediaElement for HttpPostEndpoint {}
impl SessionEndpoint for HttpPostEndpoint {}
impl HttpEndpoint for HttpPostEndpoint {}

impl HttpPostEndpoint {
    /// Create an HTTP POST endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline) -> Result<Self> {
        pipeline.create_element(Value::Null).await
    }

    /// Notify `handler` when the upload finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the subscription.
    pub async fn on_end_of_stream<H: EventHandler>(&self, handler: H) -> Result<SubscriptionId> {
        self.on_event("EndOfStream", handler).await
    }
}

media_object! {
    /// Exchanges plain RTP with a peer.
    RtpEndpoint
}

impl MediaElement for RtpEndpoint {}
impl SessionEndpoint for RtpEndpoint {}
impl SdpEndpoint for RtpEndpoint {}

impl RtpEndpoint {
    /// Create an RTP endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline) -> Result<Self> {
        pipeline.create_element(Value::Null).await
    }
}

media_object! {
    /// Exchanges media with a WebRTC peer such as a browser.
    WebRtcEndpoint
}

impl MediaElement for WebRtcEndpoint {}
impl SessionEndpoint for WebRtcEndpoint {}
impl SdpEndpoint for WebRtcEndpoint {}

impl WebRtcEndpoint {
    /// Create a WebRTC endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline) -> Result<Self> {
        pipeline.create_element(Value::Null).await
    }

    /// Notify `handler` of each local candidate found while gathering.
    ///
    /// Use [`IceCandidate::from_event`](crate::IceCandidate::from_event) to
    /// read the candidate out of the event.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the subscription.
    pub async fn on_ice_candidate_found<H: EventHandler>(
        &self,
        handler: H,
    ) -> Result<SubscriptionId> {
        self.on_event("IceCandidateFound", handler).await
    }
}
