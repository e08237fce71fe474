//! Filters: elements that process media passing through them.

use crate::element::MediaElement;
use crate::error::Result;
use crate::object::{MediaObject, media_object};
use crate::pipeline::MediaPipeline;
use kurento_rpc::SubscriptionId;
use kurento_rpc::transport::EventHandler;
use serde_json::{Value, json};

media_object! {
    /// Runs an arbitrary GStreamer pipeline description over the media.
    GStreamerFilter
}

impl MediaElement for GStreamerFilter {}

impl GStreamerFilter {
    /// Create a filter running the GStreamer `command`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline, command: &str) -> Result<Self> {
        pipeline
            .create_element(json!({ "command": command }))
            .await
    }
}

media_object! {
    /// Overlays an image on every detected face.
    FaceOverlayFilter
}

impl MediaElement for FaceOverlayFilter {}

impl FaceOverlayFilter {
    /// Create a face overlay filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline) -> Result<Self> {
        pipeline.create_element(Value::Null).await
    }

    /// Set the image drawn over faces.
    ///
    /// Offsets and size are percentages of the detected face box.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the operation.
    pub async fn set_overlayed_image(
        &self,
        uri: &str,
        offset_x: f64,
        offset_y: f64,
        width: f64,
        height: f64,
    ) -> Result<()> {
        self.invoke(
            "setOverlayedImage",
            json!({
                "uri": uri,
                "offsetXPercent": offset_x,
                "offsetYPercent": offset_y,
                "widthPercent": width,
                "heightPercent": height,
            }),
        )
        .await?;
        Ok(())
    }
}

media_object! {
    /// Detects bar and QR codes in the video.
    ZBarFilter
}

impl MediaElement for ZBarFilter {}

impl ZBarFilter {
    /// Create a code detection filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline) -> Result<Self> {
        pipeline.create_element(Value::Null).await
    }

    /// Notify `handler` for each code detected.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the subscription.
    pub async fn on_code_found<H: EventHandler>(&self, handler: H) -> Result<SubscriptionId> {
        self.on_event("CodeFound", handler).await
    }
}
