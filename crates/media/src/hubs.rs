//! Hubs: elements that mix or route media between several peers.

use crate::element::MediaElement;
use crate::error::Result;
use crate::object::media_object;
use crate::pipeline::MediaPipeline;
use serde_json::Value;

media_object! {
    /// Mixes every input into one grid composition.
    Composite
}

media_object! {
    /// Routes any input to any output.
    Dispatcher
}

media_object! {
    /// Broadcasts one selected input to every output.
    DispatcherOneToMany
}

impl MediaElement for Composite {}
impl MediaElement for Dispatcher {}
impl MediaElement for DispatcherOneToMany {}

impl Composite {
    /// Create a composite hub.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline) -> Result<Self> {
        pipeline.create_element(Value::Null).await
    }
}

impl Dispatcher {
    /// Create a dispatcher hub.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline) -> Result<Self> {
        pipeline.create_element(Value::Null).await
    }
}

impl DispatcherOneToMany {
    /// Create a one-to-many dispatcher hub.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(pipeline: &MediaPipeline) -> Result<Self> {
        pipeline.create_element(Value::Null).await
    }
}
