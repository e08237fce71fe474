//! Media pipelines, the containers every element lives in.

use crate::error::Result;
use crate::object::{MediaObject, RemoteType, media_object};
use kurento_rpc::RpcTransport;
use serde_json::{Map, Value};
use tracing::debug;

media_object! {
    /// Root container for media elements.
    ///
    /// Releasing a pipeline releases every element created in it.
    MediaPipeline
}

impl MediaPipeline {
    /// Create a new pipeline on the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the creation.
    pub async fn create(transport: &RpcTransport) -> Result<Self> {
        debug!("Creating new {}", Self::TYPE_NAME);
        let id = transport.create(Self::TYPE_NAME, Value::Null).await?;
        Ok(Self::from_parts(transport.clone(), id))
    }

    /// Create an element of type `E` in this pipeline.
    ///
    /// The `mediaPipeline` constructor param is filled in from this pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if `constructor_params` is not an object or the
    /// server rejects the creation.
    pub async fn create_element<E: RemoteType>(&self, constructor_params: Value) -> Result<E> {
        let mut params = match constructor_params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(kurento_rpc::Error::InvalidParams(format!(
                    "constructor params must be a JSON object, got {other}"
                ))
                .into());
            }
        };
        params.insert("mediaPipeline".to_string(), self.id().to_value());

        debug!(pipeline = %self.id(), "Creating new {}", E::TYPE_NAME);
        let id = self
            .transport()
            .create(E::TYPE_NAME, Value::Object(params))
            .await?;
        Ok(E::from_parts(self.transport().clone(), id))
    }
}
