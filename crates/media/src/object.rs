//! Base proxy for every remote media object.

use crate::error::Result;
use async_trait::async_trait;
use kurento_rpc::transport::EventHandler;
use kurento_rpc::{ObjectId, RpcTransport, SubscriptionId};
use serde_json::Value;

/// Local handle to an object living on the media server.
///
/// A proxy holds only the remote identifier and a transport handle; cloning
/// it does not affect the remote object, and dropping it does not release
/// it.
#[async_trait]
pub trait MediaObject: Send + Sync {
    /// Remote identifier.
    fn id(&self) -> &ObjectId;

    /// Transport the object is reached through.
    fn transport(&self) -> &RpcTransport;

    /// Invoke a remote operation.
    async fn invoke(&self, operation: &str, params: Value) -> Result<Value> {
        Ok(self.transport().invoke(self.id(), operation, params).await?)
    }

    /// Subscribe to events of `event_type` raised by this object.
    async fn on_event<H>(&self, event_type: &str, handler: H) -> Result<SubscriptionId>
    where
        Self: Sized,
        H: EventHandler,
    {
        Ok(self
            .transport()
            .subscribe(self.id(), event_type, handler)
            .await?)
    }

    /// Drop a subscription made through [`on_event`](Self::on_event).
    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<()> {
        Ok(self.transport().unsubscribe(subscription).await?)
    }

    /// Destroy the remote object.
    async fn release(&self) -> Result<()> {
        Ok(self.transport().release(self.id()).await?)
    }
}

/// A proxy type with a fixed remote type name.
pub trait RemoteType: MediaObject + Sized {
    /// Type name sent in `create`.
    const TYPE_NAME: &'static str;

    /// Wrap an existing remote object.
    fn from_parts(transport: RpcTransport, id: ObjectId) -> Self;
}

/// Declares a proxy struct named after its remote type.
macro_rules! media_object {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            id: ::kurento_rpc::ObjectId,
            transport: ::kurento_rpc::RpcTransport,
        }

        impl $name {
            /// Wrap an existing remote object without contacting the server.
            #[must_use]
            pub fn from_id(
                transport: ::kurento_rpc::RpcTransport,
                id: impl Into<::kurento_rpc::ObjectId>,
            ) -> Self {
                Self {
                    id: id.into(),
                    transport,
                }
            }
        }

        impl $crate::object::MediaObject for $name {
            fn id(&self) -> &::kurento_rpc::ObjectId {
                &self.id
            }

            fn transport(&self) -> &::kurento_rpc::RpcTransport {
                &self.transport
            }
        }

        impl $crate::object::RemoteType for $name {
            const TYPE_NAME: &'static str = stringify!($name);

            fn from_parts(
                transport: ::kurento_rpc::RpcTransport,
                id: ::kurento_rpc::ObjectId,
            ) -> Self {
                Self { id, transport }
            }
        }
    };
}

pub(crate) use media_object;
