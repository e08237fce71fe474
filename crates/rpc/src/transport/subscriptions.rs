//! Registry routing pushed events to their handlers.

use crate::protocol::{Event, ObjectId, SubscriptionId};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Callback invoked for every event pushed for a subscribed object.
///
/// Errors and panics are logged and never reach the dispatcher.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one event.
    async fn handle(&self, event: Event) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(Event) + Send + Sync + 'static,
{
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        self(event);
        Ok(())
    }
}

#[derive(Debug)]
struct Subscription {
    id: SubscriptionId,
    event_type: String,
    queue: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
}

/// Maps an observed object to the one handler registered for it.
///
/// Each subscription owns a worker task, so events for one object are
/// handled in arrival order while different objects proceed in parallel.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_object: DashMap<ObjectId, Subscription>,
    objects: DashMap<SubscriptionId, ObjectId>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events from `object`.
    ///
    /// A handler already registered for the same object is replaced and its
    /// subscription id returned; that id is forgotten, so unsubscribing it
    /// later is a no-op.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register<H>(
        &self,
        object: ObjectId,
        id: SubscriptionId,
        event_type: String,
        handler: H,
    ) -> Option<SubscriptionId>
    where
        H: EventHandler,
    {
        let cancel = CancellationToken::new();
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_handler(object.clone(), handler, rx, cancel.clone()));

        self.objects.insert(id.clone(), object.clone());
        let previous = self.by_object.insert(
            object.clone(),
            Subscription {
                id: id.clone(),
                event_type,
                queue,
                cancel,
            },
        )?;

        previous.cancel.cancel();
        if previous.id != id {
            self.objects
                .remove_if(&previous.id, |_, observed| *observed == object);
        }
        warn!(
            object = %object,
            replaced = %previous.id,
            event_type = %previous.event_type,
            "Replaced existing event handler"
        );
        Some(previous.id)
    }

    /// Queue `event` for the handler registered for its object.
    ///
    /// Never blocks. Returns `false` when nobody is subscribed.
    pub fn deliver(&self, event: Event) -> bool {
        let Some(subscription) = self.by_object.get(&event.object) else {
            return false;
        };

        if subscription.event_type != event.event_type {
            debug!(
                object = %event.object,
                subscribed = %subscription.event_type,
                received = %event.event_type,
                "Delivering event of a different type than subscribed"
            );
        }

        subscription.queue.send(event).is_ok()
    }

    /// Remove the subscription `id`, returning the object it observed.
    ///
    /// Queued events not yet handled are discarded.
    pub fn unregister(&self, id: &SubscriptionId) -> Option<ObjectId> {
        let (_, object) = self.objects.remove(id)?;
        if let Some((_, subscription)) = self
            .by_object
            .remove_if(&object, |_, subscription| subscription.id == *id)
        {
            subscription.cancel.cancel();
        }
        Some(object)
    }

    /// Object observed by subscription `id`.
    #[must_use]
    pub fn object_for(&self, id: &SubscriptionId) -> Option<ObjectId> {
        self.objects.get(id).map(|entry| entry.value().clone())
    }

    /// Active subscription for `object`.
    #[must_use]
    pub fn subscription_for(&self, object: &ObjectId) -> Option<SubscriptionId> {
        self.by_object.get(object).map(|entry| entry.id.clone())
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        for entry in &self.by_object {
            entry.cancel.cancel();
        }
        self.by_object.clear();
        self.objects.clear();
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_object.len()
    }

    /// Whether there are no active subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_object.is_empty()
    }
}

async fn run_handler<H: EventHandler>(
    object: ObjectId,
    handler: H,
    mut events: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let event_type = event.event_type.clone();
        match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    object = %object,
                    event_type = %event_type,
                    error = %e,
                    "Event handler failed"
                );
            }
            Err(_) => {
                error!(
                    object = %object,
                    event_type = %event_type,
                    "Event handler panicked"
                );
            }
        }
    }

    debug!(object = %object, "Event handler stopped");
}
