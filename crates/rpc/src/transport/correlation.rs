//! Correlation of in-flight calls with their eventual replies.

use crate::error::{Error, Result};
use crate::protocol::{CallId, Method};
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Sending half of a pending call's result slot.
pub type ResultSender = oneshot::Sender<Result<Value>>;

/// Receiving half of a pending call's result slot.
pub type ResultReceiver = oneshot::Receiver<Result<Value>>;

/// Runs on the dispatcher with a successful reply, before the caller wakes.
pub type ReplyHook = Box<dyn FnOnce(&Value) + Send + Sync>;

struct PendingCall {
    method: Method,
    slot: ResultSender,
    on_reply: Option<ReplyHook>,
    created_at: Instant,
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("method", &self.method)
            .field("has_hook", &self.on_reply.is_some())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Table of calls that were sent and are still waiting for a reply.
///
/// Every entry is fulfilled at most once: resolution removes the entry
/// before sending on its slot, so a duplicate reply finds nothing.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: DashMap<CallId, PendingCall>,
}

impl CorrelationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and return the receiver its caller waits on.
    pub fn register(&self, id: CallId, method: Method) -> ResultReceiver {
        self.insert(id, method, None)
    }

    /// Register a call whose successful reply must be acted on before any
    /// later frame is dispatched.
    ///
    /// `on_reply` is dropped without running if the call fails, is removed
    /// or is cancelled.
    pub fn register_with_hook(
        &self,
        id: CallId,
        method: Method,
        on_reply: ReplyHook,
    ) -> ResultReceiver {
        self.insert(id, method, Some(on_reply))
    }

    fn insert(&self, id: CallId, method: Method, on_reply: Option<ReplyHook>) -> ResultReceiver {
        let (slot, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCall {
                method,
                slot,
                on_reply,
                created_at: Instant::now(),
            },
        );
        rx
    }

    /// Fulfill the call with `id`.
    ///
    /// Returns `false` when no such call is pending. That is not an error:
    /// the reply may belong to a call that timed out or was already answered.
    pub fn resolve(&self, id: &CallId, result: Result<Value>) -> bool {
        let Some((_, call)) = self.pending.remove(id) else {
            warn!(call_id = %id, "Received reply for unknown call");
            return false;
        };

        debug!(
            call_id = %id,
            method = %call.method,
            elapsed = ?call.created_at.elapsed(),
            "Resolved pending call"
        );

        if let (Ok(value), Some(on_reply)) = (&result, call.on_reply) {
            on_reply(value);
        }

        if call.slot.send(result).is_err() {
            debug!(call_id = %id, "Caller stopped waiting before the reply arrived");
        }

        true
    }

    /// Drop the entry for `id` without fulfilling it.
    pub fn remove(&self, id: &CallId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Fulfill every pending call with an error produced by `make_error`.
    ///
    /// Returns how many calls were failed.
    pub fn cancel_all(&self, make_error: impl Fn() -> Error) -> usize {
        let ids: Vec<CallId> = self.pending.iter().map(|e| e.key().clone()).collect();

        let mut cancelled = 0;
        for id in ids {
            if let Some((_, call)) = self.pending.remove(&id) {
                let _ = call.slot.send(Err(make_error()));
                cancelled += 1;
            }
        }

        if cancelled > 0 {
            debug!(cancelled, "Cancelled pending calls");
        }
        cancelled
    }

    /// Whether `id` is still waiting for a reply.
    #[must_use]
    pub fn contains(&self, id: &CallId) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of pending calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no calls are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
