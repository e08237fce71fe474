//! RPC transport client.

use crate::error::{ConnectionError, Error, ProtocolError, Result};
use crate::protocol::{CallId, Incoming, Method, ObjectId, Request, SubscriptionId};
use crate::transport::connection::{Connection, Connector, WebSocketConnector};
use crate::transport::correlation::{CorrelationTable, ReplyHook, ResultReceiver};
use crate::transport::reconnect::{ConnectionState, ReconnectPolicy};
use crate::transport::session::SessionState;
use crate::transport::subscriptions::{EventHandler, SubscriptionRegistry};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value, json};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep, timeout};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, instrument, warn};

/// A connection that stays up this long resets the failure count even if
/// nothing was received on it.
const STABLE_CONNECTION: Duration = Duration::from_secs(5);

/// Configuration for the RPC transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for establishing (and gracefully closing) a connection.
    pub connect_timeout: Duration,
    /// Reconnection policy.
    pub reconnect: ReconnectPolicy,
    /// Interval between keepalive pings. `None` disables them.
    pub keepalive_interval: Option<Duration>,
    /// Timeout applied to calls that do not specify one. `None` waits forever.
    pub default_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            keepalive_interval: Some(Duration::from_secs(30)),
            default_timeout: None,
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Give up waiting after this long and purge the pending entry.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Options with a reply timeout.
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Builder for creating RPC transports.
pub struct TransportBuilder {
    url: Option<String>,
    connector: Option<Arc<dyn Connector>>,
    config: TransportConfig,
}

impl TransportBuilder {
    /// Create a new transport builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: None,
            connector: None,
            config: TransportConfig::default(),
        }
    }

    /// Set the media server WebSocket URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Use a custom connector instead of dialing a URL.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the reconnection policy.
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Set or disable the keepalive interval.
    #[must_use]
    pub const fn keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    /// Set the default per-call timeout.
    #[must_use]
    pub const fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = Some(timeout);
        self
    }

    /// Build the transport.
    ///
    /// The connection is not opened until the first call or
    /// [`RpcTransport::connect`]. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if neither a URL nor a connector was given, or the
    /// URL is not a valid WebSocket URL.
    pub fn build(self) -> Result<RpcTransport> {
        let connector: Arc<dyn Connector> = match (self.connector, self.url) {
            (Some(connector), _) => connector,
            (None, Some(url)) => Arc::new(WebSocketConnector::new(
                &url,
                self.config.connect_timeout,
            )?),
            (None, None) => {
                return Err(ConnectionError::InvalidUrl("no URL configured".to_string()).into());
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shutdown = CancellationToken::new();

        let shared = Arc::new(Shared {
            config: self.config,
            pending: CorrelationTable::new(),
            subscriptions: SubscriptionRegistry::new(),
            session: SessionState::new(),
            outbound: outbound_tx,
            state,
            start: Notify::new(),
            shutdown: shutdown.clone(),
            terminal: RwLock::new(None),
        });

        let supervisor = Supervisor {
            shared: Arc::clone(&shared),
            connector,
            outbound: outbound_rx,
            unsent: None,
            received: false,
        };
        let handle = tokio::spawn(supervisor.run());

        Ok(RpcTransport {
            shared,
            supervisor: Arc::new(Mutex::new(Some(handle))),
            _shutdown_on_drop: Arc::new(shutdown.drop_guard()),
        })
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reply to a request that has been queued for sending.
///
/// Dropping it does not purge the pending entry; a late reply is simply
/// discarded when it arrives.
#[derive(Debug)]
pub struct PendingReply {
    id: CallId,
    rx: ResultReceiver,
}

impl PendingReply {
    /// Identifier the request was sent with.
    #[must_use]
    pub const fn id(&self) -> &CallId {
        &self.id
    }
}

impl Future for PendingReply {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(Error::ChannelClosed)))
    }
}

/// Client for a media server, multiplexing all calls over one connection.
///
/// Cheap to clone; all clones share the connection. The transport shuts
/// down when [`stop`](Self::stop) is called or the last clone is dropped.
///
/// Event handlers are owned by the transport, so a handler that captures a
/// clone (to trickle ICE candidates back, for instance) keeps the transport
/// alive after every other handle is gone. Such transports must be shut
/// down with [`stop`](Self::stop), which also drops the handlers.
#[derive(Clone)]
pub struct RpcTransport {
    shared: Arc<Shared>,
    supervisor: Arc<Mutex<Option<JoinHandle<()>>>>,
    _shutdown_on_drop: Arc<DropGuard>,
}

impl fmt::Debug for RpcTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcTransport")
            .field("state", &self.state())
            .field("pending_calls", &self.pending_calls())
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

impl RpcTransport {
    /// Create a new transport builder.
    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    /// Open the connection now and wait until it is established.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport was stopped or the reconnection
    /// policy gave up before a connection succeeded.
    pub async fn connect(&self) -> Result<()> {
        self.check_terminal()?;
        self.shared.start.notify_one();

        let mut states = self.shared.state.subscribe();
        let state = *states
            .wait_for(|state| *state == ConnectionState::Connected || state.is_terminal())
            .await
            .map_err(|_| Error::ChannelClosed)?;

        if state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(self.terminal_error())
        }
    }

    /// Create a remote object, returning its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rpc`] if the server fails to construct the object.
    #[instrument(skip(self, constructor_params))]
    pub async fn create(&self, type_name: &str, constructor_params: Value) -> Result<ObjectId> {
        let constructor_params = object_params(constructor_params, "constructor params")?;
        let value = self
            .rpc(
                Method::Create,
                json!({
                    "type": type_name,
                    "constructorParams": constructor_params,
                }),
            )
            .await?;

        ObjectId::from_value(&value).ok_or_else(|| unexpected(Method::Create, value))
    }

    /// Invoke `operation` on a remote object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rpc`] if the server rejects the operation.
    #[instrument(skip(self, operation_params))]
    pub async fn invoke(
        &self,
        object: &ObjectId,
        operation: &str,
        operation_params: Value,
    ) -> Result<Value> {
        let operation_params = object_params(operation_params, "operation params")?;
        self.rpc(
            Method::Invoke,
            json!({
                "object": object,
                "operation": operation,
                "operationParams": operation_params,
            }),
        )
        .await
    }

    /// Subscribe to `event_type` events raised by `object`.
    ///
    /// The handler is keyed by object: subscribing again to the same object
    /// replaces the previous handler. It is registered by the dispatcher as
    /// the reply is processed, so events pushed right behind the reply are
    /// delivered.
    ///
    /// A handler that holds a clone of this transport keeps it alive; call
    /// [`stop`](Self::stop) to shut such a transport down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rpc`] if the server rejects the subscription.
    #[instrument(skip(self, handler))]
    pub async fn subscribe<H>(
        &self,
        object: &ObjectId,
        event_type: &str,
        handler: H,
    ) -> Result<SubscriptionId>
    where
        H: EventHandler,
    {
        let shared = Arc::downgrade(&self.shared);
        let observed = object.clone();
        let registered_type = event_type.to_string();
        let on_reply: ReplyHook = Box::new(move |value| {
            let (Some(shared), Some(id)) = (shared.upgrade(), SubscriptionId::from_value(value))
            else {
                return;
            };
            shared
                .subscriptions
                .register(observed, id, registered_type, handler);
        });

        let pending = self.enqueue(
            Method::Subscribe,
            json!({
                "object": object,
                "type": event_type,
            }),
            Some(on_reply),
        )?;
        let value = self
            .await_reply(Method::Subscribe, pending, self.default_options())
            .await?;

        let id = SubscriptionId::from_value(&value)
            .ok_or_else(|| unexpected(Method::Subscribe, value))?;

        // Teardown may have cleared the registry before the reply was handled.
        if let Err(e) = self.check_terminal() {
            self.shared.subscriptions.unregister(&id);
            return Err(e);
        }

        debug!(object = %object, subscription = %id, "Subscribed");
        Ok(id)
    }

    /// Drop a subscription and tell the server.
    ///
    /// Unknown subscription ids are ignored without contacting the server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rpc`] if the server rejects the request.
    #[instrument(skip(self))]
    pub async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<()> {
        let Some(object) = self.shared.subscriptions.unregister(subscription) else {
            debug!(subscription = %subscription, "Ignoring unsubscribe for unknown subscription");
            return Ok(());
        };

        self.rpc(
            Method::Unsubscribe,
            json!({
                "subscription": subscription,
                "object": object,
            }),
        )
        .await?;
        Ok(())
    }

    /// Destroy a remote object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rpc`] if the object does not exist on the server.
    #[instrument(skip(self))]
    pub async fn release(&self, object: &ObjectId) -> Result<()> {
        self.rpc(Method::Release, json!({ "object": object }))
            .await?;
        Ok(())
    }

    /// Send a call and wait for its reply, honoring the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the call cannot be sent, is rejected, or times out.
    pub async fn rpc(&self, method: Method, params: Value) -> Result<Value> {
        self.rpc_with_options(method, params, self.default_options())
            .await
    }

    /// Send a call and wait for its reply.
    ///
    /// On timeout the pending entry is purged, so a reply arriving later is
    /// logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the call cannot be sent, is rejected, or times out.
    pub async fn rpc_with_options(
        &self,
        method: Method,
        params: Value,
        options: RequestOptions,
    ) -> Result<Value> {
        let pending = self.send_request(method, params)?;
        self.await_reply(method, pending, options).await
    }

    /// Queue a call for sending and return the future of its reply.
    ///
    /// Does not wait for the connection or the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the params are not an object, serialization
    /// fails, or the transport is stopped or failed.
    pub fn send_request(&self, method: Method, params: Value) -> Result<PendingReply> {
        self.enqueue(method, params, None)
    }

    fn enqueue(
        &self,
        method: Method,
        params: Value,
        on_reply: Option<ReplyHook>,
    ) -> Result<PendingReply> {
        let params = object_params(params, "params")?;
        self.check_terminal()?;

        let id = CallId::new();
        let session_id = self.shared.session.session_id();
        let frame = Request::new(id.clone(), method, params, session_id.as_deref()).to_frame()?;

        let rx = match on_reply {
            Some(on_reply) => self
                .shared
                .pending
                .register_with_hook(id.clone(), method, on_reply),
            None => self.shared.pending.register(id.clone(), method),
        };

        // Teardown fails every registered call; anything registered after
        // it must be failed here instead.
        if let Err(e) = self.check_terminal() {
            self.shared.pending.remove(&id);
            return Err(e);
        }

        self.shared.start.notify_one();
        if self.shared.outbound.send(frame).is_err() {
            self.shared.pending.remove(&id);
            return Err(self.terminal_error());
        }

        debug!(call_id = %id, method = %method, "Queued request");
        Ok(PendingReply { id, rx })
    }

    async fn await_reply(
        &self,
        method: Method,
        mut pending: PendingReply,
        options: RequestOptions,
    ) -> Result<Value> {
        let Some(limit) = options.timeout else {
            return pending.await;
        };

        if let Ok(result) = timeout(limit, &mut pending).await {
            return result;
        }

        if self.shared.pending.remove(pending.id()) {
            warn!(call_id = %pending.id(), method = %method, "Call timed out");
            Err(Error::Timeout(limit))
        } else {
            // Resolved while the timer fired.
            pending.await
        }
    }

    fn default_options(&self) -> RequestOptions {
        RequestOptions {
            timeout: self.shared.config.default_timeout,
        }
    }

    /// Stop the transport.
    ///
    /// Closes the connection, fails every pending call with
    /// [`Error::Teardown`] and drops all subscriptions.
    pub async fn stop(&self) {
        self.shared.shutdown.cancel();

        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Transport supervisor ended abnormally: {}", e);
            }
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state transitions.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Session id assigned by the server, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.shared.session.session_id()
    }

    /// Number of calls waiting for a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// Number of active event subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.len()
    }

    fn check_terminal(&self) -> Result<()> {
        match self.shared.terminal.read().as_ref() {
            Some(terminal) => Err(terminal.to_error()),
            None => Ok(()),
        }
    }

    fn terminal_error(&self) -> Error {
        self.shared
            .terminal
            .read()
            .as_ref()
            .map_or(Error::Teardown, Terminal::to_error)
    }
}

/// Why the transport stopped for good.
#[derive(Debug, Clone)]
enum Terminal {
    Stopped,
    Failed(ConnectionError),
}

impl Terminal {
    fn to_error(&self) -> Error {
        match self {
            Self::Stopped => Error::Teardown,
            Self::Failed(e) => Error::Connection(e.clone()),
        }
    }
}

/// State shared between transport handles and the supervisor task.
struct Shared {
    config: TransportConfig,
    pending: CorrelationTable,
    subscriptions: SubscriptionRegistry,
    session: SessionState,
    outbound: mpsc::UnboundedSender<String>,
    state: watch::Sender<ConnectionState>,
    start: Notify,
    shutdown: CancellationToken,
    terminal: RwLock<Option<Terminal>>,
}

impl Shared {
    fn set_state(&self, new: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == new {
                false
            } else {
                debug!(from = %state, to = %new, "Connection state changed");
                *state = new;
                true
            }
        });
    }

    /// Route one received frame.
    fn dispatch(&self, text: &str) {
        debug!(frame = text, "Received frame");

        let incoming = match Incoming::parse(text) {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!(error = %e, "Discarding unrecognized frame");
                return;
            }
        };

        match incoming {
            Incoming::Event { event, session_id } => {
                if let Some(session_id) = session_id {
                    self.session.update(&session_id);
                }
                let object = event.object.clone();
                let event_type = event.event_type.clone();
                if !self.subscriptions.deliver(event) {
                    warn!(
                        object = %object,
                        event_type = %event_type,
                        "Discarding event for unsubscribed object"
                    );
                }
            }
            Incoming::Error { id, error } => {
                debug!(call_id = %id, message = %error.message, "Call rejected by server");
                self.pending.resolve(&id, Err(error.into()));
            }
            Incoming::Reply {
                id,
                value,
                session_id,
            } => {
                // Before waking the caller, so its next request carries it.
                if let Some(session_id) = session_id {
                    self.session.update(&session_id);
                }
                self.pending.resolve(&id, Ok(value));
            }
        }
    }
}

enum Disconnect {
    Lost(ConnectionError),
    Shutdown,
}

/// Owns the connection: reconnects, writes queued frames and dispatches
/// everything received.
struct Supervisor {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    outbound: mpsc::UnboundedReceiver<String>,
    /// Frame whose write failed; re-sent first on the next connection.
    unsent: Option<String>,
    /// Whether the current connection has delivered any frame.
    received: bool,
}

impl Supervisor {
    async fn run(mut self) {
        tokio::select! {
            biased;
            () = self.shared.shutdown.cancelled() => return self.teardown(),
            () = self.shared.start.notified() => {}
        }

        let mut failures: u32 = 0;
        loop {
            self.shared.set_state(ConnectionState::Connecting);

            let attempt = tokio::select! {
                biased;
                () = self.shared.shutdown.cancelled() => None,
                result = self.connector.connect() => Some(result),
            };

            match attempt {
                None => return self.teardown(),
                Some(Ok(conn)) => {
                    info!(pending = self.shared.pending.len(), "Connected to media server");
                    self.shared.set_state(ConnectionState::Connected);
                    let connected_at = Instant::now();
                    self.received = false;

                    match self.drive(conn).await {
                        Disconnect::Shutdown => return self.teardown(),
                        Disconnect::Lost(e) => {
                            warn!(
                                error = %e,
                                pending = self.shared.pending.len(),
                                "Connection to media server lost"
                            );
                            self.shared.set_state(ConnectionState::Lost);

                            // Connections dropped before proving usable count
                            // as failed attempts.
                            if self.received || connected_at.elapsed() >= STABLE_CONNECTION {
                                failures = 0;
                            } else {
                                failures += 1;
                                if self.shared.config.reconnect.is_exhausted(failures) {
                                    return self.fail(ConnectionError::RetriesExhausted {
                                        attempts: failures,
                                        last_error: e.to_string(),
                                    });
                                }
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    failures += 1;
                    warn!(attempt = failures, error = %e, "Connection attempt failed");

                    if self.shared.config.reconnect.is_exhausted(failures) {
                        return self.fail(ConnectionError::RetriesExhausted {
                            attempts: failures,
                            last_error: e.to_string(),
                        });
                    }
                }
            }

            let delay = self.shared.config.reconnect.delay_for(failures);
            if !delay.is_zero() {
                debug!(?delay, "Waiting before reconnecting");
                tokio::select! {
                    biased;
                    () = self.shared.shutdown.cancelled() => return self.teardown(),
                    () = sleep(delay) => {}
                }
            }
        }
    }

    async fn drive(&mut self, mut conn: Box<dyn Connection>) -> Disconnect {
        if let Some(frame) = self.unsent.take() {
            debug!("Re-sending frame that failed before reconnecting");
            if let Err(e) = conn.send(frame.clone()).await {
                self.unsent = Some(frame);
                return Disconnect::Lost(e);
            }
        }

        let mut keepalive = self.shared.config.keepalive_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                biased;
                () = self.shared.shutdown.cancelled() => {
                    self.shared.set_state(ConnectionState::Closing);
                    self.close(&mut *conn).await;
                    return Disconnect::Shutdown;
                }
                incoming = conn.recv() => match incoming {
                    Some(Ok(text)) => {
                        self.received = true;
                        self.shared.dispatch(&text);
                    }
                    Some(Err(e)) => return Disconnect::Lost(e),
                    None => return Disconnect::Lost(ConnectionError::Closed),
                },
                frame = self.outbound.recv() => {
                    let Some(frame) = frame else {
                        self.close(&mut *conn).await;
                        return Disconnect::Shutdown;
                    };
                    if let Err(e) = conn.send(frame.clone()).await {
                        self.unsent = Some(frame);
                        return Disconnect::Lost(e);
                    }
                }
                () = tick(keepalive.as_mut()) => {
                    if let Err(e) = conn.ping().await {
                        return Disconnect::Lost(e);
                    }
                }
            }
        }
    }

    async fn close(&self, conn: &mut dyn Connection) {
        match timeout(self.shared.config.connect_timeout, conn.close()).await {
            Ok(Ok(())) => debug!("Connection closed"),
            Ok(Err(e)) => debug!(error = %e, "Error while closing connection"),
            Err(_) => warn!("Timed out closing connection"),
        }
    }

    fn teardown(&self) {
        self.shared.set_state(ConnectionState::Closing);
        *self.shared.terminal.write() = Some(Terminal::Stopped);

        let cancelled = self.shared.pending.cancel_all(|| Error::Teardown);
        self.shared.subscriptions.clear();
        self.shared.set_state(ConnectionState::Closed);

        info!(cancelled, "Transport stopped");
    }

    fn fail(&self, error: ConnectionError) {
        error!(error = %error, "Giving up on media server connection");
        *self.shared.terminal.write() = Some(Terminal::Failed(error.clone()));

        let cancelled = self
            .shared
            .pending
            .cancel_all(|| Error::Connection(error.clone()));
        self.shared.subscriptions.clear();
        self.shared.set_state(ConnectionState::Failed);

        debug!(cancelled, "Failed pending calls");
    }
}

async fn tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn object_params(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(Error::InvalidParams(format!(
            "{what} must be a JSON object, got {other}"
        ))),
    }
}

fn unexpected(method: Method, value: Value) -> Error {
    ProtocolError::UnexpectedResult {
        method: method.to_string(),
        value,
    }
    .into()
}
