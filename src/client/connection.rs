//! Connection manager: one logical connection to the scoreboard server that hides
//! transient network failure from its callers.
//!
//! The mutable core sits behind a single [`std::sync::Mutex`]. It is never held across
//! an `.await` nor while user callbacks run, so every transition runs to completion
//! before the next one starts. Timers and I/O run in spawned tasks tagged with the
//! connection generation that created them; a task whose generation is stale is
//! ignored when it reports back.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::{
    client::{
        backoff::ReconnectPolicy,
        queue::{OperationQueue, QueuedOperation},
        transport::{Connector, TokenProvider, Transport, TransportError, connect_url},
    },
    dto::ws::EventEnvelope,
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Client-visible connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// Idle; nothing is retried until `connect()`.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Operations go straight to the server.
    Connected,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
    /// The last attempt failed; a reconnect is scheduled right away.
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Last failure recorded by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// No success signal arrived before the connect timeout.
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
    /// The transport failed to connect or broke.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server closed the channel.
    #[error("connection closed by server")]
    ClosedByServer,
    /// Automatic recovery stopped; only an explicit `connect()` resumes it.
    #[error("gave up after {0} reconnect attempts")]
    AttemptsExhausted(u32),
}

/// Settings for a [`ConnectionManager`].
#[derive(Clone)]
pub struct ConnectionConfig {
    url: String,
    room: Option<String>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    connect_timeout: Duration,
    reconnect: ReconnectPolicy,
    max_attempts: u32,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("room", &self.room)
            .field("token_provider", &self.token_provider.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect", &self.reconnect)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl ConnectionConfig {
    /// Defaults: 20 s connect timeout, 10 reconnect attempts, the default [`ReconnectPolicy`].
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            room: None,
            token_provider: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Join `room` instead of the server's default room.
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Attach the token from `provider` to every connection attempt.
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Give up on a single attempt after `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Replace the backoff policy.
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Reconnect attempts allowed before giving up. Clamped to at least one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Per-attempt timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Backoff policy between attempts.
    pub fn reconnect_policy(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    /// Reconnect attempts allowed before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn resolve_url(&self) -> String {
        let token = self
            .token_provider
            .as_ref()
            .and_then(|provider| provider.token());
        connect_url(&self.url, self.room.as_deref(), token.as_deref())
    }
}

/// Per-call options for [`ConnectionManager::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Buffer the operation when not connected instead of dropping it.
    pub queue_if_disconnected: bool,
    /// Failed transmissions tolerated for a queued operation.
    pub max_retries: u32,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            queue_if_disconnected: true,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// What [`ConnectionManager::send`] did with an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the live connection.
    Sent,
    /// Buffered until the next successful connect.
    Queued,
    /// Not connected and queuing was not requested.
    Dropped,
}

/// Handle returned by the subscription methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;
type StateHandler = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Frame handed to the I/O task together with the operation it encodes, so a failed
/// write can be put back in the queue.
struct Outbound {
    operation: QueuedOperation,
    frame: String,
}

/// Why an I/O task stopped.
enum Closed {
    /// Local teardown; no recovery.
    Local,
    /// Server close or transport failure; reconnect.
    Remote(ConnectionError),
}

struct Core {
    state: ConnectionState,
    generation: u64,
    attempts: u32,
    last_error: Option<ConnectionError>,
    queue: OperationQueue,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    close_signal: Option<oneshot::Sender<()>>,
    timer: Option<JoinHandle<()>>,
    handlers: HashMap<String, Vec<(SubscriptionId, EventHandler)>>,
    state_handlers: Vec<(SubscriptionId, StateHandler)>,
    next_id: u64,
}

impl Core {
    fn allocate_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Stop the I/O task of the current connection, if any.
    fn teardown(&mut self) {
        self.outbound = None;
        if let Some(close) = self.close_signal.take() {
            let _ = close.send(());
        }
    }
}

struct Inner {
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    core: Mutex<Core>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Transitions collected under the lock and announced after it is released.
#[derive(Default)]
struct Pending {
    transitions: Vec<ConnectionState>,
}

/// Cloneable handle on one logical connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

impl ConnectionManager {
    /// Build a manager in the `Disconnected` state. Nothing happens until [`connect`](Self::connect).
    pub fn new(connector: Arc<dyn Connector>, config: ConnectionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                core: Mutex::new(Core {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    attempts: 0,
                    last_error: None,
                    queue: OperationQueue::default(),
                    outbound: None,
                    close_signal: None,
                    timer: None,
                    handlers: HashMap::new(),
                    state_handlers: Vec::new(),
                    next_id: 0,
                }),
                state_tx,
            }),
        }
    }

    /// Configuration this manager was built with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Error behind the latest failure, cleared once connected again.
    pub fn last_error(&self) -> Option<ConnectionError> {
        self.lock().last_error.clone()
    }

    /// Operations waiting for a connection.
    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Receiver that always holds the current state.
    pub fn state_watcher(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Start connecting, tearing down any existing connection first.
    ///
    /// Resets the reconnect attempt counter, so this also resumes after the manager
    /// gave up. Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut pending = Pending::default();
        {
            let mut core = self.lock();
            core.cancel_timer();
            core.teardown();
            core.generation += 1;
            core.attempts = 0;
            info!(generation = core.generation, "connecting");
            self.start_attempt_locked(&mut core, &mut pending);
        }
        self.announce(pending);
    }

    /// Tear down the connection and stop all automatic reconnection.
    pub fn disconnect(&self) {
        let mut pending = Pending::default();
        {
            let mut core = self.lock();
            core.cancel_timer();
            core.teardown();
            core.generation += 1;
            if core.state != ConnectionState::Disconnected {
                info!("disconnecting");
            }
            self.transition_locked(&mut core, &mut pending, ConnectionState::Disconnected);
        }
        self.announce(pending);
    }

    /// Send an operation now, or buffer it for the next connection.
    pub fn send(&self, name: &str, payload: Value, options: SendOptions) -> SendOutcome {
        let mut core = self.lock();
        let operation = QueuedOperation::new(name, payload, options.max_retries);

        let operation = if core.state == ConnectionState::Connected {
            match Self::transmit_locked(&core, operation) {
                Ok(()) => return SendOutcome::Sent,
                Err(operation) => operation,
            }
        } else {
            operation
        };

        if options.queue_if_disconnected {
            debug!(event = %operation.name, state = %core.state, "queueing operation");
            core.queue.push(operation);
            SendOutcome::Queued
        } else {
            debug!(event = %operation.name, state = %core.state, "dropping operation while not connected");
            SendOutcome::Dropped
        }
    }

    /// Register `handler` for inbound `event` frames.
    ///
    /// Handlers outlive individual connections and keep firing after reconnects.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut core = self.lock();
        let id = core.allocate_id();
        core.handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove one handler for `event`, or all of them when `id` is `None`.
    pub fn unsubscribe(&self, event: &str, id: Option<SubscriptionId>) {
        let mut core = self.lock();
        match id {
            None => {
                core.handlers.remove(event);
            }
            Some(id) => {
                if let Some(handlers) = core.handlers.get_mut(event) {
                    handlers.retain(|(handler_id, _)| *handler_id != id);
                    if handlers.is_empty() {
                        core.handlers.remove(event);
                    }
                }
            }
        }
    }

    /// Register a state listener. It is called right away with the current state and
    /// then on every transition.
    pub fn on_connection_state_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let handler: StateHandler = Arc::new(handler);
        let (id, current) = {
            let mut core = self.lock();
            let id = core.allocate_id();
            core.state_handlers.push((id, handler.clone()));
            (id, core.state)
        };
        handler(current);
        id
    }

    /// Remove a listener added with [`Self::on_connection_state_change`].
    pub fn off_connection_state_change(&self, id: SubscriptionId) {
        self.lock()
            .state_handlers
            .retain(|(handler_id, _)| *handler_id != id);
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        // Callbacks never run under this lock.
        self.inner
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn weak(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn transition_locked(&self, core: &mut Core, pending: &mut Pending, next: ConnectionState) {
        if core.state == next {
            return;
        }
        debug!(from = %core.state, to = %next, "connection state changed");
        core.state = next;
        self.inner.state_tx.send_replace(next);
        pending.transitions.push(next);
    }

    /// Call state listeners for the collected transitions. Must run without the lock.
    fn announce(&self, pending: Pending) {
        if pending.transitions.is_empty() {
            return;
        }
        let handlers: Vec<StateHandler> = self
            .lock()
            .state_handlers
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for state in pending.transitions {
            for handler in &handlers {
                handler(state);
            }
        }
    }

    fn start_attempt_locked(&self, core: &mut Core, pending: &mut Pending) {
        self.transition_locked(core, pending, ConnectionState::Connecting);

        let generation = core.generation;
        let url = self.inner.config.resolve_url();
        let timeout = self.inner.config.connect_timeout;
        let attempt = self.inner.connector.connect(url);
        let weak = self.weak();

        core.timer = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, attempt).await {
                Ok(Ok(transport)) => Ok(transport),
                Ok(Err(err)) => Err(ConnectionError::Transport(err)),
                Err(_) => Err(ConnectionError::Timeout(timeout)),
            };
            let Some(manager) = Self::from_weak(&weak) else {
                return;
            };
            match result {
                Ok(transport) => manager.on_connected(generation, transport),
                Err(err) => manager.on_connect_failed(generation, err),
            }
        }));
    }

    fn on_connected(&self, generation: u64, mut transport: Box<dyn Transport>) {
        let mut pending = Pending::default();
        {
            let mut core = self.lock();
            if core.generation != generation || core.state != ConnectionState::Connecting {
                debug!(generation, "discarding stale connection");
                tokio::spawn(async move {
                    let _ = transport.close().await;
                });
                return;
            }

            core.timer = None;
            core.attempts = 0;
            core.last_error = None;

            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (close_tx, close_rx) = oneshot::channel();
            core.outbound = Some(outbound_tx);
            core.close_signal = Some(close_tx);
            tokio::spawn(run_io(self.weak(), generation, transport, outbound_rx, close_rx));

            info!(generation, "connected");
            self.transition_locked(&mut core, &mut pending, ConnectionState::Connected);
            self.drain_locked(&mut core);
        }
        self.announce(pending);
    }

    fn on_connect_failed(&self, generation: u64, err: ConnectionError) {
        let mut pending = Pending::default();
        {
            let mut core = self.lock();
            if core.generation != generation || core.state != ConnectionState::Connecting {
                return;
            }
            core.timer = None;
            warn!(generation, error = %err, "connection attempt failed");
            core.last_error = Some(err);
            self.transition_locked(&mut core, &mut pending, ConnectionState::Error);
            self.schedule_reconnect_locked(&mut core, &mut pending);
        }
        self.announce(pending);
    }

    fn on_io_closed(
        &self,
        generation: u64,
        reason: Closed,
        unsent: Vec<QueuedOperation>,
    ) {
        let mut pending = Pending::default();
        {
            let mut core = self.lock();
            if !unsent.is_empty() {
                debug!(count = unsent.len(), "requeueing operations not yet written");
                core.queue.push_front_all(unsent);
            }

            let current = core.generation == generation && core.state == ConnectionState::Connected;
            if current {
                core.outbound = None;
                core.close_signal = None;
                match reason {
                    Closed::Remote(err) => {
                        warn!(generation, error = %err, "connection lost");
                        core.last_error = Some(err);
                        self.schedule_reconnect_locked(&mut core, &mut pending);
                    }
                    Closed::Local => {
                        self.transition_locked(&mut core, &mut pending, ConnectionState::Disconnected);
                    }
                }
            } else if core.state == ConnectionState::Connected {
                // A newer connection is live; hand it what the old one left behind.
                self.drain_locked(&mut core);
            }
        }
        self.announce(pending);
    }

    /// Enter `Reconnecting` and arm the backoff timer, or give up at the attempt ceiling.
    fn schedule_reconnect_locked(&self, core: &mut Core, pending: &mut Pending) {
        let max_attempts = self.inner.config.max_attempts;
        if core.attempts >= max_attempts {
            warn!(attempts = core.attempts, "reconnect attempts exhausted; staying disconnected");
            core.last_error = Some(ConnectionError::AttemptsExhausted(core.attempts));
            self.transition_locked(core, pending, ConnectionState::Disconnected);
            return;
        }

        let delay = self.inner.config.reconnect.delay(core.attempts);
        core.attempts += 1;
        info!(
            attempt = core.attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        self.transition_locked(core, pending, ConnectionState::Reconnecting);

        let generation = core.generation;
        let weak = self.weak();
        core.cancel_timer();
        core.timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            if let Some(manager) = Self::from_weak(&weak) {
                manager.on_reconnect_due(generation);
            }
        }));
    }

    fn on_reconnect_due(&self, generation: u64) {
        let mut pending = Pending::default();
        {
            let mut core = self.lock();
            if core.generation != generation || core.state != ConnectionState::Reconnecting {
                return;
            }
            self.start_attempt_locked(&mut core, &mut pending);
        }
        self.announce(pending);
    }

    fn transmit_locked(core: &Core, operation: QueuedOperation) -> Result<(), QueuedOperation> {
        let Some(outbound) = core.outbound.as_ref() else {
            return Err(operation);
        };
        let envelope = EventEnvelope {
            event: operation.name.clone(),
            payload: operation.payload.clone(),
        };
        let frame = match serde_json::to_string(&envelope) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(event = %operation.name, error = %err, "failed to encode operation");
                return Err(operation);
            }
        };
        outbound
            .send(Outbound { operation, frame })
            .map_err(|mpsc::error::SendError(outbound)| outbound.operation)
    }

    fn drain_locked(&self, core: &mut Core) {
        if core.queue.is_empty() {
            return;
        }
        let mut queue = std::mem::take(&mut core.queue);
        let report = queue.drain_with(|operation| Self::transmit_locked(core, operation));
        core.queue = queue;
        info!(
            sent = report.sent,
            expired = report.expired,
            requeued = report.requeued,
            exhausted = report.exhausted,
            "drained operation queue"
        );
    }

    /// Route an inbound text frame to the handlers registered for its event.
    fn dispatch(&self, text: &str) {
        let envelope = match EventEnvelope::from_json_str(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "ignoring malformed inbound frame");
                return;
            }
        };
        let handlers: Vec<EventHandler> = self
            .lock()
            .handlers
            .get(&envelope.event)
            .map(|handlers| handlers.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();
        if handlers.is_empty() {
            debug!(event = %envelope.event, "no handler for inbound event");
        }
        for handler in handlers {
            handler(&envelope.payload);
        }
    }

    /// Put back an operation whose write failed, unless its retries are spent.
    fn requeue_failed(&self, mut operation: QueuedOperation) -> Option<QueuedOperation> {
        if operation.record_failure() {
            Some(operation)
        } else {
            warn!(
                event = %operation.name,
                retries = operation.retry_count,
                "dropping operation after exhausting retries"
            );
            None
        }
    }
}

/// Pump one transport: write queued frames, read inbound frames, report how it ended.
async fn run_io(
    weak: Weak<Inner>,
    generation: u64,
    mut transport: Box<dyn Transport>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let mut unsent = Vec::new();

    let reason = loop {
        tokio::select! {
            biased;
            _ = &mut close_rx => {
                let _ = transport.close().await;
                break Closed::Local;
            }
            outbound = outbound_rx.recv() => {
                let Some(Outbound { operation, frame }) = outbound else {
                    let _ = transport.close().await;
                    break Closed::Local;
                };
                if let Err(err) = transport.send(frame).await {
                    if let Some(manager) = ConnectionManager::from_weak(&weak) {
                        unsent.extend(manager.requeue_failed(operation));
                    }
                    break Closed::Remote(err.into());
                }
            }
            inbound = transport.recv() => {
                match inbound {
                    Some(Ok(text)) => {
                        let Some(manager) = ConnectionManager::from_weak(&weak) else {
                            let _ = transport.close().await;
                            return;
                        };
                        manager.dispatch(&text);
                    }
                    Some(Err(err)) => break Closed::Remote(err.into()),
                    None => break Closed::Remote(ConnectionError::ClosedByServer),
                }
            }
        }
    };

    outbound_rx.close();
    while let Ok(Outbound { operation, .. }) = outbound_rx.try_recv() {
        unsent.push(operation);
    }

    if let Some(manager) = ConnectionManager::from_weak(&weak) {
        manager.on_io_closed(generation, reason, unsent);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::VecDeque, sync::atomic::{AtomicUsize, Ordering}};

    use futures::future::BoxFuture;
    use serde_json::json;

    use super::*;

    /// What the scripted connector does on each successive attempt.
    #[derive(Clone, Copy, Debug)]
    pub(crate) enum Script {
        Accept,
        Refuse,
        Hang,
    }

    /// Server side of a mock connection.
    pub(crate) struct MockPeer {
        pub written: mpsc::UnboundedReceiver<String>,
        pub inbound: mpsc::UnboundedSender<Result<String, TransportError>>,
    }

    struct MockTransport {
        written: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
    }

    impl Transport for MockTransport {
        fn send(&mut self, frame: String) -> BoxFuture<'_, Result<(), TransportError>> {
            let result = self
                .written
                .send(frame)
                .map_err(|_| TransportError::Send("peer gone".into()));
            Box::pin(async move { result })
        }

        fn recv(&mut self) -> BoxFuture<'_, Option<Result<String, TransportError>>> {
            Box::pin(async move { self.inbound.recv().await })
        }

        fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    pub(crate) struct MockConnector {
        script: Mutex<VecDeque<Script>>,
        peers: Mutex<Vec<MockPeer>>,
        urls: Mutex<Vec<String>>,
        pub attempts: AtomicUsize,
    }

    impl MockConnector {
        pub(crate) fn scripted(script: impl IntoIterator<Item = Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                ..Self::default()
            })
        }

        pub(crate) fn take_peer(&self) -> MockPeer {
            self.peers.lock().unwrap().remove(0)
        }

        pub(crate) fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }
    }

    impl Connector for MockConnector {
        fn connect(&self, url: String) -> BoxFuture<'static, Result<Box<dyn Transport>, TransportError>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url);
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Refuse);
            match step {
                Script::Accept => {
                    let (written_tx, written_rx) = mpsc::unbounded_channel();
                    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                    self.peers.lock().unwrap().push(MockPeer {
                        written: written_rx,
                        inbound: inbound_tx,
                    });
                    let transport = MockTransport {
                        written: written_tx,
                        inbound: inbound_rx,
                    };
                    Box::pin(async move { Ok(Box::new(transport) as Box<dyn Transport>) })
                }
                Script::Refuse => {
                    Box::pin(async { Err(TransportError::Connect("refused".into())) })
                }
                Script::Hang => Box::pin(futures::future::pending()),
            }
        }
    }

    fn manager(connector: Arc<MockConnector>) -> ConnectionManager {
        ConnectionManager::new(connector, ConnectionConfig::new("ws://scoreboard/ws"))
    }

    fn recorder(manager: &ConnectionManager) -> Arc<Mutex<Vec<ConnectionState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.on_connection_state_change(move |state| sink.lock().unwrap().push(state));
        seen
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn names(frames: &[String]) -> Vec<String> {
        frames
            .iter()
            .map(|frame| EventEnvelope::from_json_str(frame).unwrap().event)
            .collect()
    }

    fn drain_written(peer: &mut MockPeer) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = peer.written.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test(start_paused = true)]
    async fn queued_operations_are_sent_once_in_order_on_connect() {
        let connector = MockConnector::scripted([Script::Accept]);
        let manager = manager(connector.clone());

        for name in ["a", "b", "c"] {
            assert_eq!(
                manager.send(name, json!({}), SendOptions::default()),
                SendOutcome::Queued
            );
        }
        assert_eq!(manager.queue_len(), 3);

        manager.connect();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.queue_len(), 0);

        assert_eq!(manager.send("d", json!({}), SendOptions::default()), SendOutcome::Sent);
        settle().await;

        let mut peer = connector.take_peer();
        assert_eq!(names(&drain_written(&mut peer)), vec!["a", "b", "c", "d"]);
    }

    fn fast_retry_manager(connector: Arc<MockConnector>) -> ConnectionManager {
        ConnectionManager::new(
            connector,
            ConnectionConfig::new("ws://scoreboard/ws").with_reconnect_policy(ReconnectPolicy {
                jitter_factor: 0.0,
                ..ReconnectPolicy::default()
            }),
        )
    }

    /// Cut the write half of the live mock connection; the read half stays open.
    fn break_writes(connector: &MockConnector) -> mpsc::UnboundedSender<Result<String, TransportError>> {
        let MockPeer { written, inbound } = connector.take_peer();
        drop(written);
        inbound
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_requeues_operations_in_order_for_the_next_connection() {
        let connector = MockConnector::scripted([Script::Accept, Script::Accept]);
        let manager = fast_retry_manager(connector.clone());
        manager.connect();
        settle().await;
        let _first_inbound = break_writes(&connector);

        for name in ["a", "b", "c"] {
            assert_eq!(manager.send(name, json!({}), SendOptions::default()), SendOutcome::Sent);
        }
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
        assert_eq!(manager.queue_len(), 3);

        tokio::time::sleep(Duration::from_millis(1001)).await;
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.queue_len(), 0);

        let mut peer = connector.take_peer();
        assert_eq!(names(&drain_written(&mut peer)), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_without_retry_budget_is_dropped() {
        let connector = MockConnector::scripted([Script::Accept, Script::Accept]);
        let manager = fast_retry_manager(connector.clone());
        manager.connect();
        settle().await;
        let _first_inbound = break_writes(&connector);

        let fragile = SendOptions {
            max_retries: 0,
            ..SendOptions::default()
        };
        assert_eq!(manager.send("fragile", json!({}), fragile), SendOutcome::Sent);
        assert_eq!(manager.send("sturdy", json!({}), SendOptions::default()), SendOutcome::Sent);
        settle().await;
        assert_eq!(manager.queue_len(), 1);

        tokio::time::sleep(Duration::from_millis(1001)).await;
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Connected);

        let mut peer = connector.take_peer();
        assert_eq!(names(&drain_written(&mut peer)), vec!["sturdy"]);
    }

    #[tokio::test(start_paused = true)]
    async fn send_without_queueing_drops_while_disconnected() {
        let manager = manager(MockConnector::scripted([]));
        let options = SendOptions {
            queue_if_disconnected: false,
            ..SendOptions::default()
        };
        assert_eq!(manager.send("x", json!({}), options), SendOutcome::Dropped);
        assert_eq!(manager.queue_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn state_listeners_see_current_state_then_transitions() {
        let connector = MockConnector::scripted([Script::Accept]);
        let manager = manager(connector.clone());
        let seen = recorder(&manager);

        manager.connect();
        settle().await;
        manager.disconnect();
        settle().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempt_goes_through_error_to_reconnecting() {
        let connector = MockConnector::scripted([Script::Refuse, Script::Accept]);
        let manager = ConnectionManager::new(
            connector.clone(),
            ConnectionConfig::new("ws://scoreboard/ws").with_reconnect_policy(ReconnectPolicy {
                jitter_factor: 0.0,
                ..ReconnectPolicy::default()
            }),
        );
        let seen = recorder(&manager);

        manager.connect();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
        assert!(matches!(manager.last_error(), Some(ConnectionError::Transport(_))));

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(2)).await;
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.last_error(), None);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Error,
                ConnectionState::Reconnecting,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_forces_error() {
        let connector = MockConnector::scripted([Script::Hang]);
        let manager = ConnectionManager::new(
            connector,
            ConnectionConfig::new("ws://scoreboard/ws")
                .with_connect_timeout(Duration::from_secs(5))
                .with_max_attempts(1),
        );
        let seen = recorder(&manager);

        manager.connect();
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Reconnecting);
        assert_eq!(
            manager.last_error(),
            Some(ConnectionError::Timeout(Duration::from_secs(5)))
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Error,
                ConnectionState::Reconnecting,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_attempt_ceiling_until_connect_is_called() {
        let connector = MockConnector::scripted([]);
        let manager = ConnectionManager::new(
            connector.clone(),
            ConnectionConfig::new("ws://scoreboard/ws").with_max_attempts(3),
        );

        manager.connect();
        tokio::time::sleep(manager.config().reconnect_policy().max_jittered_delay() * 4).await;
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(manager.last_error(), Some(ConnectionError::AttemptsExhausted(3)));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);

        manager.connect();
        settle().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn server_close_reconnects_and_explicit_disconnect_does_not() {
        let connector = MockConnector::scripted([Script::Accept, Script::Accept]);
        let manager = manager(connector.clone());

        manager.connect();
        settle().await;
        let peer = connector.take_peer();
        drop(peer);
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
        assert_eq!(manager.last_error(), Some(ConnectionError::ClosedByServer));

        tokio::time::sleep(manager.config().reconnect_policy().max_jittered_delay()).await;
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.disconnect();
        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn handlers_survive_reconnects() {
        let connector = MockConnector::scripted([Script::Accept, Script::Accept]);
        let manager = manager(connector.clone());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        manager.subscribe("updateState", move |payload| {
            sink.lock().unwrap().push(payload["version"].as_u64().unwrap());
        });

        manager.connect();
        settle().await;
        let first = connector.take_peer();
        first
            .inbound
            .send(Ok(r#"{"event":"updateState","payload":{"version":1}}"#.into()))
            .unwrap();
        settle().await;

        manager.connect();
        settle().await;
        let second = connector.take_peer();
        second
            .inbound
            .send(Ok(r#"{"event":"updateState","payload":{"version":2}}"#.into()))
            .unwrap();
        second
            .inbound
            .send(Ok(r#"{"event":"somethingElse","payload":{"version":3}}"#.into()))
            .unwrap();
        settle().await;

        assert_eq!(*received.lock().unwrap(), vec![1, 2]);

        manager.unsubscribe("updateState", None);
        second
            .inbound
            .send(Ok(r#"{"event":"updateState","payload":{"version":4}}"#.into()))
            .unwrap();
        settle().await;
        assert_eq!(*received.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn token_and_room_are_attached_to_the_url() {
        let connector = MockConnector::scripted([Script::Accept]);
        let manager = ConnectionManager::new(
            connector.clone(),
            ConnectionConfig::new("ws://scoreboard/ws")
                .with_room("main")
                .with_token_provider(Arc::new(crate::client::transport::StaticToken("s3cr3t".into()))),
        );
        manager.connect();
        settle().await;
        assert_eq!(connector.urls(), vec!["ws://scoreboard/ws?room=main&token=s3cr3t".to_string()]);
    }
}
