use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::ReentrantMutex;
use tokio::sync::{mpsc, oneshot, watch};

use crate::endpoint::{build_endpoint, validate_identity};
use crate::errors::ParleyError;
use crate::events::{
    ConnectionState, EventEmitter, ListenerId, ParleyEvent, ParleyEventListener, PresenceEvent,
    PresenceKind,
};
use crate::message::ChatMessage;
use crate::protocol::{ClientIntent, ServerPush};
use crate::transport::{Connector, TransportEvent, TransportLink, WsConnector};

/// Server used when nothing else is configured.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:3000/ws";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub server_url: String,
    /// Give up on a connection attempt after this long. `None` waits forever.
    pub connect_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout: None,
        }
    }
}

/// Why an intent was not handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotConnected,
    NoActiveRoom,
}

/// Outcome of a fire-and-forget operation.
///
/// `Sent` means the intent reached the transport's outbound queue, not that
/// the server received it: the protocol has no acknowledgments.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T = ()> {
    Sent(T),
    /// Accepted, and sent once the session finishes connecting.
    Pending,
    Dropped(DropReason),
}

impl<T> Delivery<T> {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent(_))
    }

    pub fn sent(self) -> Option<T> {
        match self {
            Delivery::Sent(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Delivery<U> {
        match self {
            Delivery::Sent(value) => Delivery::Sent(f(value)),
            Delivery::Pending => Delivery::Pending,
            Delivery::Dropped(reason) => Delivery::Dropped(reason),
        }
    }
}

/// The live half of a connection, owned by the session while connected.
struct ActiveLink {
    outbound: mpsc::UnboundedSender<String>,
    // Dropping this stops the inbound task.
    _shutdown: oneshot::Sender<()>,
}

struct SessionInner {
    state: ConnectionState,
    identity: Option<String>,
    link: Option<ActiveLink>,
    /// Bumped on every connect and disconnect so a connection attempt can
    /// tell whether it is still the one the caller wants.
    generation: u64,
}

struct Shared {
    inner: Mutex<SessionInner>,
    /// Held from a state change until its events are delivered, so listeners
    /// see transitions in the order they happened. Taken before `inner`.
    /// Reentrant so listeners may call back into the session.
    dispatch: ReentrantMutex<()>,
    state_tx: watch::Sender<ConnectionState>,
    emitter: EventEmitter,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mirror the current state into the watch channel. Called after the
    /// matching event has been emitted, so a waiter that wakes up knows every
    /// listener has already seen the change.
    fn publish_state(&self) {
        self.state_tx.send_if_modified(|published| {
            let latest = self.lock().state;
            let changed = *published != latest;
            *published = latest;
            changed
        });
    }

    /// A connection attempt failed before it was usable.
    fn attempt_failed(&self, generation: u64, reason: String) {
        let _dispatch = self.dispatch.lock();
        {
            let mut inner = self.lock();
            if inner.generation != generation || inner.state != ConnectionState::Connecting {
                tracing::debug!("ignoring failure of stale attempt {generation}: {reason}");
                return;
            }
            inner.identity = None;
            inner.state = ConnectionState::Disconnected;
        }
        tracing::warn!("connection attempt failed: {reason}");
        self.emitter.emit(ParleyEvent::Error(reason));
        self.emitter
            .emit(ParleyEvent::ConnectionStateChanged(ConnectionState::Disconnected));
        self.publish_state();
    }

    /// Install the link if the attempt is still wanted. Returns the shutdown
    /// receiver for the inbound loop.
    fn attempt_succeeded(
        &self,
        generation: u64,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Option<oneshot::Receiver<()>> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let _dispatch = self.dispatch.lock();
        {
            let mut inner = self.lock();
            if inner.generation != generation || inner.state != ConnectionState::Connecting {
                tracing::info!("discarding connection from abandoned attempt {generation}");
                return None;
            }
            inner.link = Some(ActiveLink {
                outbound,
                _shutdown: shutdown_tx,
            });
            inner.state = ConnectionState::Connected;
        }
        tracing::info!("connected");
        self.emitter
            .emit(ParleyEvent::ConnectionStateChanged(ConnectionState::Connected));
        self.publish_state();
        Some(shutdown_rx)
    }

    /// The transport went away on its own.
    fn connection_lost(&self, generation: u64, reason: Option<String>) {
        let _dispatch = self.dispatch.lock();
        {
            let mut inner = self.lock();
            if inner.generation != generation || inner.state != ConnectionState::Connected {
                return;
            }
            inner.link = None;
            inner.identity = None;
            inner.state = ConnectionState::Disconnected;
        }
        let reason = reason.unwrap_or_else(|| "connection closed by server".to_string());
        tracing::warn!("connection lost: {reason}");
        self.emitter.emit(ParleyEvent::Error(reason));
        self.emitter
            .emit(ParleyEvent::ConnectionStateChanged(ConnectionState::Disconnected));
        self.publish_state();
    }

    fn is_current(&self, generation: u64) -> bool {
        let inner = self.lock();
        inner.generation == generation && inner.state == ConnectionState::Connected
    }

    fn handle_frame(&self, generation: u64, frame: &str) {
        let push = match ServerPush::from_frame(frame) {
            Ok(push) => push,
            Err(e) => {
                tracing::warn!("dropping malformed push: {e}");
                return;
            }
        };
        let event = match push {
            ServerPush::Message(pushed) => {
                tracing::debug!(
                    "message {} ({}) from {}",
                    pushed.message.id(),
                    pushed.message.kind(),
                    pushed.message.sender()
                );
                ParleyEvent::MessageReceived {
                    room_id: pushed.room_id,
                    message: pushed.message,
                }
            }
            ServerPush::UserJoined { username } => ParleyEvent::UserJoined(PresenceEvent {
                username,
                kind: PresenceKind::Joined,
            }),
            ServerPush::UserLeft { username } => ParleyEvent::UserLeft(PresenceEvent {
                username,
                kind: PresenceKind::Left,
            }),
            ServerPush::Error { reason } => {
                tracing::warn!("server error: {reason}");
                ParleyEvent::Error(reason)
            }
        };
        let _dispatch = self.dispatch.lock();
        // A disconnect may have raced this frame in.
        if !self.is_current(generation) {
            tracing::debug!("dropping push from closed connection {generation}");
            return;
        }
        self.emitter.emit(event);
    }
}

/// Owns the one connection between this client and the chat server.
///
/// A client process creates exactly one `SessionManager` and shares it
/// (usually behind an `Arc`) with everything that needs the connection.
/// `connect` and `disconnect` may be called any number of times; only one
/// transport is ever open.
pub struct SessionManager {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            connector,
            shared: Arc::new(Shared {
                inner: Mutex::new(SessionInner {
                    state: ConnectionState::Disconnected,
                    identity: None,
                    link: None,
                    generation: 0,
                }),
                dispatch: ReentrantMutex::new(()),
                state_tx,
                emitter: EventEmitter::new(),
            }),
        }
    }

    /// A session talking WebSocket to `config.server_url`.
    pub fn websocket(config: SessionConfig) -> Self {
        Self::new(config, Arc::new(WsConnector))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// The identity of the current (or in-progress) connection.
    pub fn identity(&self) -> Option<String> {
        self.shared.lock().identity.clone()
    }

    /// Watch connection state changes.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Resolve once the session reaches `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) {
        let mut rx = self.state_changes();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|s| *s == state).await;
    }

    pub fn events(&self) -> &EventEmitter {
        &self.shared.emitter
    }

    /// Register a listener for session events.
    pub fn add_listener(&self, listener: Arc<dyn ParleyEventListener>) -> ListenerId {
        self.shared.emitter.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.emitter.remove_listener(id)
    }

    pub fn on_message<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.shared.emitter.on_message(f)
    }

    pub fn on_user_joined<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        self.shared.emitter.on_user_joined(f)
    }

    pub fn on_user_left<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        self.shared.emitter.on_user_left(f)
    }

    pub fn on_error<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared.emitter.on_error(f)
    }

    /// Start connecting as `identity`.
    ///
    /// Returns as soon as the attempt is under way; completion is reported
    /// through `ConnectionStateChanged`, failures through `Error`. Does
    /// nothing while already connecting or connected. Must be called from
    /// within a Tokio runtime.
    pub fn connect(&self, identity: &str) -> Result<(), ParleyError> {
        let identity = validate_identity(identity)?.to_string();
        let endpoint = build_endpoint(&self.config.server_url, &identity)?;

        let dispatch = self.shared.dispatch.lock();
        let generation = {
            let mut inner = self.shared.lock();
            if inner.state != ConnectionState::Disconnected {
                if inner.identity.as_deref() != Some(identity.as_str()) {
                    tracing::warn!(
                        "connect as {identity} ignored: session already {:?} as {:?}",
                        inner.state,
                        inner.identity
                    );
                } else {
                    tracing::debug!("connect ignored: session already {:?}", inner.state);
                }
                return Ok(());
            }
            inner.generation += 1;
            inner.identity = Some(identity.clone());
            inner.state = ConnectionState::Connecting;
            inner.generation
        };

        tracing::info!("connecting to {} as {identity}", self.config.server_url);
        self.shared
            .emitter
            .emit(ParleyEvent::ConnectionStateChanged(ConnectionState::Connecting));
        self.shared.publish_state();
        drop(dispatch);

        let open = self.connector.open(endpoint);
        let shared = self.shared.clone();
        let timeout = self.config.connect_timeout;
        tokio::spawn(async move {
            Self::run_connection(shared, generation, open, timeout).await;
        });
        Ok(())
    }

    /// Close the connection. Safe to call in any state; a connection attempt
    /// still in flight is discarded when it settles.
    pub fn disconnect(&self) {
        let _dispatch = self.shared.dispatch.lock();
        {
            let mut inner = self.shared.lock();
            if inner.state == ConnectionState::Disconnected {
                return;
            }
            inner.generation += 1;
            inner.link = None;
            inner.identity = None;
            inner.state = ConnectionState::Disconnected;
        }
        tracing::info!("disconnected");
        self.shared
            .emitter
            .emit(ParleyEvent::ConnectionStateChanged(ConnectionState::Disconnected));
        self.shared.publish_state();
    }

    /// Run `f` with state changes held off: the connection state it reads
    /// cannot move until it returns.
    pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _dispatch = self.shared.dispatch.lock();
        f()
    }

    /// Hand an intent to the transport.
    ///
    /// Never fails because of the network: with no open connection the
    /// intent is dropped and `Dropped(NotConnected)` returned. An error
    /// means the intent itself could not be encoded.
    pub fn send(&self, intent: ClientIntent) -> Result<Delivery, ParleyError> {
        let frame = intent.to_frame()?;
        let inner = self.shared.lock();
        let link = match (&inner.state, &inner.link) {
            (ConnectionState::Connected, Some(link)) => link,
            _ => {
                tracing::debug!("{} dropped: not connected", intent.name());
                return Ok(Delivery::Dropped(DropReason::NotConnected));
            }
        };
        if link.outbound.send(frame).is_err() {
            // Transport is closing; the inbound loop reports the loss.
            tracing::debug!("{} dropped: transport closing", intent.name());
            return Ok(Delivery::Dropped(DropReason::NotConnected));
        }
        tracing::debug!("sent {}", intent.name());
        Ok(Delivery::Sent(()))
    }

    async fn run_connection(
        shared: Arc<Shared>,
        generation: u64,
        open: BoxFuture<'static, Result<TransportLink, ParleyError>>,
        timeout: Option<Duration>,
    ) {
        let opened = match timeout {
            Some(limit) => match tokio::time::timeout(limit, open).await {
                Ok(result) => result,
                Err(_) => Err(ParleyError::Connection(format!(
                    "timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => open.await,
        };

        let TransportLink {
            outbound,
            mut inbound,
        } = match opened {
            Ok(link) => link,
            Err(e) => {
                shared.attempt_failed(generation, e.to_string());
                return;
            }
        };

        let Some(mut shutdown) = shared.attempt_succeeded(generation, outbound) else {
            return;
        };

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::debug!("inbound loop {generation} stopped by disconnect");
                    return;
                }
                event = inbound.recv() => match event {
                    Some(TransportEvent::Frame(frame)) => shared.handle_frame(generation, &frame),
                    Some(TransportEvent::Closed { reason }) => {
                        shared.connection_lost(generation, reason);
                        return;
                    }
                    None => {
                        shared.connection_lost(generation, Some("transport ended".to_string()));
                        return;
                    }
                },
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // The inbound task holds the shared state, so close the link here or
        // it would outlive the session.
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryConnector;
    use std::sync::Mutex as StdMutex;

    fn session(connector: &MemoryConnector) -> SessionManager {
        SessionManager::new(SessionConfig::default(), Arc::new(connector.clone()))
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let connector = MemoryConnector::new();
        let s = session(&connector);
        assert_eq!(s.connection_state(), ConnectionState::Disconnected);
        assert!(s.identity().is_none());
    }

    #[tokio::test]
    async fn connect_rejects_empty_identity() {
        let connector = MemoryConnector::new();
        let s = session(&connector);
        assert_eq!(s.connect("  "), Err(ParleyError::InvalidIdentity));
        assert_eq!(s.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_is_asynchronous() {
        let connector = MemoryConnector::new();
        let s = session(&connector);
        s.connect("alice").unwrap();
        assert_eq!(s.connection_state(), ConnectionState::Connecting);

        let attempt = connector.next_attempt().await.unwrap();
        assert_eq!(attempt.identity().as_deref(), Some("alice"));
        let _server = attempt.accept();

        s.wait_for_state(ConnectionState::Connected).await;
        assert_eq!(s.identity().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn repeated_connect_opens_one_transport() {
        let connector = MemoryConnector::new();
        let s = session(&connector);
        s.connect("alice").unwrap();
        s.connect("alice").unwrap();
        s.connect("bob").unwrap();

        let _server = connector.accept().await.unwrap();
        s.wait_for_state(ConnectionState::Connected).await;
        s.connect("alice").unwrap();

        assert!(connector.try_next_attempt().await.is_none());
        assert_eq!(s.identity().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn send_without_connection_is_dropped() {
        let connector = MemoryConnector::new();
        let s = session(&connector);
        let outcome = s.send(ClientIntent::JoinRoom { room_id: "lobby".into() }).unwrap();
        assert_eq!(outcome, Delivery::Dropped(DropReason::NotConnected));
    }

    #[tokio::test]
    async fn rejected_attempt_reports_error_once() {
        let connector = MemoryConnector::new();
        let s = session(&connector);
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let e = errors.clone();
        s.on_error(move |reason| e.lock().unwrap().push(reason.to_string()));

        s.connect("mallory").unwrap();
        connector.next_attempt().await.unwrap().reject("401 Unauthorized");
        s.wait_for_state(ConnectionState::Disconnected).await;

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("401"));
        assert!(s.identity().is_none());
    }

    #[tokio::test]
    async fn connect_timeout_returns_to_disconnected() {
        let connector = MemoryConnector::new();
        let config = SessionConfig {
            connect_timeout: Some(Duration::from_millis(20)),
            ..SessionConfig::default()
        };
        let s = SessionManager::new(config, Arc::new(connector.clone()));
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let e = errors.clone();
        s.on_error(move |reason| e.lock().unwrap().push(reason.to_string()));

        s.connect("alice").unwrap();
        let _attempt = connector.next_attempt().await.unwrap();
        s.wait_for_state(ConnectionState::Disconnected).await;

        assert!(errors.lock().unwrap()[0].contains("timed out"));
    }

    #[tokio::test]
    async fn malformed_push_is_ignored() {
        let connector = MemoryConnector::new();
        let s = session(&connector);
        let events = Arc::new(StdMutex::new(Vec::new()));
        let ev = events.clone();
        s.add_listener(Arc::new(move |event: &ParleyEvent| {
            ev.lock().unwrap().push(event.clone());
        }));

        s.connect("alice").unwrap();
        let server = connector.accept().await.unwrap();
        s.wait_for_state(ConnectionState::Connected).await;

        server.push_raw("{not json");
        server.push(&ServerPush::UserLeft { username: "bob".into() });

        for _ in 0..100 {
            if events.lock().unwrap().len() >= 3 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ParleyEvent::ConnectionStateChanged(ConnectionState::Connecting),
                ParleyEvent::ConnectionStateChanged(ConnectionState::Connected),
                ParleyEvent::UserLeft(PresenceEvent {
                    username: "bob".into(),
                    kind: PresenceKind::Left,
                }),
            ]
        );
    }

    #[test]
    fn delivery_map_keeps_reason() {
        let d: Delivery = Delivery::Dropped(DropReason::NoActiveRoom);
        assert_eq!(d.map(|_| 1), Delivery::Dropped(DropReason::NoActiveRoom));
        assert_eq!(Delivery::Sent(()).map(|_| 1).sent(), Some(1));
    }
}
