use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::message::ChatMessage;

/// Events emitted by the core to UI listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ParleyEvent {
    ConnectionStateChanged(ConnectionState),
    MessageReceived {
        /// Room the server relayed the message in, when it says so.
        room_id: Option<String>,
        message: ChatMessage,
    },
    UserJoined(PresenceEvent),
    UserLeft(PresenceEvent),
    /// Transport or server-reported failure. Reported once, never retried.
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceKind {
    Joined,
    Left,
}

/// A user entered or left the current room. Dispatched once, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEvent {
    pub username: String,
    pub kind: PresenceKind,
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks) and must
/// not block: dispatch happens inline on the session's inbound task.
pub trait ParleyEventListener: Send + Sync {
    fn on_event(&self, event: &ParleyEvent);
}

impl<F> ParleyEventListener for F
where
    F: Fn(&ParleyEvent) + Send + Sync,
{
    fn on_event(&self, event: &ParleyEvent) {
        self(event)
    }
}

/// Handle returned on registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Internal event emitter that dispatches to registered listeners in
/// registration order.
#[derive(Clone)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<(ListenerId, Arc<dyn ParleyEventListener>)>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ParleyEventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }

    /// Returns false if the id was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn on_message<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(move |event: &ParleyEvent| {
            if let ParleyEvent::MessageReceived { message, .. } = event {
                f(message);
            }
        }))
    }

    pub fn on_user_joined<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(move |event: &ParleyEvent| {
            if let ParleyEvent::UserJoined(presence) = event {
                f(presence);
            }
        }))
    }

    pub fn on_user_left<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(move |event: &ParleyEvent| {
            if let ParleyEvent::UserLeft(presence) = event {
                f(presence);
            }
        }))
    }

    pub fn on_error<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(move |event: &ParleyEvent| {
            if let ParleyEvent::Error(reason) = event {
                f(reason);
            }
        }))
    }

    pub fn on_connection_state<F>(&self, f: F) -> ListenerId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(move |event: &ParleyEvent| {
            if let ParleyEvent::ConnectionStateChanged(state) = event {
                f(*state);
            }
        }))
    }

    pub fn emit(&self, event: ParleyEvent) {
        // Snapshot so listeners may register or unregister while handling.
        let listeners: Vec<Arc<dyn ParleyEventListener>> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener.on_event(&event);
        }
    }
}
