use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;

use crate::errors::ParleyError;
use crate::events::{ConnectionState, ListenerId, ParleyEvent, ParleyEventListener};
use crate::history::MessageHistory;
use crate::message::{ChatMessage, OutgoingMessage};
use crate::protocol::{ClientIntent, RoomMessage};
use crate::session::{Delivery, DropReason, SessionManager};

#[derive(Debug, Default)]
struct Membership {
    /// Room joined on the current connection.
    current: Option<String>,
    /// Room requested while the session was still connecting.
    pending: Option<String>,
}

struct RoomShared {
    membership: Mutex<Membership>,
    history: Mutex<MessageHistory>,
}

impl RoomShared {
    fn membership(&self) -> MutexGuard<'_, Membership> {
        self.membership.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn history(&self) -> MutexGuard<'_, MessageHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Promote a pending join to membership and send it. Whoever takes the
    /// pending room sends the intent, so it goes out exactly once.
    fn flush_pending(&self, session: &SessionManager) {
        let room_id = {
            let mut membership = self.membership();
            let Some(room_id) = membership.pending.take() else {
                return;
            };
            membership.current = Some(room_id.clone());
            room_id
        };
        tracing::info!("joining deferred room {room_id}");
        match session.send(ClientIntent::JoinRoom {
            room_id: room_id.clone(),
        }) {
            Ok(Delivery::Sent(())) => {}
            Ok(other) => {
                tracing::debug!("deferred join of {room_id} not sent: {other:?}");
                self.forget(&room_id);
            }
            Err(e) => {
                tracing::warn!("deferred join of {room_id} failed: {e}");
                self.forget(&room_id);
            }
        }
    }

    /// Clear membership if it still points at `room_id`.
    fn forget(&self, room_id: &str) {
        let mut membership = self.membership();
        if membership.current.as_deref() == Some(room_id) {
            membership.current = None;
        }
    }

    fn reset(&self) {
        let mut membership = self.membership();
        if let Some(room_id) = membership.current.take() {
            tracing::info!("left room {room_id}: session disconnected");
        }
        membership.pending = None;
        drop(membership);
        self.history().clear();
    }
}

/// Keeps room state in step with the session.
struct SessionObserver {
    session: Weak<SessionManager>,
    shared: Arc<RoomShared>,
}

impl ParleyEventListener for SessionObserver {
    fn on_event(&self, event: &ParleyEvent) {
        match event {
            ParleyEvent::ConnectionStateChanged(ConnectionState::Connected) => {
                if let Some(session) = self.session.upgrade() {
                    self.shared.flush_pending(&session);
                }
            }
            ParleyEvent::ConnectionStateChanged(ConnectionState::Disconnected) => {
                self.shared.reset();
            }
            ParleyEvent::MessageReceived { room_id, message } => {
                let in_room = match (&self.shared.membership().current, room_id) {
                    (None, _) => false,
                    (Some(_), None) => true,
                    (Some(current), Some(room_id)) => current == room_id,
                };
                if in_room {
                    self.shared.history().push(message.clone());
                } else {
                    tracing::debug!("message {} not for the current room", message.id());
                }
            }
            _ => {}
        }
    }
}

/// Tracks the room this client is in and scopes outgoing traffic to it.
///
/// Membership is client-authoritative: a leave clears local state whether
/// or not the server hears about it.
pub struct RoomController {
    session: Arc<SessionManager>,
    shared: Arc<RoomShared>,
    listener: ListenerId,
}

impl RoomController {
    pub fn new(session: Arc<SessionManager>, history_limit: usize) -> Self {
        let shared = Arc::new(RoomShared {
            membership: Mutex::new(Membership::default()),
            history: Mutex::new(MessageHistory::new(history_limit)),
        });
        let listener = session.add_listener(Arc::new(SessionObserver {
            session: Arc::downgrade(&session),
            shared: shared.clone(),
        }));
        Self {
            session,
            shared,
            listener,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn current_room(&self) -> Option<String> {
        self.shared.membership().current.clone()
    }

    /// Room waiting for the session to connect.
    pub fn pending_room(&self) -> Option<String> {
        self.shared.membership().pending.clone()
    }

    /// Messages seen in the current room, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.shared.history().messages()
    }

    /// Join `room_id`.
    ///
    /// - Disconnected: dropped, membership unchanged.
    /// - Connecting: remembered and joined once connected (`Pending`).
    /// - Connected: joined now. Being in another room leaves it first;
    ///   re-joining the current room does nothing.
    pub fn join_room(&self, room_id: &str) -> Result<Delivery, ParleyError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(ParleyError::Room("room id must not be empty".into()));
        }

        // The state read here holds until the join is recorded, so the
        // matching state event is always observed after it.
        self.session.exclusive(|| match self.session.connection_state() {
            ConnectionState::Disconnected => {
                tracing::debug!("join {room_id} dropped: not connected");
                Ok(Delivery::Dropped(DropReason::NotConnected))
            }
            ConnectionState::Connecting => {
                self.shared.membership().pending = Some(room_id.to_string());
                tracing::info!("join {room_id} deferred until connected");
                Ok(Delivery::Pending)
            }
            ConnectionState::Connected => self.join_now(room_id),
        })
    }

    fn join_now(&self, room_id: &str) -> Result<Delivery, ParleyError> {
        let previous = {
            let mut membership = self.shared.membership();
            if membership.current.as_deref() == Some(room_id) {
                return Ok(Delivery::Sent(()));
            }
            membership.pending = None;
            membership.current.replace(room_id.to_string())
        };

        if let Some(previous) = previous {
            tracing::info!("switching from room {previous} to {room_id}");
            self.shared.history().clear();
            let left = self.session.send(ClientIntent::LeaveRoom {
                room_id: previous.clone(),
            })?;
            if !left.is_sent() {
                tracing::debug!("leave of {previous} not sent: {left:?}");
            }
        }

        let delivery = self.session.send(ClientIntent::JoinRoom {
            room_id: room_id.to_string(),
        })?;
        if delivery.is_sent() {
            tracing::info!("joined room {room_id}");
        } else {
            self.shared.forget(room_id);
        }
        Ok(delivery)
    }

    /// Leave the current room. Does nothing without one; a join still
    /// waiting for the connection is cancelled.
    pub fn leave_room(&self) -> Result<Delivery, ParleyError> {
        self.session.exclusive(|| {
            let room_id = {
                let mut membership = self.shared.membership();
                membership.pending = None;
                membership.current.take()
            };
            let Some(room_id) = room_id else {
                return Ok(Delivery::Dropped(DropReason::NoActiveRoom));
            };
            self.shared.history().clear();
            tracing::info!("leaving room {room_id}");
            self.session.send(ClientIntent::LeaveRoom { room_id })
        })
    }

    /// Send a message to the current room, stamped with the session's
    /// identity and the current time. The stamped message is returned and
    /// recorded in the room history.
    pub fn send_message(
        &self,
        message: OutgoingMessage,
    ) -> Result<Delivery<ChatMessage>, ParleyError> {
        let Some(room_id) = self.current_room() else {
            tracing::debug!("message {} dropped: no active room", message.id());
            return Ok(Delivery::Dropped(DropReason::NoActiveRoom));
        };
        let Some(sender) = self.session.identity() else {
            return Ok(Delivery::Dropped(DropReason::NotConnected));
        };

        let message = message.stamp(&sender, Utc::now());
        let delivery = self.session.send(ClientIntent::Message(RoomMessage {
            room_id,
            message: message.clone(),
        }))?;
        Ok(delivery.map(|()| {
            self.shared.history().push(message.clone());
            message
        }))
    }
}

impl Drop for RoomController {
    fn drop(&mut self) {
        self.session.remove_listener(self.listener);
    }
}
