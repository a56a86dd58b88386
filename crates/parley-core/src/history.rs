use std::collections::VecDeque;

use crate::message::ChatMessage;

/// Default number of messages kept per room.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// Bounded, append-only log of the messages seen in the current room.
///
/// The oldest message is evicted once the limit is reached. A message whose
/// id is already present is ignored, so a server echo of our own message
/// does not show up twice.
#[derive(Debug, Clone)]
pub struct MessageHistory {
    limit: usize,
    messages: VecDeque<ChatMessage>,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl MessageHistory {
    /// A limit of zero keeps nothing.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            messages: VecDeque::new(),
        }
    }

    /// Returns false if the message was not stored.
    pub fn push(&mut self, message: ChatMessage) -> bool {
        if self.limit == 0 || self.messages.iter().any(|m| m.id() == message.id()) {
            return false;
        }
        while self.messages.len() >= self.limit {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
        true
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
