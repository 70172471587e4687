use std::collections::HashSet;

use crate::models::message::ChatMessage;
use crate::models::user::UserId;

/// Messages exchanged with one peer, oldest first.
///
/// History and live traffic overlap: our own sends come back as inbound
/// echoes and a reconnect can replay what history already returned, so
/// records are kept unique by id.
#[derive(Debug, Clone)]
pub struct Conversation {
    peer: UserId,
    messages: Vec<ChatMessage>,
    seen: HashSet<i64>,
}

impl Conversation {
    pub fn new(peer: UserId) -> Self {
        Self {
            peer,
            messages: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn with_history(peer: UserId, history: impl IntoIterator<Item = ChatMessage>) -> Self {
        let mut conversation = Self::new(peer);
        for message in history {
            conversation.accept(message);
        }
        conversation
    }

    pub fn peer(&self) -> UserId {
        self.peer
    }

    /// Add a message if it belongs to this conversation and is new.
    pub fn accept(&mut self, message: ChatMessage) -> bool {
        if message.peer() != self.peer || !self.seen.insert(message.id) {
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| (m.timestamp, m.id) <= (message.timestamp, message.id));
        self.messages.insert(at, message);
        true
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
