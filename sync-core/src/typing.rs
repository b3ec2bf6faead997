//! Typing indicator state for Convo Sync.
//!
//! [`LocalTyping`] debounces the local user's typing broadcasts: one
//! `typing=true` when input becomes non-empty, one `typing=false` when the
//! idle timer expires or the input is cleared. Repeated keystrokes only
//! re-arm the timer.
//!
//! [`RemoteTyping`] aggregates other users' typing events per conversation.

use std::collections::{BTreeSet, HashMap};
use convo_sync_types::{ConversationId, UserId};

/// Side effects requested by [`LocalTyping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingAction {
    /// Broadcast the typing flag.
    Broadcast {
        /// The new flag value.
        typing: bool,
    },
    /// (Re)start the inactivity timer.
    ArmIdleTimer,
    /// Cancel the inactivity timer.
    CancelIdleTimer,
}

/// Local "am I typing" state for the active conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTyping {
    typing: bool,
}

impl LocalTyping {
    /// Create a state that is not typing.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last broadcast value.
    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// A keystroke changed the input field.
    pub fn on_input(&mut self, is_empty: bool) -> Vec<TypingAction> {
        if is_empty {
            return self.stop();
        }
        let mut actions = Vec::with_capacity(2);
        if !self.typing {
            self.typing = true;
            actions.push(TypingAction::Broadcast { typing: true });
        }
        actions.push(TypingAction::ArmIdleTimer);
        actions
    }

    /// The inactivity timer expired.
    pub fn on_idle_timeout(&mut self) -> Vec<TypingAction> {
        if !self.typing {
            return vec![];
        }
        self.typing = false;
        vec![TypingAction::Broadcast { typing: false }]
    }

    /// Stop typing now (input cleared, message sent, conversation left).
    pub fn stop(&mut self) -> Vec<TypingAction> {
        if !self.typing {
            return vec![TypingAction::CancelIdleTimer];
        }
        self.typing = false;
        vec![
            TypingAction::Broadcast { typing: false },
            TypingAction::CancelIdleTimer,
        ]
    }
}

/// Remote users currently typing, per conversation.
#[derive(Debug, Clone, Default)]
pub struct RemoteTyping {
    conversations: HashMap<ConversationId, BTreeSet<UserId>>,
}

impl RemoteTyping {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or refresh a typing user. Returns `true` if newly added.
    pub fn start(&mut self, conversation: &ConversationId, user: &UserId) -> bool {
        self.conversations
            .entry(conversation.clone())
            .or_default()
            .insert(user.clone())
    }

    /// Remove a typing user. Returns `true` if they were present.
    pub fn stop(&mut self, conversation: &ConversationId, user: &UserId) -> bool {
        let Some(users) = self.conversations.get_mut(conversation) else {
            return false;
        };
        let removed = users.remove(user);
        if users.is_empty() {
            self.conversations.remove(conversation);
        }
        removed
    }

    /// Drop every typing entry for a conversation, returning the users.
    pub fn clear(&mut self, conversation: &ConversationId) -> Vec<UserId> {
        self.conversations
            .remove(conversation)
            .map(|users| users.into_iter().collect())
            .unwrap_or_default()
    }

    /// Users typing in a conversation, sorted.
    pub fn users(&self, conversation: &ConversationId) -> Vec<UserId> {
        self.conversations
            .get(conversation)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Check if a user is typing in a conversation.
    pub fn is_typing(&self, conversation: &ConversationId, user: &UserId) -> bool {
        self.conversations
            .get(conversation)
            .is_some_and(|users| users.contains(user))
    }
}
