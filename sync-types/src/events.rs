//! Push and client events for Convo Sync.
//!
//! Inbound [`PushEvent`]s are delivered by the push transport on named
//! channels. Outbound [`ClientEvent`]s are the best-effort signals the
//! client emits (typing, heartbeat). Both encode as `{type, payload}`.

use serde::{Deserialize, Serialize};

use crate::{Conversation, ConversationId, Message, MessageId, UserId};

/// Server-originated events delivered over a channel.
///
/// Delivery is at-least-once and unordered; every handler must tolerate
/// duplicates and reordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum PushEvent {
    /// A message was persisted.
    NewMessage(Message),
    /// A user read messages.
    MessageRead {
        /// Conversation containing the messages.
        conversation_id: ConversationId,
        /// Canonical ids of the messages read.
        message_ids: Vec<MessageId>,
        /// The reader.
        user_id: UserId,
        /// Read time (milliseconds since UNIX epoch).
        #[serde(default)]
        read_at: u64,
    },
    /// A user came online.
    UserOnline {
        /// The user.
        user_id: UserId,
    },
    /// A user went offline.
    UserOffline {
        /// The user.
        user_id: UserId,
    },
    /// A user started typing.
    TypingStart {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// The typist.
        user_id: UserId,
    },
    /// A user stopped typing.
    TypingStop {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// The typist.
        user_id: UserId,
    },
    /// Conversation metadata changed (title, participants, last message).
    ConversationUpdated(Conversation),
}

impl PushEvent {
    /// Short name of the event type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new-message",
            Self::MessageRead { .. } => "message-read",
            Self::UserOnline { .. } => "user-online",
            Self::UserOffline { .. } => "user-offline",
            Self::TypingStart { .. } => "typing-start",
            Self::TypingStop { .. } => "typing-stop",
            Self::ConversationUpdated(_) => "conversation-updated",
        }
    }
}

/// Local user activity as reported by the heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    /// Input within the activity window.
    Active,
    /// No recent input.
    Away,
}

/// Client-originated signals sent over the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// The local user started typing.
    TypingStart {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// The local user.
        user_id: UserId,
    },
    /// The local user stopped typing.
    TypingStop {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// The local user.
        user_id: UserId,
    },
    /// Periodic activity report.
    Heartbeat {
        /// The local user.
        user_id: UserId,
        /// Current activity.
        status: Activity,
    },
}
