//! Chat data model for Convo Sync.
//!
//! A [`Message`] has two identities: a [`TempId`] assigned locally when the
//! user sends it, and a [`MessageId`] assigned by the store once persisted.
//! Messages delivered by the store or by push events always carry the
//! canonical id; locally created messages start with only a temp id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ConversationId, MessageId, MessageRef, TempId, UserId};

/// Kind of message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    Text,
    /// Image attachment (content holds the reference).
    Image,
    /// File attachment (content holds the reference).
    File,
}

/// Delivery status of a message.
///
/// Anything coming from the store is `Sent`, which is the serde default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Created locally, send in flight.
    Pending,
    /// Confirmed by the store.
    #[default]
    Sent,
    /// Send failed; may be retried.
    Failed,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Canonical id (None until the store confirms the message).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Temporary id of a locally created message. The store may echo it
    /// back on the canonical message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<TempId>,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Text content (or attachment reference).
    pub content: String,
    /// Content kind.
    #[serde(default)]
    pub kind: MessageKind,
    /// Creation time (milliseconds since UNIX epoch).
    pub created_at: u64,
    /// Whether the message was edited.
    #[serde(default)]
    pub edited: bool,
    /// Last edit time (milliseconds since UNIX epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<u64>,
    /// Users who have read the message, with read time.
    #[serde(default)]
    pub read_by: BTreeMap<UserId, u64>,
    /// Delivery status.
    #[serde(default)]
    pub status: DeliveryStatus,
}

impl Message {
    /// Create a locally originated pending message.
    ///
    /// The sender counts as having read their own message.
    pub fn pending(
        temp_id: TempId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: impl Into<String>,
        kind: MessageKind,
        created_at: u64,
    ) -> Self {
        let mut read_by = BTreeMap::new();
        read_by.insert(sender_id.clone(), created_at);
        Self {
            id: None,
            temp_id: Some(temp_id),
            conversation_id,
            sender_id,
            content: content.into(),
            kind,
            created_at,
            edited: false,
            edited_at: None,
            read_by,
            status: DeliveryStatus::Pending,
        }
    }

    /// Create a canonical (store-confirmed) text message.
    pub fn canonical(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            id: Some(id),
            temp_id: None,
            conversation_id,
            sender_id,
            content: content.into(),
            kind: MessageKind::Text,
            created_at,
            edited: false,
            edited_at: None,
            read_by: BTreeMap::new(),
            status: DeliveryStatus::Sent,
        }
    }

    /// The preferred reference to this message: canonical if known.
    pub fn reference(&self) -> Option<MessageRef> {
        match (&self.id, self.temp_id) {
            (Some(id), _) => Some(MessageRef::Canonical(id.clone())),
            (None, Some(temp)) => Some(MessageRef::Temp(temp)),
            (None, None) => None,
        }
    }

    /// Check whether this message is identified by the given reference.
    pub fn matches(&self, reference: &MessageRef) -> bool {
        match reference {
            MessageRef::Canonical(id) => self.id.as_ref() == Some(id),
            MessageRef::Temp(temp) => self.temp_id.as_ref() == Some(temp),
        }
    }

    /// Record that `user` has read this message.
    ///
    /// Returns `false` if the user was already recorded; the original read
    /// time is kept.
    pub fn mark_read_by(&mut self, user: &UserId, at: u64) -> bool {
        if self.read_by.contains_key(user) {
            return false;
        }
        self.read_by.insert(user.clone(), at);
        true
    }

    /// Number of users who have read this message.
    pub fn read_count(&self) -> usize {
        self.read_by.len()
    }

    /// Check if the message is waiting for the store.
    pub fn is_pending(&self) -> bool {
        self.status == DeliveryStatus::Pending
    }

    /// Check if the last send attempt failed.
    pub fn is_failed(&self) -> bool {
        self.status == DeliveryStatus::Failed
    }
}

/// A conversation participant with their presence at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// The participant's user id.
    pub user_id: UserId,
    /// Whether the participant was online when the list was loaded.
    #[serde(default)]
    pub online: bool,
}

/// A conversation as listed by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id.
    pub id: ConversationId,
    /// Display title (group name), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Participants, including the local user.
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// Messages unread by the local user.
    #[serde(default)]
    pub unread_count: u32,
    /// Most recent message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
}
