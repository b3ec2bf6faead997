//! Frame - one delivery from the push transport, plus channel naming.

use serde::{Deserialize, Serialize};

use crate::{ClientEvent, ConversationId, PushEvent, SyncError, UserId};

/// Global channel carrying user-online / user-offline events and heartbeats.
pub const PRESENCE_CHANNEL: &str = "presence";

/// Channel carrying a conversation's messages, read receipts and typing.
pub fn conversation_channel(id: &ConversationId) -> String {
    format!("conversation-{}", id)
}

/// Per-user channel carrying conversation-updated events.
pub fn user_channel(id: &UserId) -> String {
    format!("user-{}", id)
}

/// An inbound event tagged with the channel it arrived on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Channel name the event was published on.
    pub channel: String,
    /// The event itself.
    pub event: PushEvent,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: impl Into<String>, event: PushEvent) -> Self {
        Self {
            channel: channel.into(),
            event,
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(SyncError::Serialization)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        let frame: Self = serde_json::from_slice(bytes).map_err(SyncError::Deserialization)?;
        if frame.channel.is_empty() {
            return Err(SyncError::InvalidData("empty channel name".into()));
        }
        Ok(frame)
    }
}

impl ClientEvent {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(SyncError::Serialization)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(SyncError::Deserialization)
    }
}
