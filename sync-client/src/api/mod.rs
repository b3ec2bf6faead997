//! Persistence collaborator for Convo Sync.
//!
//! The [`ChatApi`] trait is the request/response boundary to the backing
//! store: sending, loading and read-marking messages, and listing
//! conversations. Implementations wrap an HTTP client or a mock.
//!
//! Every call may fail. The engines treat any [`ApiError`] as the failed
//! outcome for the affected entity and never surface it as a blocking
//! error.

mod mock;

pub use mock::{MockApi, SentRequest};

use async_trait::async_trait;
use convo_sync_types::{Conversation, ConversationId, Message, MessageId, MessageKind};
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server rejected the request.
    #[error("request rejected ({status}): {message}")]
    Rejected {
        /// Status code returned by the server.
        status: u16,
        /// Server-provided reason.
        message: String,
    },

    /// The request never completed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The requested entity does not exist.
    #[error("not found")]
    NotFound,
}

/// Request/response access to the backing store.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Persist a new message and return its canonical form.
    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message, ApiError>;

    /// Load the full message history of a conversation.
    async fn load_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, ApiError>;

    /// Ids of the messages the local user has not read yet.
    async fn unread_message_ids(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<MessageId>, ApiError>;

    /// Record that the local user read `ids`.
    async fn mark_messages_read(
        &self,
        conversation_id: &ConversationId,
        ids: &[MessageId],
    ) -> Result<(), ApiError>;

    /// List the local user's conversations, with a participant presence
    /// snapshot.
    async fn load_conversations(&self) -> Result<Vec<Conversation>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ApiError::Rejected {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "request rejected (503): unavailable");
        assert_eq!(
            ApiError::Transport("reset".into()).to_string(),
            "transport failure: reset"
        );
        assert_eq!(ApiError::NotFound.to_string(), "not found");
    }
}
