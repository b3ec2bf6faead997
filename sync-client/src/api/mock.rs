//! Mock persistence API for testing.
//!
//! Stores messages in memory, hands out sequential canonical ids
//! (`m1`, `m2`, ...) and lets tests inject failures and latency.

use super::{ApiError, ChatApi};
use async_trait::async_trait;
use convo_sync_types::{Conversation, ConversationId, Message, MessageId, MessageKind, UserId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A send request recorded by [`MockApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Trimmed content.
    pub content: String,
    /// Content kind.
    pub kind: MessageKind,
}

/// Mock persistence API for testing.
///
/// Cloning shares state, so a test can keep a handle while the engine owns
/// another.
#[derive(Debug)]
pub struct MockApi {
    inner: Arc<Mutex<MockApiInner>>,
}

#[derive(Debug)]
struct MockApiInner {
    user: UserId,
    next_id: u64,
    clock: u64,
    send_delay: Duration,
    load_delay: Duration,
    send_failures: VecDeque<String>,
    fail_next_unread: Option<String>,
    fail_next_mark_read: Option<String>,
    fail_next_load: Option<String>,
    sent: Vec<SentRequest>,
    messages: HashMap<ConversationId, Vec<Message>>,
    unread: HashMap<ConversationId, Vec<MessageId>>,
    marked_read: Vec<(ConversationId, Vec<MessageId>)>,
    conversations: Vec<Conversation>,
}

impl MockApi {
    /// Create a mock API acting on behalf of `user`.
    pub fn new(user: impl Into<UserId>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockApiInner {
                user: user.into(),
                next_id: 1,
                clock: 1_000,
                send_delay: Duration::ZERO,
                load_delay: Duration::ZERO,
                send_failures: VecDeque::new(),
                fail_next_unread: None,
                fail_next_mark_read: None,
                fail_next_load: None,
                sent: Vec::new(),
                messages: HashMap::new(),
                unread: HashMap::new(),
                marked_read: Vec::new(),
                conversations: Vec::new(),
            })),
        }
    }

    /// Delay every send response by `delay`.
    pub fn set_send_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().send_delay = delay;
    }

    /// Delay every history load by `delay`.
    ///
    /// The snapshot is taken before the delay, like a response still on
    /// the wire.
    pub fn set_load_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().load_delay = delay;
    }

    /// Cause the next send to fail with a transport error.
    pub fn fail_next_send(&self, error: &str) {
        self.fail_next_sends(1, error);
    }

    /// Cause the next `count` sends to fail with a transport error.
    pub fn fail_next_sends(&self, count: usize, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        for _ in 0..count {
            inner.send_failures.push_back(error.to_string());
        }
    }

    /// Cause the next unread-id query to fail.
    pub fn fail_next_unread(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_unread = Some(error.to_string());
    }

    /// Cause the next mark-read request to fail.
    pub fn fail_next_mark_read(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_mark_read = Some(error.to_string());
    }

    /// Cause the next load (messages or conversations) to fail.
    pub fn fail_next_load(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_load = Some(error.to_string());
    }

    /// Canonical id the next successful send will be assigned.
    pub fn next_message_id(&self) -> MessageId {
        let inner = self.inner.lock().unwrap();
        MessageId::new(format!("m{}", inner.next_id))
    }

    /// Every send request received, including failed ones.
    pub fn sent(&self) -> Vec<SentRequest> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Seed the stored history of a conversation.
    pub fn insert_messages(&self, conversation_id: &ConversationId, messages: Vec<Message>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .messages
            .entry(conversation_id.clone())
            .or_default()
            .extend(messages);
    }

    /// Set the unread ids returned for a conversation.
    pub fn set_unread(&self, conversation_id: &ConversationId, ids: Vec<MessageId>) {
        let mut inner = self.inner.lock().unwrap();
        inner.unread.insert(conversation_id.clone(), ids);
    }

    /// Set the conversation list.
    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        self.inner.lock().unwrap().conversations = conversations;
    }

    /// Every mark-read request received, in order.
    pub fn marked_read(&self) -> Vec<(ConversationId, Vec<MessageId>)> {
        self.inner.lock().unwrap().marked_read.clone()
    }
}

impl Clone for MockApi {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message, ApiError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.sent.push(SentRequest {
                conversation_id: conversation_id.clone(),
                content: content.to_string(),
                kind,
            });
            inner.send_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.send_failures.pop_front() {
            return Err(ApiError::Transport(error));
        }

        let id = MessageId::new(format!("m{}", inner.next_id));
        inner.next_id += 1;
        inner.clock += 1;
        let mut message = Message::canonical(
            id,
            conversation_id.clone(),
            inner.user.clone(),
            content,
            inner.clock,
        );
        message.kind = kind;
        message.read_by.insert(inner.user.clone(), inner.clock);

        inner
            .messages
            .entry(conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn load_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, ApiError> {
        let (snapshot, delay) = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(error) = inner.fail_next_load.take() {
                return Err(ApiError::Transport(error));
            }
            let snapshot = inner
                .messages
                .get(conversation_id)
                .cloned()
                .unwrap_or_default();
            (snapshot, inner.load_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn unread_message_ids(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<MessageId>, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_unread.take() {
            return Err(ApiError::Transport(error));
        }
        Ok(inner
            .unread
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_messages_read(
        &self,
        conversation_id: &ConversationId,
        ids: &[MessageId],
    ) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_mark_read.take() {
            return Err(ApiError::Transport(error));
        }
        inner
            .marked_read
            .push((conversation_id.clone(), ids.to_vec()));
        if let Some(unread) = inner.unread.get_mut(conversation_id) {
            unread.retain(|id| !ids.contains(id));
        }
        Ok(())
    }

    async fn load_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_load.take() {
            return Err(ApiError::Transport(error));
        }
        Ok(inner.conversations.clone())
    }
}
