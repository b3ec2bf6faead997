//! Message synchronization engine.
//!
//! [`MessageSync`] drives the pure [`Timeline`] from sync-core: it creates
//! optimistic pending messages, issues the send requests, feeds the
//! responses and pushed messages through reconciliation, and owns the
//! automatic retry timers.
//!
//! # Send lifecycle
//!
//! ```text
//! send_message ──► Pending ──ok──► Sent
//!                     │
//!                   error
//!                     ▼
//!                  Failed ──(3 s, once)──► Pending ──► Sent | Failed
//!                     │
//!              retry_message ──► Pending ──► Sent | Failed
//! ```
//!
//! Only the first failure of a message arms the automatic retry. A failed
//! automatic or manual retry leaves the message failed until the user
//! retries again.

use async_trait::async_trait;
use convo_sync_core::{Reconciled, SendAttempt, SendFailure, SendRequest, Timeline};
use convo_sync_types::{
    ConversationId, Message, MessageId, MessageKind, MessageRef, PushEvent, TempId, UserId,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::api::ChatApi;
use crate::subscription::EventHandler;
use crate::timers::TimerSet;

/// Optimistic send, reconciliation and read receipts for the active
/// conversation.
///
/// Cloning yields another handle to the same engine.
pub struct MessageSync<A: ChatApi> {
    api: Arc<A>,
    user: Option<UserId>,
    retry_delay: Duration,
    timeline: Arc<Mutex<Timeline>>,
    retries: Arc<Mutex<TimerSet<TempId>>>,
}

impl<A: ChatApi> Clone for MessageSync<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            user: self.user.clone(),
            retry_delay: self.retry_delay,
            timeline: Arc::clone(&self.timeline),
            retries: Arc::clone(&self.retries),
        }
    }
}

impl<A: ChatApi + 'static> MessageSync<A> {
    /// Create an engine sending as `user`.
    ///
    /// Without a user identity every send is rejected.
    pub fn new(api: Arc<A>, user: Option<UserId>, retry_delay: Duration) -> Self {
        Self {
            api,
            user,
            retry_delay,
            timeline: Arc::new(Mutex::new(Timeline::new())),
            retries: Arc::new(Mutex::new(TimerSet::new())),
        }
    }

    /// The local user.
    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    /// Switch the active conversation, emptying the timeline and cancelling
    /// every retry timer.
    pub async fn set_active_conversation(&self, conversation: Option<ConversationId>) {
        let purged = self.timeline.lock().await.switch_to(conversation);
        self.retries.lock().await.cancel_all();
        if !purged.is_empty() {
            tracing::debug!(purged = purged.len(), "dropped unconfirmed messages on switch");
        }
    }

    /// The active conversation.
    pub async fn conversation(&self) -> Option<ConversationId> {
        self.timeline.lock().await.conversation().cloned()
    }

    /// Send a text message.
    ///
    /// See [`send_message_of_kind`](Self::send_message_of_kind).
    pub async fn send_message(&self, text: &str) -> Option<TempId> {
        self.send_message_of_kind(text, MessageKind::Text).await
    }

    /// Send a message of the given kind.
    ///
    /// The pending message is visible before the first suspension point;
    /// the future then waits for the first attempt to finish. Returns
    /// `None` (and creates nothing) if there is no user identity, no
    /// active conversation, or the trimmed text is empty.
    pub async fn send_message_of_kind(&self, text: &str, kind: MessageKind) -> Option<TempId> {
        let Some(user) = self.user.clone() else {
            tracing::debug!("send rejected: no user identity");
            return None;
        };
        let content = text.trim();
        if content.is_empty() {
            return None;
        }

        let temp_id = TempId::new();
        let request = {
            let mut timeline = self.timeline.lock().await;
            let Some(conversation_id) = timeline.conversation().cloned() else {
                tracing::debug!("send rejected: no active conversation");
                return None;
            };
            let message = Message::pending(
                temp_id,
                conversation_id.clone(),
                user,
                content,
                kind,
                crate::current_timestamp_ms(),
            );
            if !timeline.push_local(message) {
                return None;
            }
            SendRequest {
                temp_id,
                conversation_id,
                content: content.to_string(),
                kind,
            }
        };

        tracing::debug!(%temp_id, "message pending");
        self.deliver(request, SendAttempt::Initial).await;
        Some(temp_id)
    }

    /// Retry a failed message by either id kind.
    ///
    /// Cancels the automatic retry if one is armed. A failure of this
    /// attempt does not arm another automatic retry. Returns `false` if the
    /// message is unknown or not failed.
    pub async fn retry_message(&self, reference: &MessageRef) -> bool {
        let request = self
            .timeline
            .lock()
            .await
            .begin_retry(reference, SendAttempt::Manual);
        let Some(request) = request else {
            return false;
        };

        self.retries.lock().await.cancel(&request.temp_id);
        tracing::info!(temp_id = %request.temp_id, "manual retry");
        self.deliver(request, SendAttempt::Manual).await;
        true
    }

    /// Merge a message delivered by push or load.
    pub async fn add_message(&self, message: Message) -> Reconciled {
        let outcome = self.timeline.lock().await.add_message(message);
        if let Reconciled::Confirmed { temp_id } = &outcome {
            self.retries.lock().await.cancel(temp_id);
            tracing::debug!(%temp_id, "pending message confirmed by push");
        }
        outcome
    }

    /// Add `user` to the read-by set of every message in `ids`.
    ///
    /// Returns the number of messages that changed.
    pub async fn update_read_status(&self, ids: &[MessageId], user: &UserId, at: u64) -> usize {
        self.timeline
            .lock()
            .await
            .update_read_status(ids, user, at)
    }

    /// Mark everything unread in the active conversation as read by the
    /// local user.
    ///
    /// Failures are logged and swallowed; the next call reconciles.
    /// Returns the number of messages that changed locally.
    pub async fn mark_conversation_read(&self) -> usize {
        let Some(user) = self.user.clone() else {
            return 0;
        };
        let Some(conversation_id) = self.conversation().await else {
            return 0;
        };

        let ids = match self.api.unread_message_ids(&conversation_id).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(conversation = %conversation_id, error = %e, "failed to fetch unread ids");
                return 0;
            }
        };
        if ids.is_empty() {
            return 0;
        }

        let changed = {
            let mut timeline = self.timeline.lock().await;
            if timeline.conversation() != Some(&conversation_id) {
                return 0;
            }
            timeline.update_read_status(&ids, &user, crate::current_timestamp_ms())
        };

        if let Err(e) = self.api.mark_messages_read(&conversation_id, &ids).await {
            tracing::warn!(conversation = %conversation_id, error = %e, "failed to post read receipt");
        }
        changed
    }

    /// Merge a loaded history snapshot.
    ///
    /// Messages pushed while the load was in flight and unconfirmed local
    /// sends survive, and their retry timers keep running.
    pub async fn merge_history(&self, messages: Vec<Message>) {
        let confirmed = self.timeline.lock().await.merge_history(messages);
        if confirmed.is_empty() {
            return;
        }
        let mut retries = self.retries.lock().await;
        for temp_id in &confirmed {
            retries.cancel(temp_id);
        }
        tracing::debug!(confirmed = confirmed.len(), "pending messages confirmed by history");
    }

    /// Replace the timeline, cancelling every retry.
    pub async fn set_messages(&self, messages: Vec<Message>) {
        self.timeline.lock().await.set_messages(messages);
        self.retries.lock().await.cancel_all();
    }

    /// Empty the timeline, cancelling every retry.
    pub async fn clear(&self) {
        self.timeline.lock().await.clear();
        self.retries.lock().await.cancel_all();
    }

    /// Remove a message by either id kind.
    pub async fn remove_message(&self, reference: &MessageRef) -> Option<Message> {
        let removed = self.timeline.lock().await.remove(reference)?;
        if let Some(temp_id) = removed.temp_id {
            self.retries.lock().await.cancel(&temp_id);
        }
        Some(removed)
    }

    /// Snapshot of the visible messages, in order.
    pub async fn messages(&self) -> Vec<Message> {
        self.timeline.lock().await.messages().to_vec()
    }

    /// Look up a message by either id kind.
    pub async fn find(&self, reference: &MessageRef) -> Option<Message> {
        self.timeline.lock().await.find(reference).cloned()
    }

    /// Number of unconfirmed messages.
    pub async fn pending_count(&self) -> usize {
        self.timeline.lock().await.pending_count()
    }

    /// Check if an automatic retry is armed for `temp_id`.
    pub async fn has_scheduled_retry(&self, temp_id: &TempId) -> bool {
        self.retries.lock().await.is_scheduled(temp_id)
    }

    async fn deliver(&self, request: SendRequest, attempt: SendAttempt) {
        let SendRequest {
            temp_id,
            conversation_id,
            content,
            kind,
        } = request;

        match self.api.send_message(&conversation_id, &content, kind).await {
            Ok(canonical) => {
                let outcome = self.timeline.lock().await.confirm_send(temp_id, canonical);
                tracing::debug!(%temp_id, ?attempt, ?outcome, "send response reconciled");
            }
            Err(e) => {
                tracing::warn!(%temp_id, ?attempt, error = %e, "send failed");
                let failure = self.timeline.lock().await.send_failed(&temp_id);
                if let SendFailure::Failed {
                    schedule_retry: true,
                } = failure
                {
                    self.schedule_retry(temp_id).await;
                }
            }
        }
    }

    async fn schedule_retry(&self, temp_id: TempId) {
        tracing::debug!(%temp_id, delay_ms = self.retry_delay.as_millis() as u64, "retry scheduled");
        let task = self.auto_retry(temp_id);
        self.retries
            .lock()
            .await
            .schedule(temp_id, self.retry_delay, task);
    }

    // Boxed so the retry task's type does not depend on itself.
    fn auto_retry(&self, temp_id: TempId) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        let engine = self.clone();
        Box::pin(async move {
            engine.retries.lock().await.forget(&temp_id);
            let request = engine
                .timeline
                .lock()
                .await
                .begin_retry(&MessageRef::Temp(temp_id), SendAttempt::AutoRetry);
            match request {
                Some(request) => {
                    tracing::info!(%temp_id, "automatic retry");
                    engine.deliver(request, SendAttempt::AutoRetry).await;
                }
                None => tracing::debug!(%temp_id, "automatic retry no longer needed"),
            }
        })
    }
}

#[async_trait]
impl<A: ChatApi + 'static> EventHandler for MessageSync<A> {
    async fn handle(&self, _channel: &str, event: &PushEvent) {
        match event {
            PushEvent::NewMessage(message) => {
                let outcome = self.add_message(message.clone()).await;
                tracing::debug!(id = ?message.id, ?outcome, "pushed message merged");
            }
            PushEvent::MessageRead {
                conversation_id,
                message_ids,
                user_id,
                read_at,
            } => {
                if self.conversation().await.as_ref() != Some(conversation_id) {
                    return;
                }
                let at = if *read_at == 0 {
                    crate::current_timestamp_ms()
                } else {
                    *read_at
                };
                self.update_read_status(message_ids, user_id, at).await;
            }
            _ => {}
        }
    }
}
