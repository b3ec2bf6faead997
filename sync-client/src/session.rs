//! ChatSession - the orchestrator for one signed-in user.
//!
//! Owns one instance of each engine for the lifetime of the session and
//! wires them to the channels they listen on:
//!
//! | Channel                | Handlers                                 |
//! |------------------------|------------------------------------------|
//! | `conversation-<id>`    | [`MessageSync`], [`TypingCoordinator`]   |
//! | `presence`             | [`PresenceEngine`]                       |
//! | `user-<id>`            | conversation-updated forwarder           |
//!
//! # Example
//!
//! ```ignore
//! let (session, mut events) = ChatSession::new("alice", api, transport, SessionConfig::default());
//! session.start().await;
//! session.load_conversations().await?;
//! session.open_conversation(ConversationId::from("c1")).await?;
//! session.send_message("hi").await;
//! tokio::spawn(async move { session.run().await });
//! ```

use async_trait::async_trait;
use convo_sync_core::ConnectionEvent;
use convo_sync_types::{
    conversation_channel, user_channel, Conversation, ConversationId, Frame, PushEvent, SyncError,
    TempId, UserId, PRESENCE_CHANNEL,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::api::{ApiError, ChatApi};
use crate::config::SessionConfig;
use crate::messages::MessageSync;
use crate::presence::PresenceEngine;
use crate::subscription::{Binding, EventHandler, SubscriptionManager};
use crate::transport::{Transport, TransportError};
use crate::typing::TypingCoordinator;

/// Session errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Persistence error.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Wire format error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The operation needs an open conversation.
    #[error("no active conversation")]
    NoActiveConversation,
}

/// Notifications for the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A conversation's metadata changed.
    ConversationUpdated(Conversation),
    /// The push transport connection changed.
    Connection(ConnectionEvent),
}

/// Forwards `conversation-updated` pushes to the application.
struct Notifier {
    events: mpsc::UnboundedSender<SessionEvent>,
}

#[async_trait]
impl EventHandler for Notifier {
    async fn handle(&self, _channel: &str, event: &PushEvent) {
        if let PushEvent::ConversationUpdated(conversation) = event {
            if self
                .events
                .send(SessionEvent::ConversationUpdated(conversation.clone()))
                .is_err()
            {
                tracing::debug!("session event receiver dropped");
            }
        }
    }
}

/// One signed-in user's conversation sync session.
pub struct ChatSession<A: ChatApi, T: Transport> {
    user: UserId,
    api: Arc<A>,
    transport: Arc<T>,
    subscriptions: SubscriptionManager<T>,
    messages: Arc<MessageSync<A>>,
    typing: Arc<TypingCoordinator<T>>,
    presence: Arc<PresenceEngine<T>>,
    notifier: Arc<Notifier>,
    active: Mutex<Option<ConversationId>>,
    closing: AtomicBool,
}

impl<A: ChatApi + 'static, T: Transport + 'static> ChatSession<A, T> {
    /// Build a session and the receiver for its [`SessionEvent`]s.
    ///
    /// Nothing touches the network until [`start`](Self::start).
    pub fn new(
        user: impl Into<UserId>,
        api: A,
        transport: T,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let user = user.into();
        let api = Arc::new(api);
        let transport = Arc::new(transport);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let subscriptions = SubscriptionManager::new(Arc::clone(&transport));
        let messages = MessageSync::new(Arc::clone(&api), Some(user.clone()), config.retry_delay());
        let typing = TypingCoordinator::new(
            Arc::clone(&transport),
            user.clone(),
            config.typing_idle(),
            config.remote_typing_ttl(),
        );

        let connection_tx = events_tx.clone();
        let presence = PresenceEngine::new(
            Arc::clone(&transport),
            subscriptions.clone(),
            user.clone(),
            config.heartbeat_interval(),
            config.activity_window(),
            config.reconnect_delay(),
        )
        .with_listener(Arc::new(move |event: ConnectionEvent| {
            if connection_tx.send(SessionEvent::Connection(event)).is_err() {
                tracing::debug!("session event receiver dropped");
            }
        }));

        let session = Self {
            user,
            api,
            transport,
            subscriptions,
            messages: Arc::new(messages),
            typing: Arc::new(typing),
            presence: Arc::new(presence),
            notifier: Arc::new(Notifier { events: events_tx }),
            active: Mutex::new(None),
            closing: AtomicBool::new(false),
        };
        (session, events_rx)
    }

    /// Connect, subscribe the global channels and start the heartbeat.
    pub async fn start(&self) {
        self.closing.store(false, Ordering::SeqCst);
        self.presence.connect().await;
        self.subscriptions
            .ensure_subscribed(PRESENCE_CHANNEL, vec![Binding::from(self.presence.clone())])
            .await;
        self.subscriptions
            .ensure_subscribed(
                &user_channel(&self.user),
                vec![Binding::from(self.notifier.clone())],
            )
            .await;
        self.presence.start_heartbeat().await;
        tracing::info!(user = %self.user, "session started");
    }

    /// Load the conversation list and seed remote presence from it.
    pub async fn load_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let conversations = self.api.load_conversations().await?;
        let snapshot: Vec<(UserId, bool)> = conversations
            .iter()
            .flat_map(|c| c.participants.iter())
            .map(|p| (p.user_id.clone(), p.online))
            .collect();
        self.presence.seed(snapshot).await;
        Ok(conversations)
    }

    /// Switch to `conversation`.
    ///
    /// Leaves the previous conversation (releasing its channel and
    /// cancelling its retry and typing timers), subscribes the new one,
    /// loads its history and marks it read.
    pub async fn open_conversation(&self, conversation: ConversationId) -> Result<(), ClientError> {
        let previous = self.active.lock().await.replace(conversation.clone());
        if previous.as_ref() == Some(&conversation) {
            return Ok(());
        }
        if let Some(previous) = &previous {
            self.subscriptions
                .release(&conversation_channel(previous))
                .await;
        }

        self.messages
            .set_active_conversation(Some(conversation.clone()))
            .await;
        self.typing.enter(conversation.clone()).await;
        self.subscriptions
            .ensure_subscribed(
                &conversation_channel(&conversation),
                vec![
                    Binding::from(self.messages.clone()),
                    Binding::from(self.typing.clone()),
                ],
            )
            .await;
        tracing::info!(conversation = %conversation, "conversation opened");

        self.load(&conversation).await
    }

    /// Reload the active conversation's history.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let conversation = self
            .active_conversation()
            .await
            .ok_or(ClientError::NoActiveConversation)?;
        self.load(&conversation).await
    }

    /// Close the active conversation.
    pub async fn leave_conversation(&self) {
        let Some(conversation) = self.active.lock().await.take() else {
            return;
        };
        self.typing.leave().await;
        self.messages.set_active_conversation(None).await;
        self.subscriptions
            .release(&conversation_channel(&conversation))
            .await;
        tracing::info!(conversation = %conversation, "conversation left");
    }

    /// Send a text message in the active conversation.
    ///
    /// Stops the typing indicator first.
    pub async fn send_message(&self, text: &str) -> Option<TempId> {
        self.presence.record_activity().await;
        self.typing.stop().await;
        self.messages.send_message(text).await
    }

    /// The input field changed.
    pub async fn on_input(&self, text: &str) {
        self.presence.record_activity().await;
        self.typing.on_input(text).await;
    }

    /// Decode one transport frame and dispatch it to its channel's
    /// handlers. Returns the number of handlers reached.
    pub async fn handle_frame(&self, bytes: &[u8]) -> Result<usize, ClientError> {
        let frame = Frame::from_bytes(bytes)?;
        tracing::debug!(channel = %frame.channel, kind = frame.event.kind(), "frame received");
        Ok(self
            .subscriptions
            .dispatch(&frame.channel, &frame.event)
            .await)
    }

    /// Receive and dispatch one frame.
    ///
    /// A lost connection is reported to the reconnect policy before the
    /// error is returned. Undecodable frames are dropped with a
    /// warning.
    pub async fn pump(&self) -> Result<usize, ClientError> {
        let bytes = match self.transport.recv().await {
            Ok(bytes) => bytes,
            Err(e) => {
                if matches!(
                    e,
                    TransportError::ConnectionClosed
                        | TransportError::ReceiveFailed(_)
                        | TransportError::NotConnected
                ) && self.presence.is_connected().await
                {
                    self.presence.transport_lost(e.to_string()).await;
                }
                return Err(e.into());
            }
        };
        match self.handle_frame(&bytes).await {
            Ok(delivered) => Ok(delivered),
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable frame");
                Ok(0)
            }
        }
    }

    /// Pump frames until [`shutdown`](Self::shutdown).
    ///
    /// While the transport is down, waits for the next connection change.
    pub async fn run(&self) {
        let mut changes = self.presence.connection_changes();
        loop {
            if self.closing.load(Ordering::SeqCst) {
                break;
            }
            if self.pump().await.is_ok() {
                continue;
            }
            if self.closing.load(Ordering::SeqCst) || changes.changed().await.is_err() {
                break;
            }
        }
        tracing::debug!("session loop stopped");
    }

    /// Tear the session down.
    ///
    /// Leaves the active conversation, stops the heartbeat, cancels any
    /// reconnect, releases the global channels and closes the transport.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.leave_conversation().await;
        self.presence.shutdown().await;
        self.subscriptions.release(PRESENCE_CHANNEL).await;
        self.subscriptions.release(&user_channel(&self.user)).await;
        self.presence.disconnect().await;
        tracing::info!(user = %self.user, "session shut down");
    }

    /// The local user.
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// The open conversation.
    pub async fn active_conversation(&self) -> Option<ConversationId> {
        self.active.lock().await.clone()
    }

    /// The message engine.
    pub fn messages(&self) -> &MessageSync<A> {
        &self.messages
    }

    /// The typing coordinator.
    pub fn typing(&self) -> &TypingCoordinator<T> {
        &self.typing
    }

    /// The presence engine.
    pub fn presence(&self) -> &PresenceEngine<T> {
        &self.presence
    }

    /// The subscription manager.
    pub fn subscriptions(&self) -> &SubscriptionManager<T> {
        &self.subscriptions
    }

    async fn load(&self, conversation: &ConversationId) -> Result<(), ClientError> {
        let loaded = self.api.load_messages(conversation).await?;
        if self.active_conversation().await.as_ref() != Some(conversation) {
            tracing::debug!(conversation = %conversation, "discarding stale load");
            return Ok(());
        }
        self.messages.merge_history(loaded).await;
        self.messages.mark_conversation_read().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockApi;
    use crate::transport::MockTransport;
    use convo_sync_types::{Message, MessageId, Participant};

    fn conv(id: &str) -> ConversationId {
        ConversationId::from(id)
    }

    fn setup() -> (
        MockApi,
        MockTransport,
        ChatSession<MockApi, MockTransport>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let api = MockApi::new("alice");
        let transport = MockTransport::new();
        let (session, events) = ChatSession::new(
            "alice",
            api.clone(),
            transport.clone(),
            SessionConfig::default(),
        );
        (api, transport, session, events)
    }

    #[tokio::test]
    async fn start_connects_and_subscribes_global_channels() {
        let (_api, transport, session, mut events) = setup();

        session.start().await;

        assert!(transport.is_connected());
        assert_eq!(
            transport.subscribed(),
            vec!["presence".to_string(), "user-alice".to_string()]
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Connection(ConnectionEvent::Connected)
        );
    }

    #[tokio::test]
    async fn dropped_event_receiver_does_not_stop_session() {
        let (_api, transport, session, events) = setup();
        drop(events);

        session.start().await;
        session.shutdown().await;

        assert_eq!(transport.connect_calls(), 1);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn switching_conversations_releases_previous_channel() {
        let (_api, transport, session, _events) = setup();
        session.start().await;

        session.open_conversation(conv("c1")).await.unwrap();
        session.open_conversation(conv("c2")).await.unwrap();

        assert_eq!(transport.unsubscribe_calls(), vec!["conversation-c1".to_string()]);
        assert_eq!(session.subscriptions().ref_count("conversation-c1").await, 0);
        assert_eq!(session.subscriptions().ref_count("conversation-c2").await, 1);
        assert_eq!(session.active_conversation().await, Some(conv("c2")));
    }

    #[tokio::test]
    async fn open_loads_history_and_marks_read() {
        let (api, _transport, session, _events) = setup();
        api.insert_messages(
            &conv("c1"),
            vec![Message::canonical(
                MessageId::from("m1"),
                conv("c1"),
                UserId::from("bob"),
                "hello",
                1,
            )],
        );
        api.set_unread(&conv("c1"), vec![MessageId::from("m1")]);
        session.start().await;

        session.open_conversation(conv("c1")).await.unwrap();

        let messages = session.messages().messages().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].read_by.contains_key(&UserId::from("alice")));
        assert_eq!(api.marked_read().len(), 1);
    }

    #[tokio::test]
    async fn open_propagates_load_failure() {
        let (api, _transport, session, _events) = setup();
        api.fail_next_load("timeout");

        let result = session.open_conversation(conv("c1")).await;

        assert!(matches!(result, Err(ClientError::Api(_))));
        assert_eq!(session.active_conversation().await, Some(conv("c1")));
    }

    #[tokio::test]
    async fn refresh_requires_open_conversation() {
        let (_api, _transport, session, _events) = setup();

        assert!(matches!(
            session.refresh().await,
            Err(ClientError::NoActiveConversation)
        ));
    }

    #[tokio::test]
    async fn load_conversations_seeds_presence() {
        let (api, _transport, session, _events) = setup();
        api.set_conversations(vec![Conversation {
            id: conv("c1"),
            title: None,
            participants: vec![
                Participant {
                    user_id: UserId::from("alice"),
                    online: true,
                },
                Participant {
                    user_id: UserId::from("bob"),
                    online: true,
                },
            ],
            unread_count: 0,
            last_message: None,
        }]);

        let conversations = session.load_conversations().await.unwrap();

        assert_eq!(conversations.len(), 1);
        assert_eq!(
            session.presence().online_users().await,
            vec![UserId::from("bob")]
        );
    }

    #[tokio::test]
    async fn conversation_updates_are_forwarded() {
        let (_api, _transport, session, mut events) = setup();
        session.start().await;
        let _ = events.try_recv();

        let update = Conversation {
            id: conv("c1"),
            title: Some("team".into()),
            participants: vec![],
            unread_count: 3,
            last_message: None,
        };
        let frame = Frame::new("user-alice", PushEvent::ConversationUpdated(update.clone()));
        let delivered = session.handle_frame(&frame.to_bytes().unwrap()).await.unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::ConversationUpdated(update)
        );
    }

    #[tokio::test]
    async fn undecodable_frame_is_dropped() {
        let (_api, transport, session, _events) = setup();
        session.start().await;
        transport.queue_frame(b"not json".to_vec());

        assert_eq!(session.pump().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn shutdown_releases_everything() {
        let (_api, transport, session, _events) = setup();
        session.start().await;
        session.open_conversation(conv("c1")).await.unwrap();

        session.shutdown().await;

        assert!(!transport.is_connected());
        assert!(session.subscriptions().channels().await.is_empty());
        assert_eq!(session.active_conversation().await, None);
        assert!(!session.presence().is_connected().await);
    }
}
