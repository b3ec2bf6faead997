//! Typing coordinator.
//!
//! Sending side: one `typing-start` when the input becomes non-empty, one
//! `typing-stop` after the inactivity timeout, when the input is cleared,
//! or when a message is sent. Receiving side: remote typists per
//! conversation, each entry expiring unless refreshed.
//!
//! Timers are keyed by conversation (and user, for remote entries) so
//! leaving a conversation cancels only its own.

use async_trait::async_trait;
use convo_sync_core::{LocalTyping, RemoteTyping, TypingAction};
use convo_sync_types::{conversation_channel, ClientEvent, ConversationId, PushEvent, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::subscription::EventHandler;
use crate::timers::TimerSet;
use crate::transport::{publish, Transport};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypingTimer {
    Idle(ConversationId),
    Remote(ConversationId, UserId),
}

impl TypingTimer {
    fn conversation(&self) -> &ConversationId {
        match self {
            Self::Idle(conversation) | Self::Remote(conversation, _) => conversation,
        }
    }
}

#[derive(Debug, Default)]
struct TypingState {
    active: Option<ConversationId>,
    local: LocalTyping,
    remote: RemoteTyping,
}

/// Debounced local typing broadcast and remote typing aggregation.
pub struct TypingCoordinator<T: Transport> {
    transport: Arc<T>,
    user: UserId,
    idle: Duration,
    remote_ttl: Duration,
    state: Arc<Mutex<TypingState>>,
    timers: Arc<Mutex<TimerSet<TypingTimer>>>,
}

impl<T: Transport> Clone for TypingCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            user: self.user.clone(),
            idle: self.idle,
            remote_ttl: self.remote_ttl,
            state: Arc::clone(&self.state),
            timers: Arc::clone(&self.timers),
        }
    }
}

impl<T: Transport + 'static> TypingCoordinator<T> {
    /// Create a coordinator for `user`.
    pub fn new(transport: Arc<T>, user: UserId, idle: Duration, remote_ttl: Duration) -> Self {
        Self {
            transport,
            user,
            idle,
            remote_ttl,
            state: Arc::new(Mutex::new(TypingState::default())),
            timers: Arc::new(Mutex::new(TimerSet::new())),
        }
    }

    /// Make `conversation` the active one, leaving the previous one first.
    pub async fn enter(&self, conversation: ConversationId) {
        let previous = self.state.lock().await.active.clone();
        if previous.as_ref() == Some(&conversation) {
            return;
        }
        if previous.is_some() {
            self.leave().await;
        }
        let mut state = self.state.lock().await;
        state.active = Some(conversation);
        state.local = LocalTyping::new();
    }

    /// Leave the active conversation.
    ///
    /// Broadcasts `typing=false` if needed, cancels the conversation's
    /// timers and forgets its remote typists.
    pub async fn leave(&self) {
        let (conversation, actions) = {
            let mut state = self.state.lock().await;
            let Some(conversation) = state.active.take() else {
                return;
            };
            let actions = state.local.stop();
            state.remote.clear(&conversation);
            (conversation, actions)
        };

        self.apply(&conversation, actions).await;
        let cancelled = self
            .timers
            .lock()
            .await
            .cancel_where(|key| key.conversation() == &conversation);
        tracing::debug!(conversation = %conversation, cancelled, "left typing scope");
    }

    /// The input field changed.
    pub async fn on_input(&self, text: &str) {
        let (conversation, actions) = {
            let mut state = self.state.lock().await;
            let Some(conversation) = state.active.clone() else {
                return;
            };
            let actions = state.local.on_input(text.trim().is_empty());
            (conversation, actions)
        };
        self.apply(&conversation, actions).await;
    }

    /// Stop typing now (message sent).
    pub async fn stop(&self) {
        let (conversation, actions) = {
            let mut state = self.state.lock().await;
            let Some(conversation) = state.active.clone() else {
                return;
            };
            (conversation, state.local.stop())
        };
        self.apply(&conversation, actions).await;
    }

    /// Remote users typing in `conversation`, sorted.
    pub async fn typing_users(&self, conversation: &ConversationId) -> Vec<UserId> {
        self.state.lock().await.remote.users(conversation)
    }

    /// Whether the local user is currently flagged as typing.
    pub async fn is_typing(&self) -> bool {
        self.state.lock().await.local.is_typing()
    }

    async fn apply(&self, conversation: &ConversationId, actions: Vec<TypingAction>) {
        for action in actions {
            match action {
                TypingAction::Broadcast { typing } => {
                    self.broadcast(conversation, typing).await;
                }
                TypingAction::ArmIdleTimer => {
                    let task = self.clone().idle_expired(conversation.clone());
                    self.timers.lock().await.schedule(
                        TypingTimer::Idle(conversation.clone()),
                        self.idle,
                        task,
                    );
                }
                TypingAction::CancelIdleTimer => {
                    self.timers
                        .lock()
                        .await
                        .cancel(&TypingTimer::Idle(conversation.clone()));
                }
            }
        }
    }

    async fn idle_expired(self, conversation: ConversationId) {
        self.timers
            .lock()
            .await
            .forget(&TypingTimer::Idle(conversation.clone()));
        let actions = {
            let mut state = self.state.lock().await;
            if state.active.as_ref() != Some(&conversation) {
                return;
            }
            state.local.on_idle_timeout()
        };
        for action in actions {
            if let TypingAction::Broadcast { typing } = action {
                self.broadcast(&conversation, typing).await;
            }
        }
    }

    async fn broadcast(&self, conversation: &ConversationId, typing: bool) {
        let event = if typing {
            ClientEvent::TypingStart {
                conversation_id: conversation.clone(),
                user_id: self.user.clone(),
            }
        } else {
            ClientEvent::TypingStop {
                conversation_id: conversation.clone(),
                user_id: self.user.clone(),
            }
        };
        if publish(
            self.transport.as_ref(),
            &conversation_channel(conversation),
            &event,
        )
        .await
        {
            tracing::debug!(conversation = %conversation, typing, "typing broadcast");
        }
    }

    async fn remote_started(&self, conversation: &ConversationId, user: &UserId) {
        {
            let mut state = self.state.lock().await;
            if state.active.as_ref() != Some(conversation) {
                return;
            }
            state.remote.start(conversation, user);
        }

        let expiry = self.clone();
        let (conv, typist) = (conversation.clone(), user.clone());
        self.timers.lock().await.schedule(
            TypingTimer::Remote(conversation.clone(), user.clone()),
            self.remote_ttl,
            async move {
                expiry
                    .timers
                    .lock()
                    .await
                    .forget(&TypingTimer::Remote(conv.clone(), typist.clone()));
                if expiry.state.lock().await.remote.stop(&conv, &typist) {
                    tracing::debug!(conversation = %conv, user = %typist, "remote typing expired");
                }
            },
        );
    }

    async fn remote_stopped(&self, conversation: &ConversationId, user: &UserId) {
        self.state.lock().await.remote.stop(conversation, user);
        self.timers
            .lock()
            .await
            .cancel(&TypingTimer::Remote(conversation.clone(), user.clone()));
    }
}

#[async_trait]
impl<T: Transport + 'static> EventHandler for TypingCoordinator<T> {
    async fn handle(&self, _channel: &str, event: &PushEvent) {
        match event {
            PushEvent::TypingStart {
                conversation_id,
                user_id,
            } if *user_id != self.user => {
                self.remote_started(conversation_id, user_id).await;
            }
            PushEvent::TypingStop {
                conversation_id,
                user_id,
            } if *user_id != self.user => {
                self.remote_stopped(conversation_id, user_id).await;
            }
            _ => {}
        }
    }
}
