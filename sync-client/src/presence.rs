//! Presence engine.
//!
//! Tracks three things:
//! - remote users' online state, from push events and the conversation
//!   list snapshot;
//! - the local user's connectivity and input recency, reported by a
//!   periodic heartbeat;
//! - the push transport's connection, driving the sync-core
//!   [`ConnectionState`] machine and its fixed-delay reconnect policy.
//!
//! # Architecture
//!
//! ```text
//! transport_lost / connect ──► ConnectionState::on_event ──► Actions
//!                                                              │
//!                      Connect / Disconnect / timers / resubscribe / emit
//! ```

use async_trait::async_trait;
use convo_sync_core::{
    Action, ConnectionEvent, ConnectionState, Event, LocalPresence, PresenceSet,
};
use convo_sync_types::{Activity, ClientEvent, PushEvent, UserId, PRESENCE_CHANNEL};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::subscription::{EventHandler, SubscriptionManager};
use crate::timers::TimerSet;
use crate::transport::{publish, Transport};

/// Callback receiving connection lifecycle events.
pub type ConnectionListener = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PresenceTimer {
    Heartbeat,
    Reconnect,
}

/// Local and remote presence plus transport reconnection.
pub struct PresenceEngine<T: Transport> {
    transport: Arc<T>,
    subscriptions: SubscriptionManager<T>,
    user: UserId,
    heartbeat_interval: Duration,
    reconnect_delay: Duration,
    remote: Arc<Mutex<PresenceSet>>,
    local: Arc<Mutex<LocalPresence>>,
    connection: Arc<Mutex<ConnectionState>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    listener: Option<ConnectionListener>,
    timers: Arc<Mutex<TimerSet<PresenceTimer>>>,
}

impl<T: Transport> Clone for PresenceEngine<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            subscriptions: self.subscriptions.clone(),
            user: self.user.clone(),
            heartbeat_interval: self.heartbeat_interval,
            reconnect_delay: self.reconnect_delay,
            remote: Arc::clone(&self.remote),
            local: Arc::clone(&self.local),
            connection: Arc::clone(&self.connection),
            state_tx: Arc::clone(&self.state_tx),
            listener: self.listener.clone(),
            timers: Arc::clone(&self.timers),
        }
    }
}

impl<T: Transport + 'static> PresenceEngine<T> {
    /// Create an engine for `user`.
    ///
    /// The engine starts disconnected, network online, with input "now".
    pub fn new(
        transport: Arc<T>,
        subscriptions: SubscriptionManager<T>,
        user: UserId,
        heartbeat_interval: Duration,
        activity_window: Duration,
        reconnect_delay: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::new());
        Self {
            transport,
            subscriptions,
            user,
            heartbeat_interval,
            reconnect_delay,
            remote: Arc::new(Mutex::new(PresenceSet::new())),
            local: Arc::new(Mutex::new(LocalPresence::new(now(), activity_window))),
            connection: Arc::new(Mutex::new(ConnectionState::new())),
            state_tx: Arc::new(state_tx),
            listener: None,
            timers: Arc::new(Mutex::new(TimerSet::new())),
        }
    }

    /// Deliver connection events to `listener`.
    pub fn with_listener(mut self, listener: ConnectionListener) -> Self {
        self.listener = Some(listener);
        self
    }

    // ===========================================
    // Local presence
    // ===========================================

    /// Record a local input event (keystroke, click).
    pub async fn record_activity(&self) {
        self.local.lock().await.record_input(now());
    }

    /// Record a connectivity change reported by the platform.
    pub async fn set_network_online(&self, online: bool) {
        if self.local.lock().await.set_network_online(online) {
            tracing::info!(online, "network connectivity changed");
        }
    }

    /// Activity the next heartbeat would report.
    pub async fn current_activity(&self) -> Activity {
        self.local.lock().await.activity_at(now())
    }

    /// Start the periodic heartbeat, replacing any running one.
    pub async fn start_heartbeat(&self) {
        let engine = self.clone();
        let period = self.heartbeat_interval;
        self.timers
            .lock()
            .await
            .spawn(PresenceTimer::Heartbeat, async move {
                let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
                loop {
                    ticks.tick().await;
                    engine.heartbeat_tick().await;
                }
            });
        tracing::debug!(period_secs = period.as_secs(), "heartbeat started");
    }

    /// Stop the periodic heartbeat.
    pub async fn stop_heartbeat(&self) {
        if self.timers.lock().await.cancel(&PresenceTimer::Heartbeat) {
            tracing::debug!("heartbeat stopped");
        }
    }

    /// Send one heartbeat now.
    ///
    /// Returns the reported activity, or `None` if the heartbeat was
    /// suppressed (network offline, transport down) or failed.
    pub async fn heartbeat_tick(&self) -> Option<Activity> {
        let status = self
            .local
            .lock()
            .await
            .heartbeat(now(), self.transport.is_connected())?;
        let event = ClientEvent::Heartbeat {
            user_id: self.user.clone(),
            status,
        };
        publish(self.transport.as_ref(), PRESENCE_CHANNEL, &event)
            .await
            .then_some(status)
    }

    // ===========================================
    // Remote presence
    // ===========================================

    /// Apply a bulk `(user, online)` snapshot. The local user is skipped.
    pub async fn seed<I>(&self, snapshot: I)
    where
        I: IntoIterator<Item = (UserId, bool)>,
    {
        let user = &self.user;
        self.remote
            .lock()
            .await
            .seed(snapshot.into_iter().filter(|(id, _)| id != user));
    }

    /// Check if a remote user is online.
    pub async fn is_online(&self, user: &UserId) -> bool {
        self.remote.lock().await.is_online(user)
    }

    /// All online remote users, sorted.
    pub async fn online_users(&self) -> Vec<UserId> {
        self.remote.lock().await.online_users()
    }

    // ===========================================
    // Transport connection
    // ===========================================

    /// Connect the transport.
    pub async fn connect(&self) {
        self.drive(Event::ConnectRequested).await;
    }

    /// Report that the transport entered a disconnected or failed state.
    ///
    /// Schedules a single reconnect attempt, replacing any armed one.
    pub async fn transport_lost(&self, reason: impl Into<String>) {
        self.subscriptions.mark_all_down().await;
        self.drive(Event::Disconnected {
            reason: reason.into(),
        })
        .await;
    }

    /// Disconnect on purpose, cancelling any reconnect.
    pub async fn disconnect(&self) {
        self.drive(Event::DisconnectRequested).await;
    }

    /// Current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.lock().await.clone()
    }

    /// Check if the transport is connected.
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_connected()
    }

    /// Watch connection state changes.
    pub fn connection_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Check if a reconnect attempt is armed.
    pub async fn reconnect_scheduled(&self) -> bool {
        self.timers.lock().await.is_scheduled(&PresenceTimer::Reconnect)
    }

    /// Stop the heartbeat and cancel any reconnect.
    pub async fn shutdown(&self) {
        self.timers.lock().await.cancel_all();
    }

    async fn drive(&self, event: Event) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let actions = {
                let mut connection = self.connection.lock().await;
                let (next, actions) = connection.clone().on_event(event);
                *connection = next.clone();
                self.state_tx.send_replace(next);
                actions
            };
            for action in actions {
                if let Some(follow_up) = self.execute(action).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&self, action: Action) -> Option<Event> {
        match action {
            Action::Connect => match self.transport.connect().await {
                Ok(()) => Some(Event::ConnectSucceeded),
                Err(e) => Some(Event::ConnectFailed {
                    error: e.to_string(),
                }),
            },
            Action::Disconnect => {
                if let Err(e) = self.transport.close().await {
                    tracing::warn!(error = %e, "failed to close transport");
                }
                None
            }
            Action::StartReconnectTimer => {
                let task = self.reconnect_attempt();
                self.timers
                    .lock()
                    .await
                    .schedule(PresenceTimer::Reconnect, self.reconnect_delay, task);
                tracing::debug!(
                    delay_ms = self.reconnect_delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                None
            }
            Action::CancelReconnect => {
                self.timers.lock().await.cancel(&PresenceTimer::Reconnect);
                None
            }
            Action::Resubscribe => {
                self.subscriptions.resubscribe_all().await;
                None
            }
            Action::EmitEvent(event) => {
                match &event {
                    ConnectionEvent::Connected => tracing::info!("transport connected"),
                    ConnectionEvent::Disconnected { reason } => {
                        tracing::warn!(%reason, "transport disconnected")
                    }
                    ConnectionEvent::ReconnectFailed { attempt, error } => {
                        tracing::warn!(attempt, %error, "reconnect failed")
                    }
                }
                if let Some(listener) = &self.listener {
                    listener(event);
                }
                None
            }
        }
    }

    // Boxed so the timer task's type does not depend on itself.
    fn reconnect_attempt(&self) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        let engine = self.clone();
        Box::pin(async move {
            engine.timers.lock().await.forget(&PresenceTimer::Reconnect);
            engine.drive(Event::ReconnectTimer).await;
        })
    }
}

#[async_trait]
impl<T: Transport + 'static> EventHandler for PresenceEngine<T> {
    async fn handle(&self, _channel: &str, event: &PushEvent) {
        match event {
            PushEvent::UserOnline { user_id } if *user_id != self.user => {
                if self.remote.lock().await.set_online(user_id) {
                    tracing::debug!(user = %user_id, "user online");
                }
            }
            PushEvent::UserOffline { user_id } if *user_id != self.user => {
                if self.remote.lock().await.set_offline(user_id) {
                    tracing::debug!(user = %user_id, "user offline");
                }
            }
            _ => {}
        }
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}
