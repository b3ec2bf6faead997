//! Subscription manager for Convo Sync.
//!
//! Wraps the pure [`ChannelTable`] and performs the transport calls it asks
//! for. Subscribe and unsubscribe failures are logged and never returned:
//! a channel that failed to bind simply delivers nothing until the next
//! successful subscribe (see [`SubscriptionManager::resubscribe_all`]).

use async_trait::async_trait;
use convo_sync_core::{ChannelAction, ChannelTable};
use convo_sync_types::PushEvent;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::transport::Transport;

/// Receives push events for the channels it is bound to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event delivered on `channel`.
    ///
    /// Events may arrive duplicated or out of order.
    async fn handle(&self, channel: &str, event: &PushEvent);
}

/// A handler bound to a channel.
///
/// Two bindings are equal when they point at the same handler instance.
#[derive(Clone)]
pub struct Binding(Arc<dyn EventHandler>);

impl Binding {
    /// Bind a shared handler.
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self(handler)
    }

    /// Deliver an event to the bound handler.
    pub async fn handle(&self, channel: &str, event: &PushEvent) {
        self.0.handle(channel, event).await;
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl<H: EventHandler + 'static> From<Arc<H>> for Binding {
    fn from(handler: Arc<H>) -> Self {
        Self(handler)
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.addr(), other.addr())
    }
}

impl Eq for Binding {}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binding({:p})", self.addr())
    }
}

/// Reference-counted channel subscriptions over a [`Transport`].
pub struct SubscriptionManager<T: Transport> {
    transport: Arc<T>,
    table: Arc<Mutex<ChannelTable<Binding>>>,
}

impl<T: Transport> Clone for SubscriptionManager<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            table: Arc::clone(&self.table),
        }
    }
}

impl<T: Transport> SubscriptionManager<T> {
    /// Create a manager with no subscriptions.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            table: Arc::new(Mutex::new(ChannelTable::new())),
        }
    }

    /// Take a reference to `channel`, binding `handlers`.
    ///
    /// Only the first reference subscribes on the transport.
    pub async fn ensure_subscribed(&self, channel: &str, handlers: Vec<Binding>) {
        let mut table = self.table.lock().await;
        match table.acquire(channel, handlers) {
            ChannelAction::Subscribe(name) => self.subscribe_locked(&mut table, &name).await,
            _ => {
                tracing::debug!(
                    channel,
                    refs = table.ref_count(channel),
                    "reusing channel subscription"
                );
            }
        }
    }

    /// Drop a reference to `channel`.
    ///
    /// The last reference unbinds all handlers and unsubscribes.
    pub async fn release(&self, channel: &str) {
        let mut table = self.table.lock().await;
        let ChannelAction::Unsubscribe(name) = table.release(channel) else {
            return;
        };

        // The table stays locked until the unsubscribe lands, so a
        // concurrent acquire of the same channel subscribes after it.
        if !self.transport.is_connected() {
            tracing::debug!(channel = %name, "released channel while disconnected");
            return;
        }
        match self.transport.unsubscribe(&name).await {
            Ok(()) => tracing::debug!(channel = %name, "unsubscribed"),
            Err(e) => tracing::warn!(channel = %name, error = %e, "unsubscribe failed"),
        }
    }

    /// Deliver an event to every handler bound to `channel`.
    ///
    /// Events for channels nobody references are dropped.
    pub async fn dispatch(&self, channel: &str, event: &PushEvent) -> usize {
        let handlers = self.table.lock().await.handlers(channel);
        if handlers.is_empty() {
            tracing::debug!(channel, kind = event.kind(), "no handler for event");
            return 0;
        }
        for handler in &handlers {
            handler.handle(channel, event).await;
        }
        handlers.len()
    }

    /// Subscribe every referenced channel that is not live.
    ///
    /// Called after the transport (re)connects. Reference counts are left
    /// untouched.
    pub async fn resubscribe_all(&self) {
        let mut table = self.table.lock().await;
        for channel in table.needs_subscribe() {
            self.subscribe_locked(&mut table, &channel).await;
        }
    }

    /// Mark every channel as down after the transport connection was lost.
    pub async fn mark_all_down(&self) {
        self.table.lock().await.mark_all_down();
    }

    /// Current reference count for `channel`.
    pub async fn ref_count(&self, channel: &str) -> usize {
        self.table.lock().await.ref_count(channel)
    }

    /// Check if `channel` is live on the transport.
    pub async fn is_subscribed(&self, channel: &str) -> bool {
        self.table.lock().await.is_live(channel)
    }

    /// All referenced channels, sorted.
    pub async fn channels(&self) -> Vec<String> {
        self.table.lock().await.channels()
    }

    async fn subscribe_locked(&self, table: &mut ChannelTable<Binding>, channel: &str) {
        if !self.transport.is_connected() {
            tracing::debug!(channel, "transport down, subscribe deferred");
            return;
        }
        match self.transport.subscribe(channel).await {
            Ok(()) => {
                table.set_live(channel, true);
                tracing::debug!(channel, "subscribed");
            }
            Err(e) => tracing::warn!(channel, error = %e, "subscribe failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use convo_sync_types::UserId;

    #[derive(Default)]
    struct Recorder {
        seen: std::sync::Mutex<Vec<(String, &'static str)>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<(String, &'static str)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, channel: &str, event: &PushEvent) {
            self.seen
                .lock()
                .unwrap()
                .push((channel.to_string(), event.kind()));
        }
    }

    fn online(user: &str) -> PushEvent {
        PushEvent::UserOnline {
            user_id: UserId::from(user),
        }
    }

    fn setup() -> (MockTransport, SubscriptionManager<MockTransport>) {
        let transport = MockTransport::connected();
        let manager = SubscriptionManager::new(Arc::new(transport.clone()));
        (transport, manager)
    }

    // ===========================================
    // Reference counting
    // ===========================================

    #[tokio::test]
    async fn shared_channel_subscribes_once() {
        let (transport, manager) = setup();
        let h1 = Arc::new(Recorder::default());
        let h2 = Arc::new(Recorder::default());

        manager
            .ensure_subscribed("c1", vec![Binding::from(h1.clone())])
            .await;
        manager
            .ensure_subscribed("c1", vec![Binding::from(h2.clone())])
            .await;

        assert_eq!(transport.subscribe_calls(), vec!["c1".to_string()]);
        assert_eq!(manager.ref_count("c1").await, 2);

        manager.release("c1").await;
        assert!(transport.unsubscribe_calls().is_empty());

        manager.release("c1").await;
        assert_eq!(transport.unsubscribe_calls(), vec!["c1".to_string()]);
        assert_eq!(manager.ref_count("c1").await, 0);
    }

    #[tokio::test]
    async fn release_of_unknown_channel_is_noop() {
        let (transport, manager) = setup();

        manager.release("nope").await;

        assert!(transport.unsubscribe_calls().is_empty());
    }

    // ===========================================
    // Dispatch
    // ===========================================

    #[tokio::test]
    async fn dispatch_reaches_all_bound_handlers_once() {
        let (_transport, manager) = setup();
        let h1 = Arc::new(Recorder::default());
        let h2 = Arc::new(Recorder::default());

        manager
            .ensure_subscribed("presence", vec![Binding::from(h1.clone())])
            .await;
        manager
            .ensure_subscribed(
                "presence",
                vec![Binding::from(h1.clone()), Binding::from(h2.clone())],
            )
            .await;

        let delivered = manager.dispatch("presence", &online("bob")).await;

        assert_eq!(delivered, 2);
        assert_eq!(h1.seen().len(), 1);
        assert_eq!(h2.seen(), vec![("presence".to_string(), "user-online")]);
    }

    #[tokio::test]
    async fn released_channel_stops_dispatching() {
        let (_transport, manager) = setup();
        let handler = Arc::new(Recorder::default());

        manager
            .ensure_subscribed("c1", vec![Binding::from(handler.clone())])
            .await;
        manager.release("c1").await;

        assert_eq!(manager.dispatch("c1", &online("bob")).await, 0);
        assert!(handler.seen().is_empty());
    }

    // ===========================================
    // Failures and reconnect
    // ===========================================

    #[tokio::test]
    async fn subscribe_failure_is_swallowed_and_retried_on_resubscribe() {
        let (transport, manager) = setup();
        transport.fail_next_subscribe("denied");

        manager.ensure_subscribed("c1", vec![]).await;
        assert!(!manager.is_subscribed("c1").await);
        assert_eq!(manager.ref_count("c1").await, 1);

        manager.resubscribe_all().await;
        assert!(manager.is_subscribed("c1").await);
        assert_eq!(manager.ref_count("c1").await, 1);
    }

    #[tokio::test]
    async fn subscribe_deferred_while_disconnected() {
        let transport = MockTransport::new();
        let manager = SubscriptionManager::new(Arc::new(transport.clone()));

        manager.ensure_subscribed("c1", vec![]).await;
        assert!(transport.subscribe_calls().is_empty());

        transport.connect().await.unwrap();
        manager.resubscribe_all().await;
        assert_eq!(transport.subscribe_calls(), vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn mark_all_down_then_resubscribe_restores_channels() {
        let (transport, manager) = setup();
        manager.ensure_subscribed("a", vec![]).await;
        manager.ensure_subscribed("b", vec![]).await;

        transport.drop_connection();
        manager.mark_all_down().await;
        assert!(!manager.is_subscribed("a").await);

        transport.connect().await.unwrap();
        manager.resubscribe_all().await;

        assert_eq!(transport.subscribed(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(manager.channels().await, vec!["a".to_string(), "b".to_string()]);
    }

    /// Delays every unsubscribe so a switch can race it.
    struct SlowUnsubscribe {
        inner: MockTransport,
        delay: std::time::Duration,
    }

    #[async_trait]
    impl Transport for SlowUnsubscribe {
        async fn connect(&self) -> Result<(), crate::transport::TransportError> {
            self.inner.connect().await
        }

        async fn subscribe(&self, channel: &str) -> Result<(), crate::transport::TransportError> {
            self.inner.subscribe(channel).await
        }

        async fn unsubscribe(&self, channel: &str) -> Result<(), crate::transport::TransportError> {
            tokio::time::sleep(self.delay).await;
            self.inner.unsubscribe(channel).await
        }

        async fn send(
            &self,
            channel: &str,
            data: &[u8],
        ) -> Result<(), crate::transport::TransportError> {
            self.inner.send(channel, data).await
        }

        async fn recv(&self) -> Result<Vec<u8>, crate::transport::TransportError> {
            self.inner.recv().await
        }

        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }

        async fn close(&self) -> Result<(), crate::transport::TransportError> {
            self.inner.close().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reacquire_during_unsubscribe_ends_subscribed() {
        let transport = MockTransport::connected();
        let manager = SubscriptionManager::new(Arc::new(SlowUnsubscribe {
            inner: transport.clone(),
            delay: std::time::Duration::from_millis(100),
        }));
        manager.ensure_subscribed("c1", vec![]).await;

        let releasing = manager.clone();
        let release = tokio::spawn(async move { releasing.release("c1").await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        manager.ensure_subscribed("c1", vec![]).await;
        release.await.unwrap();

        assert_eq!(manager.ref_count("c1").await, 1);
        assert!(manager.is_subscribed("c1").await);
        assert_eq!(transport.subscribed(), vec!["c1".to_string()]);
        assert_eq!(
            transport.subscribe_calls(),
            vec!["c1".to_string(), "c1".to_string()]
        );
    }

    #[test]
    fn binding_equality_is_pointer_identity() {
        let h1 = Arc::new(Recorder::default());
        let h2 = Arc::new(Recorder::default());

        assert_eq!(Binding::from(h1.clone()), Binding::from(h1.clone()));
        assert_ne!(Binding::from(h1), Binding::from(h2));
    }
}
