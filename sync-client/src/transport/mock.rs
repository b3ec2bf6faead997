//! Mock transport for testing.
//!
//! Allows queueing inbound frames and capturing subscriptions and sent
//! client events for verification.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Mock transport for testing.
///
/// Allows queueing inbound frames and capturing subscriptions and sent
/// client events for verification.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connect_calls: usize,
    subscribed: BTreeSet<String>,
    subscribe_calls: Vec<String>,
    unsubscribe_calls: Vec<String>,
    sent_messages: Vec<(String, Vec<u8>)>,
    receive_queue: VecDeque<Vec<u8>>,
    fail_next_connect: Option<String>,
    fail_next_subscribe: Option<String>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

impl MockTransport {
    /// Create a new, disconnected mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport that is already connected.
    pub fn connected() -> Self {
        let transport = Self::default();
        transport.inner.lock().unwrap().connected = true;
        transport
    }

    /// Queue a frame to be returned by the next `recv()` call.
    pub fn queue_frame(&self, data: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.receive_queue.push_back(data);
    }

    /// Get all client events that were sent, with their channel.
    pub fn sent_messages(&self) -> Vec<(String, Vec<u8>)> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.clone()
    }

    /// Get the last client event that was sent.
    pub fn last_sent(&self) -> Option<(String, Vec<u8>)> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.last().cloned()
    }

    /// Channels currently subscribed.
    pub fn subscribed(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.subscribed.iter().cloned().collect()
    }

    /// Every successful `subscribe()` call, in order.
    pub fn subscribe_calls(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.subscribe_calls.clone()
    }

    /// Every `unsubscribe()` call, in order.
    pub fn unsubscribe_calls(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.unsubscribe_calls.clone()
    }

    /// Number of `connect()` calls, including failed ones.
    pub fn connect_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.connect_calls
    }

    /// Simulate the server dropping the connection.
    ///
    /// Subscriptions are lost, as with a real channel service.
    pub fn drop_connection(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner.subscribed.clear();
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_connect = Some(error.to_string());
    }

    /// Cause the next subscribe() to fail with the given error.
    pub fn fail_next_subscribe(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_subscribe = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_recv = Some(error.to_string());
    }

    /// Clear all state (calls, queues, connection).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_calls += 1;

        // Check for forced failure
        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        if let Some(error) = inner.fail_next_subscribe.take() {
            return Err(TransportError::SubscribeFailed(error));
        }

        inner.subscribed.insert(channel.to_string());
        inner.subscribe_calls.push(channel.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.unsubscribe_calls.push(channel.to_string());

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        inner.subscribed.remove(channel);
        Ok(())
    }

    async fn send(&self, channel: &str, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner
            .sent_messages
            .push((channel.to_string(), data.to_vec()));
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_recv.take() {
            return Err(TransportError::ReceiveFailed(error));
        }

        inner
            .receive_queue
            .pop_front()
            .ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner.subscribed.clear();
        Ok(())
    }
}
