//! Push transport abstraction for Convo Sync.
//!
//! This module provides a pluggable transport layer for the server-pushed
//! event stream (a Pusher/WebSocket-style channel service, or a mock).
//!
//! # Design
//!
//! The transport trait is async and channel-oriented:
//! - `connect()` establishes the connection
//! - `subscribe()` / `unsubscribe()` manage named channels
//! - `send()` publishes a client event on a channel
//! - `recv()` receives the next inbound [`Frame`](convo_sync_types::Frame) bytes
//! - `close()` gracefully terminates
//!
//! Delivery is at-least-once per channel with no ordering guarantee across
//! channels. Callers never surface transport errors to the user; they log
//! them and let the reconnect policy recover.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.connect().await?;
//! transport.subscribe("conversation-c1").await?;
//! let frame = Frame::from_bytes(&transport.recv().await?)?;
//! ```

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use convo_sync_types::ClientEvent;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Channel subscription failed.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,
}

/// Transport trait for the server-pushed event stream.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket channel service, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect (or reconnect) to the push service.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Subscribe to a named channel.
    async fn subscribe(&self, channel: &str) -> Result<(), TransportError>;

    /// Unsubscribe from a named channel.
    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError>;

    /// Publish an encoded client event on a channel.
    async fn send(&self, channel: &str, data: &[u8]) -> Result<(), TransportError>;

    /// Receive the next encoded inbound frame.
    ///
    /// Blocks until data is available or the connection drops.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Publish a client event, best-effort.
///
/// Suppressed while the transport is disconnected; encode and send
/// failures are logged. Returns `true` if the event went out.
pub(crate) async fn publish<T: Transport + ?Sized>(
    transport: &T,
    channel: &str,
    event: &ClientEvent,
) -> bool {
    if !transport.is_connected() {
        tracing::debug!(channel, ?event, "transport down, signal suppressed");
        return false;
    }
    let bytes = match event.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(channel, error = %e, "failed to encode client event");
            return false;
        }
    };
    match transport.send(channel, &bytes).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(channel, error = %e, "failed to send client event");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_sync_types::{Activity, UserId};

    fn heartbeat() -> ClientEvent {
        ClientEvent::Heartbeat {
            user_id: UserId::from("alice"),
            status: Activity::Active,
        }
    }

    #[tokio::test]
    async fn publish_sends_encoded_event() {
        let transport = MockTransport::connected();

        assert!(publish(&transport, "presence", &heartbeat()).await);

        let (channel, bytes) = transport.last_sent().unwrap();
        assert_eq!(channel, "presence");
        assert_eq!(ClientEvent::from_bytes(&bytes).unwrap(), heartbeat());
    }

    #[tokio::test]
    async fn publish_suppressed_while_disconnected() {
        let transport = MockTransport::new();

        assert!(!publish(&transport, "presence", &heartbeat()).await);
        assert!(transport.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_swallowed() {
        let transport = MockTransport::connected();
        transport.fail_next_send("busy");

        assert!(!publish(&transport, "presence", &heartbeat()).await);
    }
}
