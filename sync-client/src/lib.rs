//! # sync-client
//!
//! Client-resident conversation sync engine for Convo Sync.
//!
//! Keeps a local view of messages, read receipts, typing activity and user
//! presence consistent with a remote store and a server-pushed event
//! stream, hiding network latency behind optimistic updates.
//!
//! ## Features
//!
//! - **Optimistic send**: messages appear immediately as pending and are
//!   reconciled with the store's canonical copy, whichever of the send
//!   response or the pushed event arrives first
//! - **Retry**: one automatic retry after a fixed delay, then manual
//! - **Ref-counted subscriptions**: one transport subscription per channel
//! - **Presence and typing**: heartbeat, debounced typing broadcast,
//!   fixed-delay reconnect
//! - **Pure State Machines**: decisions come from sync-core; this crate
//!   only performs the I/O and owns the timers
//!
//! ## Example
//!
//! ```ignore
//! use convo_sync_client::{ChatSession, SessionConfig};
//!
//! let (session, mut events) = ChatSession::new("alice", api, transport, SessionConfig::default());
//! session.start().await;
//! session.open_conversation("c1".into()).await?;
//!
//! // Visible immediately as pending, confirmed when the store answers
//! session.send_message("hi").await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod messages;
pub mod presence;
pub mod session;
pub mod subscription;
pub mod timers;
pub mod transport;
pub mod typing;

pub use api::{ApiError, ChatApi, MockApi};
pub use config::{ConfigError, SessionConfig};
pub use messages::MessageSync;
pub use presence::{ConnectionListener, PresenceEngine};
pub use session::{ChatSession, ClientError, SessionEvent};
pub use subscription::{Binding, EventHandler, SubscriptionManager};
pub use timers::TimerSet;
pub use transport::{MockTransport, Transport, TransportError};
pub use typing::TypingCoordinator;

pub use convo_sync_core::{ConnectionEvent, ConnectionState, Reconciled};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch.
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
