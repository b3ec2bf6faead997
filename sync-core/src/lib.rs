//! # sync-core
//!
//! Pure logic for Convo Sync (no I/O, instant tests).
//!
//! Everything here is synchronous bookkeeping for a chat client:
//!
//! - [`Timeline`]: the ordered message list, optimistic sends and their
//!   reconciliation with canonical copies
//! - [`ChannelTable`]: per-channel reference counts and bound handlers
//! - [`LocalTyping`] / [`RemoteTyping`]: typing debounce and remote typists
//! - [`PresenceSet`] / [`LocalPresence`]: who is online, and whether we are
//! - [`ConnectionState`]: the push transport's connect/reconnect machine
//!
//! Transitions return what should happen next (a request to send, a
//! channel to subscribe, a timer to arm) and never perform it. The async
//! engines in `sync-client` own the network calls and the timers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pending;
pub mod presence;
pub mod state;
pub mod subscription;
pub mod timeline;
pub mod typing;

pub use pending::{PendingRegistry, PendingSend, SendAttempt};
pub use presence::{LocalPresence, PresenceSet, DEFAULT_ACTIVITY_WINDOW};
pub use state::{Action, ConnectionEvent, ConnectionState, Event, RECONNECT_DELAY};
pub use subscription::{ChannelAction, ChannelTable};
pub use timeline::{Reconciled, SendFailure, SendRequest, Timeline};
pub use typing::{LocalTyping, RemoteTyping, TypingAction};
