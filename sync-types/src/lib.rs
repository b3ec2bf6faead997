//! # sync-types
//!
//! Wire format types for the Convo Sync conversation engine.
//!
//! This crate provides the foundational types used across all Convo Sync crates:
//! - [`UserId`], [`ConversationId`], [`MessageId`], [`TempId`] - Identity types
//! - [`Message`], [`Conversation`] - The chat data model
//! - [`PushEvent`], [`ClientEvent`] - Inbound and outbound events
//! - [`Frame`] - One delivery from the push transport
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod events;
mod frame;
mod ids;
mod messages;

pub use error::SyncError;
pub use events::{Activity, ClientEvent, PushEvent};
pub use frame::{conversation_channel, user_channel, Frame, PRESENCE_CHANNEL};
pub use ids::{ConversationId, MessageId, MessageRef, TempId, UserId};
pub use messages::{Conversation, DeliveryStatus, Message, MessageKind, Participant};
