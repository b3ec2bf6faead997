//! Transport connection state machine for Convo Sync.
//!
//! This module provides a pure, side-effect-free state machine for the push
//! transport's connection lifecycle. The state machine takes events as input
//! and produces a new state plus a list of actions to execute.
//!
//! Reconnection policy: whenever the transport enters a disconnected or
//! failed state, exactly one reconnect attempt is scheduled after a fixed
//! delay. Any previously scheduled attempt is cancelled first, so repeated
//! failure signals never stack timers.

use std::time::Duration;

/// Fixed delay before a reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    Disconnected,
    /// Connection attempt in progress.
    Connecting {
        /// Failed attempts before this one.
        attempt: u32,
    },
    /// Connected; channel subscriptions can deliver events.
    Connected,
    /// Disconnected, reconnect timer armed.
    Reconnecting {
        /// Number of failed attempts so far.
        attempt: u32,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected
            (Self::Disconnected, Event::ConnectRequested) => {
                (Self::Connecting { attempt: 0 }, vec![Action::Connect])
            }

            // From Connecting
            (Self::Connecting { .. }, Event::ConnectSucceeded) => connected(),
            (Self::Connecting { attempt }, Event::ConnectFailed { error }) => {
                let attempt = attempt.saturating_add(1);
                (
                    Self::Reconnecting { attempt },
                    rearm(Some(ConnectionEvent::ReconnectFailed { attempt, error })),
                )
            }
            (Self::Connecting { attempt }, Event::Disconnected { reason }) => (
                Self::Reconnecting {
                    attempt: attempt.saturating_add(1),
                },
                rearm(Some(ConnectionEvent::Disconnected { reason })),
            ),
            (Self::Connecting { .. }, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::Disconnect])
            }

            // From Connected
            (Self::Connected, Event::Disconnected { reason }) => (
                Self::Reconnecting { attempt: 0 },
                rearm(Some(ConnectionEvent::Disconnected { reason })),
            ),
            (Self::Connected, Event::DisconnectRequested) => (
                Self::Disconnected,
                vec![
                    Action::Disconnect,
                    Action::EmitEvent(ConnectionEvent::Disconnected {
                        reason: "user requested".into(),
                    }),
                ],
            ),

            // From Reconnecting
            (Self::Reconnecting { attempt }, Event::ReconnectTimer) => {
                (Self::Connecting { attempt }, vec![Action::Connect])
            }
            (Self::Reconnecting { .. }, Event::ConnectSucceeded) => connected(),
            (Self::Reconnecting { attempt }, Event::Disconnected { .. }) => {
                (Self::Reconnecting { attempt }, rearm(None))
            }
            (Self::Reconnecting { .. }, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::CancelReconnect])
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if currently trying to connect.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. } | Self::Reconnecting { .. })
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

fn connected() -> (ConnectionState, Vec<Action>) {
    (
        ConnectionState::Connected,
        vec![
            Action::CancelReconnect,
            Action::Resubscribe,
            Action::EmitEvent(ConnectionEvent::Connected),
        ],
    )
}

fn rearm(event: Option<ConnectionEvent>) -> Vec<Action> {
    let mut actions = Vec::with_capacity(3);
    if let Some(event) = event {
        actions.push(Action::EmitEvent(event));
    }
    actions.push(Action::CancelReconnect);
    actions.push(Action::StartReconnectTimer);
    actions
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Session requested a connection.
    ConnectRequested,
    /// Transport connection succeeded.
    ConnectSucceeded,
    /// Transport connection failed.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Transport entered a disconnected or failed state.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// Session requested disconnect.
    DisconnectRequested,
    /// Reconnect timer fired.
    ReconnectTimer,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. The sync-client interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Initiate transport connection.
    Connect,
    /// Close the transport.
    Disconnect,
    /// Arm the reconnect timer (fixed delay).
    StartReconnectTimer,
    /// Cancel any armed reconnect timer.
    CancelReconnect,
    /// Re-subscribe referenced channels that are not live.
    Resubscribe,
    /// Emit an event to the application.
    EmitEvent(ConnectionEvent),
}

/// Connection events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connected (or reconnected).
    Connected,
    /// Connection lost.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// A connection attempt failed.
    ReconnectFailed {
        /// Which attempt this was.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
}
