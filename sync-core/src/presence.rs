//! Presence tracking for Convo Sync.
//!
//! - [`PresenceSet`]: which remote users are online, driven purely by
//!   push events and the bulk snapshot from the conversation list.
//! - [`LocalPresence`]: the local user's connectivity and activity, merged
//!   into the status the heartbeat reports.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use convo_sync_types::{Activity, UserId};

/// Default window after the last input during which the user is active.
pub const DEFAULT_ACTIVITY_WINDOW: Duration = Duration::from_secs(60);

/// Set of online remote users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSet {
    online: BTreeSet<UserId>,
}

impl PresenceSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user online. Returns `true` if this changed the set.
    pub fn set_online(&mut self, user: &UserId) -> bool {
        self.online.insert(user.clone())
    }

    /// Mark a user offline. Returns `true` if this changed the set.
    pub fn set_offline(&mut self, user: &UserId) -> bool {
        self.online.remove(user)
    }

    /// Apply a bulk snapshot of `(user, online)` pairs.
    pub fn seed<I>(&mut self, snapshot: I)
    where
        I: IntoIterator<Item = (UserId, bool)>,
    {
        for (user, online) in snapshot {
            if online {
                self.online.insert(user);
            } else {
                self.online.remove(&user);
            }
        }
    }

    /// Check if a user is online.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.contains(user)
    }

    /// All online users, sorted.
    pub fn online_users(&self) -> Vec<UserId> {
        self.online.iter().cloned().collect()
    }

    /// Number of online users.
    pub fn len(&self) -> usize {
        self.online.len()
    }

    /// Check if nobody is online.
    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}

/// Local connectivity and input recency.
#[derive(Debug, Clone)]
pub struct LocalPresence {
    network_online: bool,
    last_input: Instant,
    window: Duration,
}

impl LocalPresence {
    /// Start online, with input "now".
    pub fn new(now: Instant, window: Duration) -> Self {
        Self {
            network_online: true,
            last_input: now,
            window,
        }
    }

    /// Record an input event.
    pub fn record_input(&mut self, now: Instant) {
        if now > self.last_input {
            self.last_input = now;
        }
    }

    /// Update network connectivity. Returns `true` if it changed.
    pub fn set_network_online(&mut self, online: bool) -> bool {
        let changed = self.network_online != online;
        self.network_online = online;
        changed
    }

    /// Current network connectivity.
    pub fn is_network_online(&self) -> bool {
        self.network_online
    }

    /// Activity derived from input recency.
    pub fn activity_at(&self, now: Instant) -> Activity {
        if now.saturating_duration_since(self.last_input) <= self.window {
            Activity::Active
        } else {
            Activity::Away
        }
    }

    /// Status to report on a heartbeat tick, or `None` if the heartbeat
    /// must be suppressed (network offline or transport disconnected).
    pub fn heartbeat(&self, now: Instant, transport_connected: bool) -> Option<Activity> {
        if !self.network_online || !transport_connected {
            return None;
        }
        Some(self.activity_at(now))
    }
}
