//! Pending-send registry for Convo Sync.
//!
//! Tracks every locally created message that the store has not confirmed:
//! - which send attempt is in flight (initial, automatic retry, manual)
//! - whether the single automatic retry has been used
//!
//! Armed retry timers are owned by the client, not tracked here.
//!
//! The registry holds bookkeeping only. The message itself lives in the
//! [`Timeline`](crate::Timeline), which is the only owner of a registry.

use std::collections::HashMap;
use convo_sync_types::TempId;

/// Which kind of send attempt is in flight for a pending message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendAttempt {
    /// First send, issued by `send_message`.
    Initial,
    /// The one automatic retry after the initial send failed.
    AutoRetry,
    /// A user-initiated retry.
    Manual,
}

/// Registry entry for one unconfirmed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// The attempt currently in flight (or the last one, if failed).
    pub attempt: SendAttempt,
    /// Whether the automatic retry has been scheduled at some point.
    pub auto_retry_used: bool,
}

impl PendingSend {
    fn new() -> Self {
        Self {
            attempt: SendAttempt::Initial,
            auto_retry_used: false,
        }
    }
}

/// Registry of unconfirmed sends, keyed by temp id.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: HashMap<TempId, PendingSend>,
}

impl PendingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created message.
    pub fn register(&mut self, temp_id: TempId) {
        self.entries.insert(temp_id, PendingSend::new());
    }

    /// Look up an entry.
    pub fn get(&self, temp_id: &TempId) -> Option<&PendingSend> {
        self.entries.get(temp_id)
    }

    /// Check if a temp id is still unconfirmed.
    pub fn contains(&self, temp_id: &TempId) -> bool {
        self.entries.contains_key(temp_id)
    }

    /// Record that an attempt failed.
    ///
    /// Returns `true` exactly once per entry: when the initial attempt
    /// fails and the automatic retry has not been used yet. The caller is
    /// expected to arm the retry timer in that case.
    pub fn fail(&mut self, temp_id: &TempId) -> bool {
        let Some(entry) = self.entries.get_mut(temp_id) else {
            return false;
        };
        if entry.attempt == SendAttempt::Initial && !entry.auto_retry_used {
            entry.auto_retry_used = true;
            return true;
        }
        false
    }

    /// Start a new attempt for an entry.
    pub fn begin(&mut self, temp_id: &TempId, attempt: SendAttempt) -> bool {
        match self.entries.get_mut(temp_id) {
            Some(entry) => {
                entry.attempt = attempt;
                true
            }
            None => false,
        }
    }

    /// Remove an entry (confirmed, removed or purged).
    pub fn remove(&mut self, temp_id: &TempId) -> Option<PendingSend> {
        self.entries.remove(temp_id)
    }

    /// Number of unconfirmed sends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no unconfirmed sends.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, returning the temp ids that were tracked.
    pub fn drain(&mut self) -> Vec<TempId> {
        self.entries.drain().map(|(id, _)| id).collect()
    }
}
