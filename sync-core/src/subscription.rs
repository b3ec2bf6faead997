//! Channel subscription table for Convo Sync.
//!
//! Reference-counts logical consumers of each push channel. The transport
//! subscription is created on the 0 → 1 transition and torn down on the
//! 1 → 0 transition, no matter how many consumers share the channel.
//!
//! Pure bookkeeping: the table says *when* to subscribe or unsubscribe, the
//! client's subscription manager performs the calls.

use std::collections::HashMap;

/// What the caller must do on the transport after a table change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    /// Subscribe to the channel and bind its handlers.
    Subscribe(String),
    /// Unbind all handlers and unsubscribe.
    Unsubscribe(String),
    /// No transport call needed.
    Nothing,
}

#[derive(Debug)]
struct ChannelEntry<H> {
    refs: usize,
    handlers: Vec<H>,
    live: bool,
}

/// Reference-counted channel table with bound handler sets.
///
/// `H` is the handler type; equality decides whether a handler is already
/// bound to a channel.
#[derive(Debug)]
pub struct ChannelTable<H> {
    channels: HashMap<String, ChannelEntry<H>>,
}

impl<H> Default for ChannelTable<H> {
    fn default() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }
}

impl<H: Clone + PartialEq> ChannelTable<H> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference to `channel`, binding any handler not already bound.
    pub fn acquire(&mut self, channel: &str, handlers: Vec<H>) -> ChannelAction {
        let entry = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| ChannelEntry {
                refs: 0,
                handlers: Vec::new(),
                live: false,
            });

        for handler in handlers {
            if !entry.handlers.contains(&handler) {
                entry.handlers.push(handler);
            }
        }

        entry.refs += 1;
        if entry.refs == 1 {
            ChannelAction::Subscribe(channel.to_string())
        } else {
            ChannelAction::Nothing
        }
    }

    /// Drop a reference to `channel`.
    ///
    /// Releasing a channel that is not referenced is a no-op.
    pub fn release(&mut self, channel: &str) -> ChannelAction {
        let Some(entry) = self.channels.get_mut(channel) else {
            return ChannelAction::Nothing;
        };

        entry.refs -= 1;
        if entry.refs == 0 {
            self.channels.remove(channel);
            ChannelAction::Unsubscribe(channel.to_string())
        } else {
            ChannelAction::Nothing
        }
    }

    /// Record whether the transport subscription is currently established.
    pub fn set_live(&mut self, channel: &str, live: bool) {
        if let Some(entry) = self.channels.get_mut(channel) {
            entry.live = live;
        }
    }

    /// Check if the transport subscription is established.
    pub fn is_live(&self, channel: &str) -> bool {
        self.channels.get(channel).is_some_and(|e| e.live)
    }

    /// Mark every channel as not live (transport connection lost).
    pub fn mark_all_down(&mut self) {
        for entry in self.channels.values_mut() {
            entry.live = false;
        }
    }

    /// Channels that are referenced but not live.
    pub fn needs_subscribe(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .channels
            .iter()
            .filter(|(_, e)| !e.live)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Handlers bound to `channel` (empty if not referenced).
    pub fn handlers(&self, channel: &str) -> Vec<H> {
        self.channels
            .get(channel)
            .map(|e| e.handlers.clone())
            .unwrap_or_default()
    }

    /// Current reference count for `channel`.
    pub fn ref_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |e| e.refs)
    }

    /// All referenced channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }
}
