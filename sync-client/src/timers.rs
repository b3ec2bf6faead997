//! Keyed, cancellable scheduled tasks.
//!
//! Every timer the engines arm (automatic retry, typing inactivity, remote
//! typing expiry, heartbeat, reconnect) is a spawned tokio task held here
//! under a key, so a conversation switch can abort exactly the timers that
//! belong to it.
//!
//! A task that triggers its own engine path must [`forget`](TimerSet::forget)
//! its key first; otherwise a `cancel` of the same key from that path would
//! abort the running task.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Scheduled tasks keyed by `K`. At most one task per key.
#[derive(Debug)]
pub struct TimerSet<K: Eq + Hash> {
    tasks: HashMap<K, JoinHandle<()>>,
}

impl<K: Eq + Hash> Default for TimerSet<K> {
    fn default() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> TimerSet<K> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing (and aborting) any task already
    /// scheduled under `key`.
    pub fn schedule<F>(&mut self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(key, async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }

    /// Run `task` immediately, replacing (and aborting) any task already
    /// held under `key`.
    pub fn spawn<F>(&mut self, key: K, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.retain(|_, handle| !handle.is_finished());
        let handle = tokio::spawn(task);
        if let Some(previous) = self.tasks.insert(key, handle) {
            previous.abort();
        }
    }

    /// Abort the task under `key`. Returns `true` if one was still pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.tasks.remove(key) {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Drop the handle under `key` without aborting the task.
    pub fn forget(&mut self, key: &K) {
        self.tasks.remove(key);
    }

    /// Abort every task whose key matches `predicate`. Returns how many
    /// were still pending.
    pub fn cancel_where<P>(&mut self, predicate: P) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let mut cancelled = 0;
        self.tasks.retain(|key, handle| {
            if !predicate(key) {
                return true;
            }
            if !handle.is_finished() {
                cancelled += 1;
            }
            handle.abort();
            false
        });
        cancelled
    }

    /// Abort everything.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }

    /// Check if a task under `key` is still pending.
    pub fn is_scheduled(&self, key: &K) -> bool {
        self.tasks
            .get(key)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.tasks
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Check if no task is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash> Drop for TimerSet<K> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
