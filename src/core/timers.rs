//! Timer bookkeeping: the sorted `later` list and the throttle/debounce
//! registries.
//!
//! Both stores are plain data; arming and clearing platform callbacks is the
//! scheduler's job.

use std::fmt;

use crate::core::work::{Args, DebugStack, Method, TargetRef, WorkItem, WorkKey};
use crate::platform::PlatformHandle;

/// Identifier returned by `later`, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

pub(crate) struct TimerEntry {
    pub(crate) execute_at: u64,
    pub(crate) id: TimerId,
    pub(crate) work: WorkItem,
}

/// Delayed work kept sorted by `execute_at`, ties in insertion order.
#[derive(Default)]
pub(crate) struct TimerList {
    entries: Vec<TimerEntry>,
}

impl TimerList {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest due time, if any.
    pub(crate) fn next_due(&self) -> Option<u64> {
        self.entries.first().map(|e| e.execute_at)
    }

    /// Insert after every entry due at or before `entry.execute_at`;
    /// returns the position.
    pub(crate) fn insert(&mut self, entry: TimerEntry) -> usize {
        let pos = self
            .entries
            .partition_point(|e| e.execute_at <= entry.execute_at);
        self.entries.insert(pos, entry);
        pos
    }

    /// Remove by id; returns the position it occupied.
    pub(crate) fn remove(&mut self, id: TimerId) -> Option<usize> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        self.entries.remove(pos);
        Some(pos)
    }

    /// Take every entry due at or before `now`, in timer order.
    pub(crate) fn drain_expired(&mut self, now: u64) -> Vec<TimerEntry> {
        let split = self.entries.partition_point(|e| e.execute_at <= now);
        self.entries.drain(..split).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    fn order(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.id.0).collect()
    }
}

/// A live throttle or debounce window for one `(target, method)` pair.
pub(crate) struct KeyedTimer {
    pub(crate) key: WorkKey,
    /// Keeps the target alive so its address in `key` stays unique.
    pub(crate) _target: Option<TargetRef>,
    pub(crate) method: Method,
    pub(crate) args: Args,
    pub(crate) stack: Option<DebugStack>,
    pub(crate) timer: PlatformHandle,
}

/// At most one live [`KeyedTimer`] per pair.
#[derive(Default)]
pub(crate) struct KeyedTimers {
    entries: Vec<KeyedTimer>,
}

impl KeyedTimers {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn find_mut(&mut self, key: WorkKey) -> Option<&mut KeyedTimer> {
        self.entries.iter_mut().find(|e| e.key == key)
    }

    pub(crate) fn remove_key(&mut self, key: WorkKey) -> Option<KeyedTimer> {
        let pos = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(pos))
    }

    /// Remove the entry for `key` only if it is still armed with `timer`.
    pub(crate) fn remove_matching(&mut self, key: WorkKey, timer: PlatformHandle) -> Option<KeyedTimer> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.key == key && e.timer == timer)?;
        Some(self.entries.remove(pos))
    }

    pub(crate) fn push(&mut self, entry: KeyedTimer) {
        debug_assert!(self.entries.iter().all(|e| e.key != entry.key));
        self.entries.push(entry);
    }

    /// Empty the registry, returning the platform timers to clear.
    pub(crate) fn take_timers(&mut self) -> Vec<PlatformHandle> {
        self.entries.drain(..).map(|e| e.timer).collect()
    }
}
