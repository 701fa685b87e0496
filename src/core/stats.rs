//! Scheduler activity counters.

use std::cell::Cell;

use serde::{Deserialize, Serialize};

/// Snapshot of scheduler activity since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Calls to `begin`, including implicit ones.
    pub begin: u64,
    /// Calls to `end`, including autorun continuations.
    pub end: u64,
    /// `begin` events fired.
    pub begin_events: u64,
    /// `end` events fired.
    pub end_events: u64,
    /// Autorun continuations armed.
    pub autoruns_created: u64,
    /// Autorun continuations that ran.
    pub autoruns_completed: u64,
    /// Calls to `run`.
    pub run: u64,
    /// Calls to `join`.
    pub join: u64,
    /// Calls to `schedule`.
    pub schedule: u64,
    /// Calls to `schedule_iterable`.
    pub schedule_iterable: u64,
    /// Calls to `schedule_once`.
    pub schedule_once: u64,
    /// Calls to `later`.
    pub later: u64,
    /// Calls to `throttle`.
    pub throttle: u64,
    /// Calls to `debounce`.
    pub debounce: u64,
    /// Calls to `cancel`.
    pub cancel: u64,
    /// Calls to `cancel_timers`.
    pub cancel_timers: u64,
    /// Run-loop instances created.
    pub loops_total: u64,
    /// Run-loop instances created while another was open.
    pub loops_nested: u64,
}

/// Internal counters (single-threaded).
#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    pub begin: Cell<u64>,
    pub end: Cell<u64>,
    pub begin_events: Cell<u64>,
    pub end_events: Cell<u64>,
    pub autoruns_created: Cell<u64>,
    pub autoruns_completed: Cell<u64>,
    pub run: Cell<u64>,
    pub join: Cell<u64>,
    pub schedule: Cell<u64>,
    pub schedule_iterable: Cell<u64>,
    pub schedule_once: Cell<u64>,
    pub later: Cell<u64>,
    pub throttle: Cell<u64>,
    pub debounce: Cell<u64>,
    pub cancel: Cell<u64>,
    pub cancel_timers: Cell<u64>,
    pub loops_total: Cell<u64>,
    pub loops_nested: Cell<u64>,
}

pub(crate) fn bump(counter: &Cell<u64>) {
    counter.set(counter.get() + 1);
}

impl SchedulerCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            begin: self.begin.get(),
            end: self.end.get(),
            begin_events: self.begin_events.get(),
            end_events: self.end_events.get(),
            autoruns_created: self.autoruns_created.get(),
            autoruns_completed: self.autoruns_completed.get(),
            run: self.run.get(),
            join: self.join.get(),
            schedule: self.schedule.get(),
            schedule_iterable: self.schedule_iterable.get(),
            schedule_once: self.schedule_once.get(),
            later: self.later.get(),
            throttle: self.throttle.get(),
            debounce: self.debounce.get(),
            cancel: self.cancel.get(),
            cancel_timers: self.cancel_timers.get(),
            loops_total: self.loops_total.get(),
            loops_nested: self.loops_nested.get(),
        }
    }
}
