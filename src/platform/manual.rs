//! Deterministic platform driven by a virtual clock.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use crate::core::SchedulerError;
use crate::platform::{Platform, PlatformCallback, PlatformHandle};

struct PendingTimer {
    handle: PlatformHandle,
    due: u64,
    callback: PlatformCallback,
}

#[derive(Default)]
struct ManualState {
    now: u64,
    last_handle: u64,
    timers: Vec<PendingTimer>,
    next: VecDeque<(PlatformHandle, PlatformCallback)>,
}

impl ManualState {
    fn allocate(&mut self) -> PlatformHandle {
        self.last_handle += 1;
        PlatformHandle(self.last_handle)
    }

    /// Earliest timer due at or before `limit`; ties go to the one
    /// registered first.
    fn take_due(&mut self, limit: u64) -> Option<PendingTimer> {
        let pos = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= limit)
            .min_by_key(|(_, t)| (t.due, t.handle))
            .map(|(i, _)| i)?;
        Some(self.timers.remove(pos))
    }
}

/// A [`Platform`] whose time only moves when told to.
///
/// Nothing runs on its own: the host calls [`ManualPlatform::run_next`],
/// [`ManualPlatform::flush_next_once`] or [`ManualPlatform::advance`].
/// Errors returned by scheduler callbacks stop the drive and are handed back.
#[derive(Default)]
pub struct ManualPlatform {
    state: RefCell<ManualState>,
}

impl ManualPlatform {
    /// A platform at time 0 with nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump the clock without firing anything.
    pub fn set_now(&self, now: u64) {
        self.state.borrow_mut().now = now;
    }

    /// Timeouts still armed.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Next-opportunity callbacks still queued.
    #[must_use]
    pub fn pending_next(&self) -> usize {
        self.state.borrow().next.len()
    }

    /// Run one queued next-opportunity callback. Returns `false` if none was
    /// queued.
    ///
    /// # Errors
    ///
    /// Whatever the callback returns.
    pub fn flush_next_once(&self) -> Result<bool, SchedulerError> {
        let front = self.state.borrow_mut().next.pop_front();
        match front {
            Some((_, callback)) => {
                callback()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run next-opportunity callbacks until none remain, including ones
    /// queued while draining.
    ///
    /// # Errors
    ///
    /// The first callback error; remaining callbacks stay queued.
    pub fn run_next(&self) -> Result<(), SchedulerError> {
        while self.flush_next_once()? {}
        Ok(())
    }

    /// Move the clock forward by `ms`, firing every timeout that comes due
    /// in order and draining next-opportunity callbacks around each one.
    ///
    /// # Errors
    ///
    /// The first callback error; the clock stays at the failing timer's
    /// due time.
    pub fn advance(&self, ms: u64) -> Result<(), SchedulerError> {
        let target = self.now().saturating_add(ms);
        self.run_next()?;
        loop {
            let due = self.state.borrow_mut().take_due(target);
            let Some(timer) = due else { break };
            {
                let mut state = self.state.borrow_mut();
                state.now = state.now.max(timer.due);
            }
            (timer.callback)()?;
            self.run_next()?;
        }
        self.set_now(target);
        Ok(())
    }
}

impl Platform for ManualPlatform {
    fn now(&self) -> u64 {
        self.state.borrow().now
    }

    fn set_timeout(&self, callback: PlatformCallback, delay_ms: u64) -> PlatformHandle {
        let mut state = self.state.borrow_mut();
        let handle = state.allocate();
        let due = state.now.saturating_add(delay_ms);
        state.timers.push(PendingTimer { handle, due, callback });
        handle
    }

    fn clear_timeout(&self, handle: PlatformHandle) {
        self.state.borrow_mut().timers.retain(|t| t.handle != handle);
    }

    fn next(&self, callback: PlatformCallback) -> PlatformHandle {
        let mut state = self.state.borrow_mut();
        let handle = state.allocate();
        state.next.push_back((handle, callback));
        handle
    }

    fn clear_next(&self, handle: PlatformHandle) {
        self.state.borrow_mut().next.retain(|(h, _)| *h != handle);
    }
}

impl fmt::Debug for ManualPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManualPlatform")
            .field("now", &state.now)
            .field("timers", &state.timers.len())
            .field("next", &state.next.len())
            .finish()
    }
}
