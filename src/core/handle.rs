//! Cancellation handles.
//!
//! Every scheduling call returns a typed handle; [`CancelHandle`] is the
//! tagged union accepted by `Scheduler::cancel`.

use crate::core::queue::QueueHandle;
use crate::core::timers::TimerId;
use crate::core::work::WorkKey;
use crate::platform::PlatformHandle;

/// Handle for a live throttle window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleHandle {
    pub(crate) key: WorkKey,
    pub(crate) timer: PlatformHandle,
}

/// Handle for a pending debounced call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceHandle {
    pub(crate) key: WorkKey,
    pub(crate) timer: PlatformHandle,
}

impl ThrottleHandle {
    /// The platform timer backing this window.
    #[must_use]
    pub const fn timer(&self) -> PlatformHandle {
        self.timer
    }
}

impl DebounceHandle {
    /// The platform timer backing this call.
    #[must_use]
    pub const fn timer(&self) -> PlatformHandle {
        self.timer
    }
}

/// Anything that can be cancelled.
#[derive(Debug, Clone)]
pub enum CancelHandle {
    /// Work scheduled into a queue.
    Queue(QueueHandle),
    /// A `later` timer.
    Timer(TimerId),
    /// A throttle window.
    Throttle(ThrottleHandle),
    /// A debounced call.
    Debounce(DebounceHandle),
}

impl From<QueueHandle> for CancelHandle {
    fn from(handle: QueueHandle) -> Self {
        Self::Queue(handle)
    }
}

impl From<&QueueHandle> for CancelHandle {
    fn from(handle: &QueueHandle) -> Self {
        Self::Queue(handle.clone())
    }
}

impl From<TimerId> for CancelHandle {
    fn from(id: TimerId) -> Self {
        Self::Timer(id)
    }
}

impl From<ThrottleHandle> for CancelHandle {
    fn from(handle: ThrottleHandle) -> Self {
        Self::Throttle(handle)
    }
}

impl From<DebounceHandle> for CancelHandle {
    fn from(handle: DebounceHandle) -> Self {
        Self::Debounce(handle)
    }
}
