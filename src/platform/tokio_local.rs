//! Tokio platform built on local (non-`Send`) tasks.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::platform::{Platform, PlatformCallback, PlatformHandle};

type TaskMap = Rc<RefCell<HashMap<PlatformHandle, AbortHandle>>>;

/// Runs scheduler callbacks as tasks on the current [`tokio::task::LocalSet`].
///
/// Every method that arms a callback must be called from inside a
/// `LocalSet` context (`LocalSet::run_until` or `LocalSet::block_on`).
/// Clearing a callback aborts its task. Errors escaping a callback are
/// logged, since there is no caller left to return them to.
pub struct TokioPlatform {
    origin: Instant,
    last_handle: Cell<u64>,
    tasks: TaskMap,
}

impl TokioPlatform {
    /// Create a platform whose clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_handle: Cell::new(0),
            tasks: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Number of callbacks armed and not yet run or cleared.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    fn allocate(&self) -> PlatformHandle {
        let next = self.last_handle.get() + 1;
        self.last_handle.set(next);
        PlatformHandle(next)
    }

    fn spawn(&self, callback: PlatformCallback, delay: Option<Duration>) -> PlatformHandle {
        let handle = self.allocate();
        let tasks = Rc::clone(&self.tasks);
        let join = tokio::task::spawn_local(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            tasks.borrow_mut().remove(&handle);
            if let Err(e) = callback() {
                tracing::error!("scheduler callback failed: {}", e);
            }
        });
        self.tasks.borrow_mut().insert(handle, join.abort_handle());
        handle
    }

    fn abort(&self, handle: PlatformHandle) {
        let task = self.tasks.borrow_mut().remove(&handle);
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Default for TokioPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for TokioPlatform {
    fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn set_timeout(&self, callback: PlatformCallback, delay_ms: u64) -> PlatformHandle {
        self.spawn(callback, Some(Duration::from_millis(delay_ms)))
    }

    fn clear_timeout(&self, handle: PlatformHandle) {
        self.abort(handle);
    }

    fn next(&self, callback: PlatformCallback) -> PlatformHandle {
        self.spawn(callback, None)
    }

    fn clear_next(&self, handle: PlatformHandle) {
        self.abort(handle);
    }
}

impl Drop for TokioPlatform {
    fn drop(&mut self) {
        for (_, task) in self.tasks.borrow_mut().drain() {
            task.abort();
        }
    }
}
