//! A run-loop instance: the fixed, ordered set of queues for one turn.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::core::queue::{FlushContext, FlushOutcome, Queue, QueueHandle, QueueHooks};
use crate::core::work::{Args, DebugStack, Method, TargetRef};
use crate::core::SchedulerError;

/// Identifier of a run-loop instance, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runloop#{}", self.0)
    }
}

/// Ordered queues drained together during one turn.
///
/// Any scheduling call resets the drain cursor to the first queue, so work
/// landing in an earlier queue is picked up before later queues continue.
pub struct RunLoopInstance {
    id: InstanceId,
    queues: Vec<Rc<Queue>>,
    cursor: Cell<usize>,
}

impl RunLoopInstance {
    /// Build an instance with one queue per declared name.
    ///
    /// `hooks_for` supplies the before/after hooks of each queue.
    pub fn new<F>(id: InstanceId, names: &[String], mut hooks_for: F) -> Self
    where
        F: FnMut(&str) -> QueueHooks,
    {
        let queues = names
            .iter()
            .map(|name| Queue::new(name.as_str(), hooks_for(name.as_str())))
            .collect();
        Self {
            id,
            queues,
            cursor: Cell::new(0),
        }
    }

    /// This instance's identifier.
    #[must_use]
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// Look up a queue by name.
    #[must_use]
    pub fn queue(&self, name: &str) -> Option<&Rc<Queue>> {
        self.queues.iter().find(|q| q.name() == name)
    }

    /// True if any queue holds pending or in-flight work.
    #[must_use]
    pub fn has_work(&self) -> bool {
        self.queues.iter().any(|q| q.has_work())
    }

    /// Schedule into the named queue.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownQueue`] if `queue_name` was not declared.
    pub fn schedule(
        &self,
        queue_name: &str,
        target: Option<TargetRef>,
        method: Method,
        args: Args,
        once: bool,
        stack: Option<DebugStack>,
    ) -> Result<QueueHandle, SchedulerError> {
        let queue = self
            .queue(queue_name)
            .ok_or_else(|| SchedulerError::UnknownQueue(queue_name.to_string()))?;
        self.cursor.set(0);
        let handle = if once {
            queue.push_unique(target, method, args, stack)
        } else {
            queue.push(target, method, args, stack)
        };
        tracing::trace!("{} scheduled into `{}` (once={})", self.id, queue_name, once);
        Ok(handle)
    }

    /// Drain queues in declaration order.
    ///
    /// A paused queue pauses the whole instance. When continuing an autorun,
    /// the flush also pauses after skipping an empty queue so the host can
    /// interleave its own work.
    ///
    /// # Errors
    ///
    /// Propagates the first callback failure not absorbed by `on_error`.
    pub fn flush(&self, from_autorun: bool, cx: FlushContext<'_>) -> Result<FlushOutcome, SchedulerError> {
        let count = self.queues.len();
        while self.cursor.get() < count {
            let queue = &self.queues[self.cursor.get()];
            if queue.has_work() {
                if queue.flush(false, cx)? == FlushOutcome::Pause {
                    return Ok(FlushOutcome::Pause);
                }
            } else {
                self.cursor.set(self.cursor.get() + 1);
                if from_autorun && self.cursor.get() < count {
                    return Ok(FlushOutcome::Pause);
                }
            }
        }
        Ok(FlushOutcome::Idle)
    }
}

impl fmt::Debug for RunLoopInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLoopInstance")
            .field("id", &self.id)
            .field("queues", &self.queues)
            .field("cursor", &self.cursor.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Weak;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn logger(log: &Rc<RefCell<Vec<&'static str>>>, label: &'static str) -> Method {
        let log = Rc::clone(log);
        Method::unit(move || log.borrow_mut().push(label))
    }

    #[test]
    fn test_unknown_queue_is_rejected() {
        let declared = names(&["one"]);
        let instance = RunLoopInstance::new(InstanceId(1), &declared, |_| QueueHooks::default());
        let err = instance
            .schedule("nope", None, Method::unit(|| {}), vec![], false, None)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownQueue(ref q) if q == "nope"));
    }

    #[test]
    fn test_queues_drain_in_declared_order() {
        let declared = names(&["sync", "actions", "render"]);
        let instance = RunLoopInstance::new(InstanceId(1), &declared, |_| QueueHooks::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        instance.schedule("render", None, logger(&log, "render"), vec![], false, None).unwrap();
        instance.schedule("sync", None, logger(&log, "sync"), vec![], false, None).unwrap();
        instance.schedule("actions", None, logger(&log, "actions"), vec![], false, None).unwrap();

        assert_eq!(instance.flush(false, FlushContext::default()).unwrap(), FlushOutcome::Idle);
        assert_eq!(*log.borrow(), vec!["sync", "actions", "render"]);
        assert!(!instance.has_work());
    }

    #[test]
    fn test_earlier_queue_is_revisited_after_current_snapshot() {
        let declared = names(&["one", "two"]);
        let instance = Rc::new(RunLoopInstance::new(InstanceId(1), &declared, |_| QueueHooks::default()));
        let log = Rc::new(RefCell::new(Vec::new()));

        let weak: Weak<RunLoopInstance> = Rc::downgrade(&instance);
        let f2 = logger(&log, "f2");
        let l = Rc::clone(&log);
        let f1 = Method::unit(move || {
            l.borrow_mut().push("f1");
            weak.upgrade()
                .unwrap()
                .schedule("one", None, f2.clone(), vec![], false, None)
                .unwrap();
        });
        instance.schedule("two", None, f1, vec![], false, None).unwrap();
        instance.schedule("two", None, logger(&log, "f3"), vec![], false, None).unwrap();

        instance.flush(false, FlushContext::default()).unwrap();
        assert_eq!(*log.borrow(), vec!["f1", "f3", "f2"]);
    }

    #[test]
    fn test_autorun_flush_pauses_between_empty_queues() {
        let declared = names(&["one", "two", "three"]);
        let instance = RunLoopInstance::new(InstanceId(1), &declared, |_| QueueHooks::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        instance.schedule("three", None, logger(&log, "three"), vec![], false, None).unwrap();

        assert_eq!(instance.flush(true, FlushContext::default()).unwrap(), FlushOutcome::Pause);
        assert_eq!(instance.flush(true, FlushContext::default()).unwrap(), FlushOutcome::Pause);
        assert!(log.borrow().is_empty());
        assert_eq!(instance.flush(true, FlushContext::default()).unwrap(), FlushOutcome::Idle);
        assert_eq!(*log.borrow(), vec!["three"]);
    }

    #[test]
    fn test_hooks_are_assigned_per_queue() {
        let declared = names(&["one", "two"]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let instance = RunLoopInstance::new(InstanceId(7), &declared, move |name| {
            if name == "two" {
                let s = Rc::clone(&s);
                QueueHooks::before(move || s.borrow_mut().push("before-two"))
            } else {
                QueueHooks::default()
            }
        });
        instance.schedule("one", None, Method::unit(|| {}), vec![], false, None).unwrap();
        instance.schedule("two", None, Method::unit(|| {}), vec![], false, None).unwrap();
        instance.flush(false, FlushContext::default()).unwrap();
        assert_eq!(*seen.borrow(), vec!["before-two"]);
        assert_eq!(instance.id().to_string(), "runloop#7");
    }
}
