//! A single named queue of deferred work.
//!
//! Scheduling appends to `pending`. A flush moves `pending` into an in-flight
//! snapshot and walks it from a resumable cursor, so work scheduled while the
//! flush runs lands in `pending` and never disturbs the snapshot. Cancelling
//! an in-flight item blanks its slot instead of removing it.
//!
//! Every item gets a sequence number that is never reused within its queue;
//! handles cancel by that number, not by the `(target, method)` pair.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::work::{Args, DebugStack, Method, OnError, TargetRef, WorkItem, WorkKey};
use crate::core::SchedulerError;

/// Optional hook run around a queue flush.
pub type QueueHook = Rc<dyn Fn()>;

/// Host predicate consulted between items; `true` pauses the flush.
pub type MustYield = Rc<dyn Fn() -> bool>;

/// Hooks run before and after every flush pass of a queue.
#[derive(Clone, Default)]
pub struct QueueHooks {
    /// Runs before the snapshot is walked.
    pub before: Option<QueueHook>,
    /// Runs after the snapshot is fully drained.
    pub after: Option<QueueHook>,
}

impl QueueHooks {
    /// Hooks with only a `before` callback.
    pub fn before(f: impl Fn() + 'static) -> Self {
        Self {
            before: Some(Rc::new(f)),
            after: None,
        }
    }

    /// Hooks with only an `after` callback.
    pub fn after(f: impl Fn() + 'static) -> Self {
        Self {
            before: None,
            after: Some(Rc::new(f)),
        }
    }
}

impl fmt::Debug for QueueHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHooks")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

/// Result of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Everything reachable in this pass ran.
    Idle,
    /// The host asked to yield; the flush can be resumed later.
    Pause,
}

/// Per-flush context shared by all queues of an instance.
#[derive(Clone, Copy, Default)]
pub struct FlushContext<'a> {
    /// Error hook wrapping every invocation.
    pub on_error: Option<&'a OnError>,
    /// Yield predicate checked between items.
    pub must_yield: Option<&'a MustYield>,
}

impl FlushContext<'_> {
    fn should_yield(&self) -> bool {
        self.must_yield.is_some_and(|f| f())
    }
}

/// Handle to an item scheduled into a queue.
#[derive(Clone)]
pub struct QueueHandle {
    queue: Weak<Queue>,
    seq: u64,
}

impl QueueHandle {
    /// Name of the queue the item was scheduled into, if it still exists.
    #[must_use]
    pub fn queue_name(&self) -> Option<String> {
        self.queue.upgrade().map(|q| q.name.clone())
    }

    pub(crate) fn cancel(&self) -> bool {
        self.queue.upgrade().is_some_and(|q| q.cancel(self))
    }
}

impl fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHandle")
            .field("queue", &self.queue_name())
            .field("seq", &self.seq)
            .finish()
    }
}

struct Slot {
    seq: u64,
    item: WorkItem,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<Slot>,
    in_flight: Vec<Option<Slot>>,
    index: usize,
    /// Position in `pending` of each coalesced pair.
    unique: HashMap<WorkKey, usize>,
    next_seq: u64,
}

impl QueueState {
    fn enqueue(&mut self, item: WorkItem) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.pending.push(Slot { seq, item });
        seq
    }

    fn remove_pending(&mut self, pos: usize) {
        let removed = self.pending.remove(pos);
        self.unique.remove(&removed.item.key());
        for slot in self.unique.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
    }
}

/// An ordered collection of pending invocations for one named phase.
pub struct Queue {
    name: String,
    hooks: QueueHooks,
    state: RefCell<QueueState>,
}

impl Queue {
    /// Create an empty queue.
    pub fn new(name: impl Into<String>, hooks: QueueHooks) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            hooks,
            state: RefCell::new(QueueState::default()),
        })
    }

    /// The queue's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an invocation.
    pub fn push(
        self: &Rc<Self>,
        target: Option<TargetRef>,
        method: Method,
        args: Args,
        stack: Option<DebugStack>,
    ) -> QueueHandle {
        let seq = self
            .state
            .borrow_mut()
            .enqueue(WorkItem::new(target, method, args, stack));
        self.handle(seq)
    }

    /// Append an invocation unless the same pair is already pending, in
    /// which case only its arguments and stack are replaced.
    pub fn push_unique(
        self: &Rc<Self>,
        target: Option<TargetRef>,
        method: Method,
        args: Args,
        stack: Option<DebugStack>,
    ) -> QueueHandle {
        let key = WorkKey::new(target.as_ref(), &method);
        let mut state = self.state.borrow_mut();
        let seq = if let Some(&pos) = state.unique.get(&key) {
            let existing = &mut state.pending[pos];
            existing.item.args = args;
            existing.item.stack = stack;
            existing.seq
        } else {
            let seq = state.enqueue(WorkItem::new(target, method, args, stack));
            let pos = state.pending.len() - 1;
            state.unique.insert(key, pos);
            seq
        };
        drop(state);
        self.handle(seq)
    }

    fn handle(self: &Rc<Self>, seq: u64) -> QueueHandle {
        QueueHandle {
            queue: Rc::downgrade(self),
            seq,
        }
    }

    /// True if anything is pending or still in flight.
    #[must_use]
    pub fn has_work(&self) -> bool {
        let state = self.state.borrow();
        !state.pending.is_empty() || !state.in_flight.is_empty()
    }

    /// Number of items waiting for the next pass.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Stack captured when the pending item at `index` was scheduled.
    #[must_use]
    pub fn stack_for(&self, index: usize) -> Option<DebugStack> {
        self.state
            .borrow()
            .pending
            .get(index)
            .and_then(|slot| slot.item.stack.clone())
    }

    /// Remove a pending item, or blank it if it is in the current snapshot.
    ///
    /// Returns `false` if the item already ran or was already cancelled, or
    /// if `handle` belongs to another queue.
    pub fn cancel(&self, handle: &QueueHandle) -> bool {
        if !std::ptr::eq(handle.queue.as_ptr(), self) {
            return false;
        }
        let seq = handle.seq;
        let mut state = self.state.borrow_mut();
        if let Some(pos) = state.pending.iter().position(|slot| slot.seq == seq) {
            state.remove_pending(pos);
            return true;
        }
        let slot = state
            .in_flight
            .iter_mut()
            .find(|slot| matches!(slot, Some(live) if live.seq == seq));
        match slot {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    /// Drain the queue.
    ///
    /// Resumes an interrupted snapshot if there is one, otherwise snapshots
    /// `pending`. Returns [`FlushOutcome::Pause`] when the yield predicate
    /// fires between items; the position is kept for the next call. With
    /// `recurse`, work that arrived during the pass is drained before
    /// returning.
    ///
    /// # Errors
    ///
    /// A failing callback aborts the pass unless `on_error` absorbs it.
    pub fn flush(&self, recurse: bool, cx: FlushContext<'_>) -> Result<FlushOutcome, SchedulerError> {
        {
            let mut state = self.state.borrow_mut();
            if state.in_flight.is_empty() {
                let pending = std::mem::take(&mut state.pending);
                state.in_flight = pending.into_iter().map(Some).collect();
                state.unique.clear();
            }
        }

        if let Some(before) = &self.hooks.before {
            before();
        }

        loop {
            let step = {
                let mut state = self.state.borrow_mut();
                if state.index >= state.in_flight.len() {
                    None
                } else {
                    let i = state.index;
                    state.index += 1;
                    Some((state.in_flight[i].take(), state.index < state.in_flight.len()))
                }
            };
            let Some((item, more)) = step else { break };
            if let Some(slot) = item {
                slot.item.invoke(cx.on_error)?;
            }
            if more && cx.should_yield() {
                return Ok(FlushOutcome::Pause);
            }
        }

        if let Some(after) = &self.hooks.after {
            after();
        }

        let again = {
            let mut state = self.state.borrow_mut();
            state.in_flight.clear();
            state.index = 0;
            !state.pending.is_empty()
        };
        if recurse && again {
            return self.flush(true, cx);
        }
        Ok(FlushOutcome::Idle)
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .field("index", &state.index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<Value>>>, Method) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let method = Method::new(move |args| {
            l.borrow_mut().push(args.first().cloned().unwrap_or(Value::Null));
            Ok(Value::Null)
        });
        (log, method)
    }

    #[test]
    fn test_push_runs_fifo() {
        let q = Queue::new("actions", QueueHooks::default());
        let (log, m) = recorder();
        q.push(None, m.clone(), vec![json!(1)], None);
        q.push(None, m.clone(), vec![json!(2)], None);
        q.push(None, m, vec![json!(3)], None);

        assert_eq!(q.flush(true, FlushContext::default()).unwrap(), FlushOutcome::Idle);
        assert_eq!(*log.borrow(), vec![json!(1), json!(2), json!(3)]);
        assert!(!q.has_work());
    }

    #[test]
    fn test_push_unique_replaces_args() {
        let q = Queue::new("actions", QueueHooks::default());
        let (log, m) = recorder();
        let other = Method::unit(|| {});
        q.push_unique(None, m.clone(), vec![json!("a")], None);
        q.push_unique(None, other, vec![], None);
        q.push_unique(None, m, vec![json!("b")], None);
        assert_eq!(q.pending_len(), 2);

        q.flush(true, FlushContext::default()).unwrap();
        assert_eq!(*log.borrow(), vec![json!("b")]);
    }

    #[test]
    fn test_cancel_pending_then_again_returns_false() {
        let q = Queue::new("actions", QueueHooks::default());
        let (log, m) = recorder();
        let handle = q.push(None, m, vec![json!(1)], None);
        assert!(handle.cancel());
        assert!(!handle.cancel());
        q.flush(true, FlushContext::default()).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_handle_only_cancels_its_own_item() {
        let q = Queue::new("actions", QueueHooks::default());
        let (log, m) = recorder();
        let ran = q.push(None, m.clone(), vec![json!("ran")], None);
        q.flush(true, FlushContext::default()).unwrap();

        let first = q.push(None, m.clone(), vec![json!("first")], None);
        q.push(None, m, vec![json!("second")], None);
        assert!(!ran.cancel());
        assert!(first.cancel());
        q.flush(true, FlushContext::default()).unwrap();
        assert_eq!(*log.borrow(), vec![json!("ran"), json!("second")]);
    }

    #[test]
    fn test_cancel_keeps_unique_positions_consistent() {
        let q = Queue::new("actions", QueueHooks::default());
        let (log, m) = recorder();
        let first = Method::unit(|| {});
        let h = q.push_unique(None, first, vec![], None);
        q.push_unique(None, m.clone(), vec![json!("old")], None);
        assert!(h.cancel());
        q.push_unique(None, m, vec![json!("new")], None);
        assert_eq!(q.pending_len(), 1);
        q.flush(true, FlushContext::default()).unwrap();
        assert_eq!(*log.borrow(), vec![json!("new")]);
    }

    #[test]
    fn test_cancel_during_flush_blanks_in_flight_item() {
        let q = Queue::new("actions", QueueHooks::default());
        let ran = Rc::new(Cell::new(0));
        let victim_handle: Rc<RefCell<Option<QueueHandle>>> = Rc::new(RefCell::new(None));

        let vh = Rc::clone(&victim_handle);
        let canceller = Method::unit(move || {
            let handle = vh.borrow().clone().unwrap();
            assert!(handle.cancel());
        });
        let r = Rc::clone(&ran);
        let victim = Method::unit(move || r.set(r.get() + 1));

        q.push(None, canceller, vec![], None);
        *victim_handle.borrow_mut() = Some(q.push(None, victim, vec![], None));

        q.flush(true, FlushContext::default()).unwrap();
        assert_eq!(ran.get(), 0);
    }

    #[test]
    fn test_flush_recurses_on_new_work() {
        let q = Queue::new("one", QueueHooks::default());
        let count = Rc::new(Cell::new(0));
        let weak = Rc::downgrade(&q);
        let slot: Rc<RefCell<Option<Method>>> = Rc::new(RefCell::new(None));
        let c = Rc::clone(&count);
        let s = Rc::clone(&slot);
        let increment = Method::unit(move || {
            c.set(c.get() + 1);
            if c.get() < 4 {
                let me = s.borrow().clone().unwrap();
                weak.upgrade().unwrap().push(None, me, vec![], None);
            }
        });
        *slot.borrow_mut() = Some(increment.clone());
        q.push(None, increment, vec![], None);

        q.flush(true, FlushContext::default()).unwrap();
        assert_eq!(count.get(), 4);
        // Break the method -> slot -> method cycle.
        slot.borrow_mut().take();
    }

    #[test]
    fn test_non_recursive_flush_leaves_new_work_pending() {
        let q = Queue::new("one", QueueHooks::default());
        let weak = Rc::downgrade(&q);
        let later = Method::unit(|| {});
        let scheduler = Method::unit(move || {
            weak.upgrade().unwrap().push(None, later.clone(), vec![], None);
        });
        q.push(None, scheduler, vec![], None);
        q.flush(false, FlushContext::default()).unwrap();
        assert_eq!(q.pending_len(), 1);
    }

    #[test]
    fn test_must_yield_pauses_and_resumes() {
        let q = Queue::new("zomg", QueueHooks::default());
        let (log, m) = recorder();
        for i in 0..3 {
            q.push(None, m.clone(), vec![json!(i)], None);
        }
        let yes: MustYield = Rc::new(|| true);
        let cx = FlushContext {
            on_error: None,
            must_yield: Some(&yes),
        };
        assert_eq!(q.flush(false, cx).unwrap(), FlushOutcome::Pause);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(q.flush(false, cx).unwrap(), FlushOutcome::Pause);
        assert_eq!(q.flush(false, cx).unwrap(), FlushOutcome::Idle);
        assert_eq!(*log.borrow(), vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn test_hooks_wrap_the_pass() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (b, a) = (Rc::clone(&events), Rc::clone(&events));
        let hooks = QueueHooks {
            before: Some(Rc::new(move || b.borrow_mut().push("before"))),
            after: Some(Rc::new(move || a.borrow_mut().push("after"))),
        };
        let q = Queue::new("render", hooks);
        let e = Rc::clone(&events);
        q.push(None, Method::unit(move || e.borrow_mut().push("item")), vec![], None);
        q.flush(true, FlushContext::default()).unwrap();
        assert_eq!(*events.borrow(), vec!["before", "item", "after"]);
    }

    #[test]
    fn test_error_without_handler_aborts_pass() {
        let q = Queue::new("one", QueueHooks::default());
        let (log, m) = recorder();
        q.push(None, Method::new(|_| Err(anyhow::anyhow!("fail"))), vec![], None);
        q.push(None, m, vec![json!("after")], None);
        let err = q.flush(true, FlushContext::default()).unwrap_err();
        assert!(err.is_callback());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_stack_for_reports_captured_stack() {
        let q = Queue::new("one", QueueHooks::default());
        q.push(None, Method::unit(|| {}), vec![], Some(DebugStack::capture()));
        q.push(None, Method::unit(|| {}), vec![], None);
        assert!(q.stack_for(0).is_some());
        assert!(q.stack_for(1).is_none());
        assert!(q.stack_for(5).is_none());
    }
}
