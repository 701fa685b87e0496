//! The scheduler core: turns, autoruns, timers, throttle and debounce.
//!
//! A [`Scheduler`] is a cheap, clonable handle. All state lives behind a
//! single `RefCell`, and no borrow of it is ever held while user code runs
//! (callbacks, hooks, event subscribers) or while the platform is called, so
//! every public operation is safe to call reentrantly from inside a callback.
//! Platform callbacks hold only a weak reference; once the last handle is
//! dropped, late callbacks are no-ops.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::core::events::{EventCallback, EventCallbacks, EventName};
use crate::core::handle::{CancelHandle, DebounceHandle, ThrottleHandle};
use crate::core::instance::{InstanceId, RunLoopInstance};
use crate::core::queue::{FlushContext, FlushOutcome, MustYield, QueueHandle, QueueHooks};
use crate::core::stats::{bump, SchedulerCounters, SchedulerStats};
use crate::core::timers::{KeyedTimer, KeyedTimers, TimerEntry, TimerId, TimerList};
use crate::core::work::{invoke_with, Args, Callable, DebugStack, Method, OnError, WorkItem, WorkKey};
use crate::core::SchedulerError;
use crate::platform::{Platform, PlatformHandle};
use crate::util::args::{split_debounce_args, split_timer_args};

/// Hooks and switches fixed at construction.
#[derive(Default)]
pub(crate) struct SchedulerOptions {
    pub(crate) on_begin: Option<EventCallback>,
    pub(crate) on_end: Option<EventCallback>,
    pub(crate) on_error: Option<OnError>,
    pub(crate) must_yield: Option<MustYield>,
    pub(crate) queue_hooks: HashMap<String, QueueHooks>,
    pub(crate) debug: bool,
}

#[derive(Debug, Clone, Copy)]
enum Registry {
    Throttle,
    Debounce,
}

#[derive(Default)]
struct State {
    current: Option<Rc<RunLoopInstance>>,
    stack: Vec<Rc<RunLoopInstance>>,
    autorun: Option<PlatformHandle>,
    timers: TimerList,
    timer_timeout: Option<PlatformHandle>,
    throttlers: KeyedTimers,
    debouncees: KeyedTimers,
    next_timer_id: u64,
    next_instance_id: u64,
}

impl State {
    fn registry(&mut self, kind: Registry) -> &mut KeyedTimers {
        match kind {
            Registry::Throttle => &mut self.throttlers,
            Registry::Debounce => &mut self.debouncees,
        }
    }
}

struct Inner {
    queue_names: Vec<String>,
    default_queue: String,
    options: SchedulerOptions,
    platform: Rc<dyn Platform>,
    state: RefCell<State>,
    events: EventCallbacks,
    counters: SchedulerCounters,
}

/// Cooperative run-loop scheduler.
///
/// Work is batched into turns. Each turn drains the declared queues in
/// order; scheduling outside a turn opens one implicitly and flushes it at
/// the platform's next opportunity.
#[derive(Clone)]
pub struct Scheduler(Rc<Inner>);

impl Scheduler {
    /// Start configuring a scheduler over the given queue names.
    pub fn builder<I, S>(queues: I) -> crate::builders::SchedulerBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        crate::builders::SchedulerBuilder::new(queues)
    }

    pub(crate) fn from_parts(
        queue_names: Vec<String>,
        default_queue: String,
        options: SchedulerOptions,
        platform: Rc<dyn Platform>,
    ) -> Self {
        tracing::debug!(
            "scheduler created with queues {:?} (default `{}`)",
            queue_names,
            default_queue
        );
        Self(Rc::new(Inner {
            queue_names,
            default_queue,
            options,
            platform,
            state: RefCell::new(State::default()),
            events: EventCallbacks::default(),
            counters: SchedulerCounters::default(),
        }))
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(Self)
    }

    /// Declared queue names, in flush order.
    #[must_use]
    pub fn queue_names(&self) -> &[String] {
        &self.0.queue_names
    }

    /// Queue that timers and `later` promote into.
    #[must_use]
    pub fn default_queue(&self) -> &str {
        &self.0.default_queue
    }

    /// The open run-loop instance, if any.
    #[must_use]
    pub fn current_instance(&self) -> Option<Rc<RunLoopInstance>> {
        self.0.state.borrow().current.clone()
    }

    /// Snapshot of activity counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.0.counters.snapshot()
    }

    // ---- turns ----

    /// Open a turn.
    ///
    /// A pending autorun is cancelled and its instance reused; otherwise the
    /// current instance (if any) is suspended and a fresh one becomes current.
    pub fn begin(&self) -> Rc<RunLoopInstance> {
        bump(&self.0.counters.begin);
        let (previous, autorun) = {
            let mut state = self.0.state.borrow_mut();
            (state.current.clone(), state.autorun.take())
        };

        let current = match (autorun, previous.clone()) {
            (Some(handle), Some(open)) => {
                self.0.platform.clear_next(handle);
                tracing::debug!("{} resumed by begin; autorun cancelled", open.id());
                open
            }
            (autorun, _) => {
                if let Some(handle) = autorun {
                    self.0.platform.clear_next(handle);
                }
                let fresh = self.new_instance();
                {
                    let mut state = self.0.state.borrow_mut();
                    if let Some(parent) = previous.clone() {
                        state.stack.push(parent);
                        bump(&self.0.counters.loops_nested);
                    }
                    state.current = Some(Rc::clone(&fresh));
                }
                tracing::debug!("{} begin", fresh.id());
                bump(&self.0.counters.begin_events);
                self.0.events.trigger(EventName::Begin, &fresh, previous.as_deref());
                fresh
            }
        };

        if let Some(on_begin) = &self.0.options.on_begin {
            on_begin(&current, previous.as_deref());
        }
        current
    }

    /// Close the current turn, flushing its queues.
    ///
    /// If the flush pauses, the instance stays current and an autorun
    /// continuation resumes it later.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::EndWithoutBegin`] with no open turn, or the first
    /// callback failure not absorbed by `on_error`. The turn is closed
    /// either way.
    pub fn end(&self) -> Result<(), SchedulerError> {
        self.end_turn(false)
    }

    fn end_turn(&self, from_autorun: bool) -> Result<(), SchedulerError> {
        bump(&self.0.counters.end);
        let current = self
            .current_instance()
            .ok_or(SchedulerError::EndWithoutBegin)?;

        let flushed = current.flush(from_autorun, self.flush_context());
        if matches!(flushed, Ok(FlushOutcome::Pause)) {
            self.schedule_autorun();
            return Ok(());
        }

        let next = {
            let mut state = self.0.state.borrow_mut();
            let next = state.stack.pop();
            state.current.clone_from(&next);
            next
        };
        tracing::debug!("{} end", current.id());
        bump(&self.0.counters.end_events);
        self.0.events.trigger(EventName::End, &current, next.as_deref());
        if let Some(on_end) = &self.0.options.on_end {
            on_end(&current, next.as_deref());
        }
        flushed.map(drop)
    }

    fn flush_context(&self) -> FlushContext<'_> {
        FlushContext {
            on_error: self.0.options.on_error.as_ref(),
            must_yield: self.0.options.must_yield.as_ref(),
        }
    }

    fn new_instance(&self) -> Rc<RunLoopInstance> {
        let id = {
            let mut state = self.0.state.borrow_mut();
            state.next_instance_id += 1;
            InstanceId(state.next_instance_id)
        };
        bump(&self.0.counters.loops_total);
        let hooks = &self.0.options.queue_hooks;
        Rc::new(RunLoopInstance::new(id, &self.0.queue_names, |name| {
            hooks.get(name).cloned().unwrap_or_default()
        }))
    }

    /// Return the current instance, opening an autorun turn if none is open.
    pub fn ensure_instance(&self) -> Rc<RunLoopInstance> {
        if let Some(current) = self.current_instance() {
            return current;
        }
        let instance = self.begin();
        self.schedule_autorun();
        instance
    }

    fn schedule_autorun(&self) {
        let weak = Rc::downgrade(&self.0);
        let handle = self.0.platform.next(Box::new(move || {
            Self::from_weak(&weak).map_or(Ok(()), |scheduler| scheduler.autorun_end())
        }));
        self.0.state.borrow_mut().autorun = Some(handle);
        bump(&self.0.counters.autoruns_created);
        tracing::debug!("autorun scheduled");
    }

    fn autorun_end(&self) -> Result<(), SchedulerError> {
        let armed = self.0.state.borrow_mut().autorun.take();
        if armed.is_none() {
            return Ok(());
        }
        bump(&self.0.counters.autoruns_completed);
        self.end_turn(true)
    }

    // ---- synchronous execution ----

    /// Invoke inside a fresh turn and flush it before returning.
    ///
    /// # Errors
    ///
    /// Missing methods fail before the turn opens. An error from closing the
    /// turn takes precedence over the callback's own error.
    pub fn run(&self, callable: impl Into<Callable>, args: Args) -> Result<Value, SchedulerError> {
        let (_, method) = callable.into().resolve()?;
        self.run_resolved(&method, &args, None)
    }

    fn run_resolved(
        &self,
        method: &Method,
        args: &[Value],
        stack: Option<&DebugStack>,
    ) -> Result<Value, SchedulerError> {
        bump(&self.0.counters.run);
        self.begin();
        let result = invoke_with(method, args, stack, self.0.options.on_error.as_ref());
        let ended = self.end();
        match (result, ended) {
            (result, Ok(())) => result,
            (Ok(_), Err(err)) => Err(err),
            (Err(dropped), Err(err)) => {
                tracing::warn!("callback error superseded while closing the turn: {}", dropped);
                Err(err)
            }
        }
    }

    /// Invoke inline in the open turn, or like [`Scheduler::run`] if none is
    /// open.
    ///
    /// # Errors
    ///
    /// As [`Scheduler::run`].
    pub fn join(&self, callable: impl Into<Callable>, args: Args) -> Result<Value, SchedulerError> {
        let (_, method) = callable.into().resolve()?;
        self.join_resolved(&method, &args, None)
    }

    fn join_resolved(
        &self,
        method: &Method,
        args: &[Value],
        stack: Option<&DebugStack>,
    ) -> Result<Value, SchedulerError> {
        bump(&self.0.counters.join);
        if self.current_instance().is_none() {
            return self.run_resolved(method, args, stack);
        }
        invoke_with(method, args, stack, self.0.options.on_error.as_ref())
    }

    // ---- queue scheduling ----

    /// Append work to a queue of the current (or an autorun) turn.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownQueue`] or [`SchedulerError::MissingMethod`];
    /// nothing is opened on failure.
    pub fn schedule(
        &self,
        queue_name: &str,
        callable: impl Into<Callable>,
        args: Args,
    ) -> Result<QueueHandle, SchedulerError> {
        bump(&self.0.counters.schedule);
        self.schedule_into(queue_name, callable.into(), args, false)
    }

    /// Like [`Scheduler::schedule`], but a pair already pending in the queue
    /// only has its arguments replaced.
    ///
    /// # Errors
    ///
    /// As [`Scheduler::schedule`].
    pub fn schedule_once(
        &self,
        queue_name: &str,
        callable: impl Into<Callable>,
        args: Args,
    ) -> Result<QueueHandle, SchedulerError> {
        bump(&self.0.counters.schedule_once);
        self.schedule_into(queue_name, callable.into(), args, true)
    }

    /// Schedule a single queue item that pulls callbacks from `factory`'s
    /// sequence and runs each to completion.
    ///
    /// The factory is called at most once; the first failing step stops
    /// the drain.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownQueue`].
    pub fn schedule_iterable<F, I, T>(&self, queue_name: &str, factory: F) -> Result<QueueHandle, SchedulerError>
    where
        F: FnOnce() -> I + 'static,
        I: IntoIterator<Item = T>,
        T: FnOnce() -> anyhow::Result<()>,
    {
        bump(&self.0.counters.schedule_iterable);
        let factory = RefCell::new(Some(factory));
        let drain = Method::new(move |_| {
            let pending = factory.borrow_mut().take();
            if let Some(factory) = pending {
                for step in factory() {
                    step()?;
                }
            }
            Ok(Value::Null)
        });
        self.schedule_into(queue_name, Callable::from(drain), Vec::new(), false)
    }

    fn schedule_into(
        &self,
        queue_name: &str,
        callable: Callable,
        args: Args,
        once: bool,
    ) -> Result<QueueHandle, SchedulerError> {
        let (target, method) = callable.resolve()?;
        if !self.0.queue_names.iter().any(|q| q == queue_name) {
            return Err(SchedulerError::UnknownQueue(queue_name.to_string()));
        }
        let stack = self.capture_stack();
        self.ensure_instance()
            .schedule(queue_name, target, method, args, once, stack)
    }

    fn capture_stack(&self) -> Option<DebugStack> {
        self.0.options.debug.then(DebugStack::capture)
    }

    /// Deprecated alias of [`Scheduler::schedule`].
    ///
    /// # Errors
    ///
    /// As [`Scheduler::schedule`].
    #[deprecated(note = "use `schedule` instead")]
    pub fn defer(
        &self,
        queue_name: &str,
        callable: impl Into<Callable>,
        args: Args,
    ) -> Result<QueueHandle, SchedulerError> {
        self.schedule(queue_name, callable, args)
    }

    /// Deprecated alias of [`Scheduler::schedule_once`].
    ///
    /// # Errors
    ///
    /// As [`Scheduler::schedule_once`].
    #[deprecated(note = "use `schedule_once` instead")]
    pub fn defer_once(
        &self,
        queue_name: &str,
        callable: impl Into<Callable>,
        args: Args,
    ) -> Result<QueueHandle, SchedulerError> {
        self.schedule_once(queue_name, callable, args)
    }

    // ---- delayed work ----

    /// Run the callable in the default queue of a turn opened no earlier
    /// than `wait_ms` from now.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::MissingMethod`].
    pub fn later(
        &self,
        callable: impl Into<Callable>,
        args: Args,
        wait_ms: u64,
    ) -> Result<TimerId, SchedulerError> {
        let (target, method) = callable.into().resolve()?;
        bump(&self.0.counters.later);
        let stack = self.capture_stack();
        let execute_at = self.0.platform.now().saturating_add(wait_ms);
        let (id, pos) = {
            let mut state = self.0.state.borrow_mut();
            state.next_timer_id += 1;
            let id = TimerId(state.next_timer_id);
            let pos = state.timers.insert(TimerEntry {
                execute_at,
                id,
                work: WorkItem::new(target, method, args, stack),
            });
            (id, pos)
        };
        tracing::trace!("{} due at {}", id, execute_at);
        if pos == 0 {
            self.reinstall_timer_timeout();
        }
        Ok(id)
    }

    /// [`Scheduler::later`] taking the wait as a trailing argument.
    ///
    /// # Errors
    ///
    /// As [`Scheduler::later`].
    pub fn later_with_args(&self, callable: impl Into<Callable>, args: Args) -> Result<TimerId, SchedulerError> {
        let (args, wait) = split_timer_args(args);
        self.later(callable, args, wait)
    }

    /// Deprecated alias of [`Scheduler::later_with_args`].
    ///
    /// # Errors
    ///
    /// As [`Scheduler::later`].
    #[deprecated(note = "use `later` instead")]
    pub fn set_timeout(&self, callable: impl Into<Callable>, args: Args) -> Result<TimerId, SchedulerError> {
        self.later_with_args(callable, args)
    }

    fn reinstall_timer_timeout(&self) {
        self.clear_timer_timeout();
        self.install_timer_timeout();
    }

    fn clear_timer_timeout(&self) {
        let armed = self.0.state.borrow_mut().timer_timeout.take();
        if let Some(handle) = armed {
            self.0.platform.clear_timeout(handle);
        }
    }

    fn install_timer_timeout(&self) {
        let Some(due) = self.0.state.borrow().timers.next_due() else {
            return;
        };
        let wait = due.saturating_sub(self.0.platform.now());
        let weak = Rc::downgrade(&self.0);
        let handle = self.0.platform.set_timeout(
            Box::new(move || Self::from_weak(&weak).map_or(Ok(()), |scheduler| scheduler.run_expired_timers())),
            wait,
        );
        self.0.state.borrow_mut().timer_timeout = Some(handle);
    }

    fn run_expired_timers(&self) -> Result<(), SchedulerError> {
        let idle = {
            let mut state = self.0.state.borrow_mut();
            state.timer_timeout = None;
            state.timers.is_empty()
        };
        if idle {
            return Ok(());
        }
        self.begin();
        let scheduled = self.schedule_expired_timers();
        let ended = self.end();
        scheduled.and(ended)
    }

    fn schedule_expired_timers(&self) -> Result<(), SchedulerError> {
        let now = self.0.platform.now();
        let expired = self.0.state.borrow_mut().timers.drain_expired(now);
        tracing::debug!("{} timer(s) expired at {}", expired.len(), now);
        let instance = self.ensure_instance();
        let promoted: Result<Vec<_>, _> = expired
            .into_iter()
            .map(|entry| {
                let work = entry.work;
                instance.schedule(&self.0.default_queue, work.target, work.method, work.args, false, work.stack)
            })
            .collect();
        self.install_timer_timeout();
        promoted.map(drop)
    }

    // ---- throttle / debounce ----

    /// Run the pair at most once per `wait_ms` window.
    ///
    /// With `immediate` the call runs now (via [`Scheduler::join`]);
    /// otherwise it runs when the window closes. Calls inside an open window
    /// only replace the stored arguments and return the same handle.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::MissingMethod`], or a failure of the immediate call.
    /// In the latter case no window is left open.
    pub fn throttle(
        &self,
        callable: impl Into<Callable>,
        args: Args,
        wait_ms: u64,
        immediate: bool,
    ) -> Result<ThrottleHandle, SchedulerError> {
        let (target, method) = callable.into().resolve()?;
        bump(&self.0.counters.throttle);
        let key = WorkKey::new(target.as_ref(), &method);
        {
            let mut state = self.0.state.borrow_mut();
            if let Some(live) = state.throttlers.find_mut(key) {
                live.args = args;
                return Ok(ThrottleHandle { key, timer: live.timer });
            }
        }

        let stack = self.capture_stack();
        let timer = self.arm_keyed(Registry::Throttle, key, wait_ms, immediate);
        let now_args = immediate.then(|| args.clone());
        self.0.state.borrow_mut().throttlers.push(KeyedTimer {
            key,
            _target: target,
            method: method.clone(),
            args,
            stack: stack.clone(),
            timer,
        });
        if let Some(now_args) = now_args {
            self.join_immediate(Registry::Throttle, key, timer, &method, &now_args, stack.as_ref())?;
        }
        Ok(ThrottleHandle { key, timer })
    }

    /// [`Scheduler::throttle`] taking `[.., wait]` or `[.., wait, immediate]`
    /// as trailing arguments; `immediate` defaults to `true`.
    ///
    /// # Errors
    ///
    /// As [`Scheduler::throttle`].
    pub fn throttle_with_args(
        &self,
        callable: impl Into<Callable>,
        args: Args,
    ) -> Result<ThrottleHandle, SchedulerError> {
        let (args, wait, immediate) = split_debounce_args(args);
        self.throttle(callable, args, wait, immediate.unwrap_or(true))
    }

    /// Run the pair once `wait_ms` passes without another call for it.
    ///
    /// Every call restarts the window with its own arguments. With
    /// `immediate`, the first call of a quiet period runs now and the
    /// window only suppresses repeats.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::MissingMethod`], or a failure of the immediate call.
    /// In the latter case no window is left open.
    pub fn debounce(
        &self,
        callable: impl Into<Callable>,
        args: Args,
        wait_ms: u64,
        immediate: bool,
    ) -> Result<DebounceHandle, SchedulerError> {
        let (target, method) = callable.into().resolve()?;
        bump(&self.0.counters.debounce);
        let key = WorkKey::new(target.as_ref(), &method);

        let previous = self.0.state.borrow_mut().debouncees.remove_key(key);
        let quiet = previous.is_none();
        if let Some(previous) = previous {
            self.0.platform.clear_timeout(previous.timer);
        }

        let stack = self.capture_stack();
        let timer = self.arm_keyed(Registry::Debounce, key, wait_ms, immediate);
        let now_args = (immediate && quiet).then(|| args.clone());
        self.0.state.borrow_mut().debouncees.push(KeyedTimer {
            key,
            _target: target,
            method: method.clone(),
            args,
            stack: stack.clone(),
            timer,
        });
        if let Some(now_args) = now_args {
            self.join_immediate(Registry::Debounce, key, timer, &method, &now_args, stack.as_ref())?;
        }
        Ok(DebounceHandle { key, timer })
    }

    /// [`Scheduler::debounce`] taking `[.., wait]` or `[.., wait, immediate]`
    /// as trailing arguments; `immediate` defaults to `false`.
    ///
    /// # Errors
    ///
    /// As [`Scheduler::debounce`].
    pub fn debounce_with_args(
        &self,
        callable: impl Into<Callable>,
        args: Args,
    ) -> Result<DebounceHandle, SchedulerError> {
        let (args, wait, immediate) = split_debounce_args(args);
        self.debounce(callable, args, wait, immediate.unwrap_or(false))
    }

    /// Run the leading call of a window. A failure tears the window down
    /// again so the pair is not suppressed for a call that never succeeded.
    fn join_immediate(
        &self,
        kind: Registry,
        key: WorkKey,
        timer: PlatformHandle,
        method: &Method,
        args: &[Value],
        stack: Option<&DebugStack>,
    ) -> Result<(), SchedulerError> {
        self.join_resolved(method, args, stack).map(drop).inspect_err(|_| {
            self.cancel_keyed(kind, key, timer);
            tracing::debug!("{:?} window dropped after failed immediate call", kind);
        })
    }

    fn arm_keyed(&self, kind: Registry, key: WorkKey, wait_ms: u64, immediate: bool) -> PlatformHandle {
        let weak = Rc::downgrade(&self.0);
        let armed = Rc::new(Cell::new(None));
        let slot = Rc::clone(&armed);
        let handle = self.0.platform.set_timeout(
            Box::new(move || {
                Self::from_weak(&weak).map_or(Ok(()), |scheduler| {
                    scheduler.fire_keyed(kind, key, slot.get(), immediate)
                })
            }),
            wait_ms,
        );
        armed.set(Some(handle));
        handle
    }

    fn fire_keyed(
        &self,
        kind: Registry,
        key: WorkKey,
        timer: Option<PlatformHandle>,
        immediate: bool,
    ) -> Result<(), SchedulerError> {
        let live = {
            let mut state = self.0.state.borrow_mut();
            state
                .registry(kind)
                .find_mut(key)
                .filter(|entry| timer.is_none_or(|t| entry.timer == t))
                .map(|entry| (entry.method.clone(), entry.args.clone(), entry.stack.clone()))
        };
        let Some((method, args, stack)) = live else {
            return Ok(());
        };
        tracing::debug!("{:?} window closed", kind);

        let result = if immediate {
            Ok(())
        } else {
            self.run_resolved(&method, &args, stack.as_ref()).map(drop)
        };

        let mut state = self.0.state.borrow_mut();
        let registry = state.registry(kind);
        match timer {
            Some(timer) => registry.remove_matching(key, timer),
            None => registry.remove_key(key),
        };
        result
    }

    // ---- cancellation ----

    /// Cancel scheduled work. Returns `false` if it already ran or was
    /// already cancelled.
    pub fn cancel(&self, handle: impl Into<CancelHandle>) -> bool {
        bump(&self.0.counters.cancel);
        match handle.into() {
            CancelHandle::Queue(handle) => handle.cancel(),
            CancelHandle::Timer(id) => {
                let removed = self.0.state.borrow_mut().timers.remove(id);
                match removed {
                    Some(0) => {
                        self.reinstall_timer_timeout();
                        true
                    }
                    Some(_) => true,
                    None => false,
                }
            }
            CancelHandle::Throttle(handle) => self.cancel_keyed(Registry::Throttle, handle.key, handle.timer),
            CancelHandle::Debounce(handle) => self.cancel_keyed(Registry::Debounce, handle.key, handle.timer),
        }
    }

    fn cancel_keyed(&self, kind: Registry, key: WorkKey, timer: PlatformHandle) -> bool {
        let removed = self.0.state.borrow_mut().registry(kind).remove_matching(key, timer);
        match removed {
            Some(entry) => {
                self.0.platform.clear_timeout(entry.timer);
                true
            }
            None => false,
        }
    }

    /// Drop every timer, throttle window, debounced call and pending
    /// autorun continuation.
    pub fn cancel_timers(&self) {
        bump(&self.0.counters.cancel_timers);
        let (windows, autorun) = {
            let mut state = self.0.state.borrow_mut();
            let mut windows = state.throttlers.take_timers();
            windows.extend(state.debouncees.take_timers());
            state.timers.clear();
            (windows, state.autorun.take())
        };
        for timer in windows {
            self.0.platform.clear_timeout(timer);
        }
        self.clear_timer_timeout();
        if let Some(handle) = autorun {
            self.0.platform.clear_next(handle);
        }
        tracing::debug!("all timers cancelled");
    }

    /// True while any timer, throttle window, debounced call or autorun is
    /// pending.
    #[must_use]
    pub fn has_timers(&self) -> bool {
        let state = self.0.state.borrow();
        !state.timers.is_empty()
            || !state.throttlers.is_empty()
            || !state.debouncees.is_empty()
            || state.autorun.is_some()
    }

    // ---- events ----

    /// Subscribe to a run-loop event.
    pub fn on(&self, event: EventName, callback: EventCallback) {
        self.0.events.on(event, callback);
    }

    /// Unsubscribe a previously registered callback.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::CallbackNotRegistered`].
    pub fn off(&self, event: EventName, callback: &EventCallback) -> Result<(), SchedulerError> {
        self.0.events.off(event, callback)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.borrow();
        f.debug_struct("Scheduler")
            .field("queues", &self.0.queue_names)
            .field("default_queue", &self.0.default_queue)
            .field("current", &state.current.as_ref().map(|i| i.id()))
            .field("depth", &state.stack.len())
            .field("autorun", &state.autorun.is_some())
            .field("timers", &state.timers.len())
            .field("throttlers", &state.throttlers.len())
            .field("debouncees", &state.debouncees.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ManualPlatform;
    use serde_json::json;

    fn scheduler(queues: &[&str]) -> (Scheduler, Rc<ManualPlatform>) {
        let platform = Rc::new(ManualPlatform::new());
        let scheduler = Scheduler::builder(queues.iter().copied())
            .platform(platform.clone())
            .build()
            .unwrap();
        (scheduler, platform)
    }

    #[test]
    fn test_end_without_begin() {
        let (bb, _) = scheduler(&["one"]);
        assert!(matches!(bb.end(), Err(SchedulerError::EndWithoutBegin)));
    }

    #[test]
    fn test_begin_end_nesting_restores_parent() {
        let (bb, _) = scheduler(&["one"]);
        let outer = bb.begin();
        let inner = bb.begin();
        assert_ne!(outer.id(), inner.id());
        bb.end().unwrap();
        assert_eq!(bb.current_instance().unwrap().id(), outer.id());
        bb.end().unwrap();
        assert!(bb.current_instance().is_none());
        assert_eq!(bb.stats().loops_nested, 1);
    }

    #[test]
    fn test_run_returns_value() {
        let (bb, _) = scheduler(&["one"]);
        let value = bb.run(Method::new(|args| Ok(json!(args.len()))), vec![json!(1), json!(2)]);
        assert_eq!(value.unwrap(), json!(2));
    }

    #[test]
    fn test_schedule_unknown_queue_opens_nothing() {
        let (bb, platform) = scheduler(&["one"]);
        let err = bb.schedule("two", Method::unit(|| {}), vec![]).unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownQueue(_)));
        assert!(bb.current_instance().is_none());
        assert_eq!(platform.pending_next(), 0);
    }

    #[test]
    fn test_autorun_flushes_on_next() {
        let (bb, platform) = scheduler(&["one"]);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        bb.schedule("one", Method::unit(move || h.set(h.get() + 1)), vec![]).unwrap();
        assert!(bb.has_timers());
        assert_eq!(hits.get(), 0);

        platform.run_next().unwrap();
        assert_eq!(hits.get(), 1);
        assert!(!bb.has_timers());
        assert!(bb.current_instance().is_none());
    }

    #[test]
    fn test_stale_autorun_is_ignored() {
        let (bb, _) = scheduler(&["one"]);
        bb.ensure_instance();
        bb.cancel_timers();
        assert!(bb.autorun_end().is_ok());
        // The instance is left open; only its continuation was dropped.
        assert!(bb.current_instance().is_some());
    }

    #[test]
    fn test_debug_mode_captures_stacks() {
        let platform = Rc::new(ManualPlatform::new());
        let bb = Scheduler::builder(["one"])
            .platform(platform)
            .debug(true)
            .build()
            .unwrap();
        bb.schedule("one", Method::unit(|| {}), vec![]).unwrap();
        let queue = Rc::clone(bb.current_instance().unwrap().queue("one").unwrap());
        assert!(queue.stack_for(0).is_some());
    }

    #[test]
    fn test_dropped_scheduler_ignores_platform_callbacks() {
        let (bb, platform) = scheduler(&["one"]);
        bb.later(Method::unit(|| panic!("must not run")), vec![], 5).unwrap();
        drop(bb);
        platform.advance(10).unwrap();
    }
}
