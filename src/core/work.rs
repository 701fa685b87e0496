//! Work items: callables, targets and their identities.
//!
//! A unit of deferred work is a `(target, method, args)` triple. Methods are
//! shared closures; targets are shared objects that can resolve methods by
//! name. Both compare by pointer identity, which is what coalescing,
//! cancellation, throttling and debouncing key on.

use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::core::SchedulerError;

/// Ordered argument list passed to a method.
pub type Args = Vec<Value>;

/// Error hook invoked when a callback fails.
///
/// Returning `Err` rethrows the failure to the nearest enclosing caller.
pub type OnError = Rc<dyn Fn(anyhow::Error, Option<&DebugStack>) -> anyhow::Result<()>>;

type MethodFn = dyn Fn(&[Value]) -> anyhow::Result<Value>;

/// A shared callable. Clones share identity.
#[derive(Clone)]
pub struct Method(Rc<MethodFn>);

impl Method {
    /// Wrap a closure taking the argument list.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + 'static,
    {
        Self(Rc::new(f))
    }

    /// Wrap a zero-argument closure that produces no value.
    pub fn unit<F>(f: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::new(move |_| {
            f();
            Ok(Value::Null)
        })
    }

    /// Invoke with the given arguments.
    pub fn call(&self, args: &[Value]) -> anyhow::Result<Value> {
        (self.0)(args)
    }

    /// True if both handles point at the same callable.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({:#x})", self.addr())
    }
}

/// An object whose methods can be looked up by name.
pub trait Target {
    /// Resolve a method by property name.
    ///
    /// Implementations should return the same [`Method`] for repeated lookups
    /// of one name, otherwise coalescing treats each lookup as a new method.
    fn lookup(&self, name: &str) -> Option<Method>;
}

/// Shared handle to a [`Target`].
pub type TargetRef = Rc<dyn Target>;

pub(crate) fn target_addr(target: Option<&TargetRef>) -> usize {
    target.map_or(0, |t| Rc::as_ptr(t).cast::<()>() as usize)
}

/// A name to method table usable as a [`Target`].
#[derive(Default, Clone)]
pub struct MethodTable {
    methods: HashMap<String, Method>,
}

impl MethodTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method under `name`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, method: Method) -> Self {
        self.methods.insert(name.into(), method);
        self
    }

    /// Fetch a method by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }
}

impl Target for MethodTable {
    fn lookup(&self, name: &str) -> Option<Method> {
        self.methods.get(name).cloned()
    }
}

/// The method half of a scheduling call, before resolution.
#[derive(Clone)]
pub enum Callable {
    /// A callable given directly, optionally bound to a target for identity.
    Direct {
        /// Optional receiver; participates in identity only.
        target: Option<TargetRef>,
        /// The callable itself.
        method: Method,
    },
    /// A property name to resolve on a target.
    Named {
        /// The object to resolve on.
        target: TargetRef,
        /// The property name.
        name: String,
    },
}

impl Callable {
    /// A callable bound to a target.
    pub fn on(target: TargetRef, method: Method) -> Self {
        Self::Direct {
            target: Some(target),
            method,
        }
    }

    /// A property name resolved on `target` when scheduled.
    pub fn named(target: TargetRef, name: impl Into<String>) -> Self {
        Self::Named {
            target,
            name: name.into(),
        }
    }

    /// Resolve to a concrete `(target, method)` pair, failing fast.
    pub fn resolve(self) -> Result<(Option<TargetRef>, Method), SchedulerError> {
        match self {
            Self::Direct { target, method } => Ok((target, method)),
            Self::Named { target, name } => match target.lookup(&name) {
                Some(method) => Ok((Some(target), method)),
                None => Err(SchedulerError::MissingMethod { name }),
            },
        }
    }
}

impl From<Method> for Callable {
    fn from(method: Method) -> Self {
        Self::Direct {
            target: None,
            method,
        }
    }
}

impl From<&Method> for Callable {
    fn from(method: &Method) -> Self {
        Self::from(method.clone())
    }
}

/// Identity of a `(target, method)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkKey {
    target: usize,
    method: usize,
}

impl WorkKey {
    pub(crate) fn new(target: Option<&TargetRef>, method: &Method) -> Self {
        Self {
            target: target_addr(target),
            method: method.addr(),
        }
    }
}

/// Call-site context captured when debug mode is on.
#[derive(Clone)]
pub struct DebugStack(Rc<Backtrace>);

impl DebugStack {
    /// Capture the current stack regardless of `RUST_BACKTRACE`.
    #[must_use]
    pub fn capture() -> Self {
        Self(Rc::new(Backtrace::force_capture()))
    }

    /// The captured backtrace.
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.0
    }
}

impl fmt::Debug for DebugStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DebugStack").field(&self.0.status()).finish()
    }
}

impl fmt::Display for DebugStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A pending invocation held by a queue or timer.
#[derive(Clone)]
pub(crate) struct WorkItem {
    pub(crate) target: Option<TargetRef>,
    pub(crate) method: Method,
    pub(crate) args: Args,
    pub(crate) stack: Option<DebugStack>,
}

impl WorkItem {
    pub(crate) const fn new(
        target: Option<TargetRef>,
        method: Method,
        args: Args,
        stack: Option<DebugStack>,
    ) -> Self {
        Self {
            target,
            method,
            args,
            stack,
        }
    }

    pub(crate) fn key(&self) -> WorkKey {
        WorkKey::new(self.target.as_ref(), &self.method)
    }

    /// Invoke, routing failures through `on_error` when one is configured.
    pub(crate) fn invoke(&self, on_error: Option<&OnError>) -> Result<Value, SchedulerError> {
        invoke_with(&self.method, &self.args, self.stack.as_ref(), on_error)
    }
}

/// Call `method`, handing a failure to `on_error` if present.
///
/// An absorbed failure yields `Value::Null`.
pub(crate) fn invoke_with(
    method: &Method,
    args: &[Value],
    stack: Option<&DebugStack>,
    on_error: Option<&OnError>,
) -> Result<Value, SchedulerError> {
    match method.call(args) {
        Ok(value) => Ok(value),
        Err(err) => match on_error {
            Some(handler) => {
                handler(err, stack)?;
                Ok(Value::Null)
            }
            None => Err(SchedulerError::Callback(err)),
        },
    }
}
