//! `begin` / `end` event subscriptions.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::core::{RunLoopInstance, SchedulerError};

/// Subscriber for run-loop transitions.
///
/// For `begin` it receives `(current, previous)`, for `end` it receives
/// `(finished, next)`.
pub type EventCallback = Rc<dyn Fn(&RunLoopInstance, Option<&RunLoopInstance>)>;

/// Events a scheduler emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A new run-loop instance was opened.
    Begin,
    /// A run-loop instance finished flushing.
    End,
}

impl EventName {
    /// The event's wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::End => "end",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "begin" => Ok(Self::Begin),
            "end" => Ok(Self::End),
            other => Err(SchedulerError::UnknownEvent(other.to_string())),
        }
    }
}

#[derive(Default)]
pub(crate) struct EventCallbacks {
    begin: RefCell<Vec<EventCallback>>,
    end: RefCell<Vec<EventCallback>>,
}

impl EventCallbacks {
    fn list(&self, event: EventName) -> &RefCell<Vec<EventCallback>> {
        match event {
            EventName::Begin => &self.begin,
            EventName::End => &self.end,
        }
    }

    pub(crate) fn on(&self, event: EventName, callback: EventCallback) {
        self.list(event).borrow_mut().push(callback);
    }

    /// Remove every registration of `callback`.
    pub(crate) fn off(&self, event: EventName, callback: &EventCallback) -> Result<(), SchedulerError> {
        let mut list = self.list(event).borrow_mut();
        let before = list.len();
        list.retain(|cb| !Rc::ptr_eq(cb, callback));
        if list.len() == before {
            return Err(SchedulerError::CallbackNotRegistered);
        }
        Ok(())
    }

    /// Fire subscribers in registration order. Subscribers may (un)subscribe
    /// while firing; changes apply from the next trigger.
    pub(crate) fn trigger(&self, event: EventName, first: &RunLoopInstance, second: Option<&RunLoopInstance>) {
        let callbacks: Vec<EventCallback> = self.list(event).borrow().clone();
        for callback in callbacks {
            callback(first, second);
        }
    }
}
