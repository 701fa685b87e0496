//! Error types for run-loop operations.

use thiserror::Error;

/// Errors produced by scheduler components.
///
/// Configuration and reentrancy failures are fatal and surface synchronously
/// at the call site; they are never routed through the `on_error` hook.
/// Failures raised by user callbacks are carried by [`SchedulerError::Callback`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Work was scheduled into a queue name that was never declared.
    #[error("You attempted to schedule an action in a queue ({0}) that doesn't exist")]
    UnknownQueue(String),
    /// A named method could not be resolved on its target.
    #[error("You attempted to schedule a method ({name}) that doesn't exist on its target")]
    MissingMethod {
        /// The property name that failed to resolve.
        name: String,
    },
    /// `end()` was called while no run-loop instance was open.
    #[error("end called without begin")]
    EndWithoutBegin,
    /// An event name other than `begin` or `end` was used.
    #[error("Cannot use event {0} because it does not exist")]
    UnknownEvent(String),
    /// `off()` was called with a callback that was never registered.
    #[error("Cannot off() callback that does not exist")]
    CallbackNotRegistered,
    /// Scheduler configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A scheduled callback failed and no `on_error` hook absorbed it.
    #[error(transparent)]
    Callback(#[from] anyhow::Error),
}

impl SchedulerError {
    /// True when this error came from user code rather than scheduler misuse.
    #[must_use]
    pub const fn is_callback(&self) -> bool {
        matches!(self, Self::Callback(_))
    }
}

/// Application-facing result using anyhow for callback bodies.
pub type AppResult<T> = Result<T, anyhow::Error>;
