//! Builder to construct a scheduler from configuration.

use std::rc::Rc;

use crate::config::SchedulerConfig;
use crate::core::scheduler::SchedulerOptions;
use crate::core::{DebugStack, QueueHooks, RunLoopInstance, Scheduler, SchedulerError};
use crate::platform::Platform;

/// Collects a [`SchedulerConfig`] plus the callbacks that cannot be
/// serialized, then validates everything in [`SchedulerBuilder::build`].
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    options: SchedulerOptions,
    platform: Option<Rc<dyn Platform>>,
}

impl SchedulerBuilder {
    /// Start from queue names, in flush order.
    pub fn new<I, S>(queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_config(SchedulerConfig::new(queues))
    }

    /// Start from a loaded configuration.
    #[must_use]
    pub fn from_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            options: SchedulerOptions::default(),
            platform: None,
        }
    }

    /// Queue used by `later`; defaults to the first declared queue.
    #[must_use]
    pub fn default_queue(mut self, name: impl Into<String>) -> Self {
        self.config.default_queue = Some(name.into());
        self
    }

    /// Capture a stack at every scheduling call.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Called after every `begin` with `(current, previous)`.
    #[must_use]
    pub fn on_begin<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunLoopInstance, Option<&RunLoopInstance>) + 'static,
    {
        self.options.on_begin = Some(Rc::new(f));
        self
    }

    /// Called after every completed `end` with `(finished, next)`.
    #[must_use]
    pub fn on_end<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunLoopInstance, Option<&RunLoopInstance>) + 'static,
    {
        self.options.on_end = Some(Rc::new(f));
        self
    }

    /// Receives every callback failure. Returning `Err` rethrows it.
    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(anyhow::Error, Option<&DebugStack>) -> anyhow::Result<()> + 'static,
    {
        self.options.on_error = Some(Rc::new(f));
        self
    }

    /// Consulted between work items; `true` pauses the turn until the next
    /// opportunity.
    #[must_use]
    pub fn must_yield<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.options.must_yield = Some(Rc::new(f));
        self
    }

    /// Hooks run around every flush pass of `queue`.
    #[must_use]
    pub fn queue_hooks(mut self, queue: impl Into<String>, hooks: QueueHooks) -> Self {
        self.options.queue_hooks.insert(queue.into(), hooks);
        self
    }

    /// Use `platform` instead of the default one.
    ///
    /// Without this call the scheduler runs on `TokioPlatform` (feature
    /// `tokio-runtime`), which can only arm callbacks inside a Tokio
    /// `LocalSet`. Pass a [`ManualPlatform`](crate::platform::ManualPlatform)
    /// or a custom [`Platform`] to run elsewhere.
    #[must_use]
    pub fn platform(mut self, platform: Rc<dyn Platform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Validate and construct.
    ///
    /// With no [`SchedulerBuilder::platform`] set, the default Tokio
    /// platform is used. Every scheduling call on the result must then run
    /// inside a `tokio::task::LocalSet` (`run_until` or `block_on`);
    /// outside one, arming a callback panics in `spawn_local`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] for bad queue names, hooks for an
    /// undeclared queue, or a missing platform when no default exists.
    pub fn build(mut self) -> Result<Scheduler, SchedulerError> {
        self.config.validate()?;
        let undeclared: Vec<&String> = self
            .options
            .queue_hooks
            .keys()
            .filter(|name| !self.config.queues.contains(*name))
            .collect();
        if let Some(name) = undeclared.first() {
            return Err(SchedulerError::InvalidConfig(format!(
                "hooks given for undeclared queue `{name}`"
            )));
        }

        let default_queue = self
            .config
            .resolved_default_queue()
            .map(String::from)
            .ok_or_else(|| SchedulerError::InvalidConfig("no default queue".into()))?;
        let platform = match self.platform.take() {
            Some(platform) => platform,
            None => default_platform()?,
        };
        self.options.debug = self.config.debug;

        Ok(Scheduler::from_parts(
            self.config.queues,
            default_queue,
            self.options,
            platform,
        ))
    }
}

#[cfg(feature = "tokio-runtime")]
fn default_platform() -> Result<Rc<dyn Platform>, SchedulerError> {
    Ok(Rc::new(crate::platform::TokioPlatform::new()))
}

#[cfg(not(feature = "tokio-runtime"))]
fn default_platform() -> Result<Rc<dyn Platform>, SchedulerError> {
    Err(SchedulerError::InvalidConfig(
        "a platform is required when the `tokio-runtime` feature is disabled".into(),
    ))
}

impl std::fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("hooked_queues", &self.options.queue_hooks.keys().collect::<Vec<_>>())
            .field("platform", &self.platform.is_some())
            .finish_non_exhaustive()
    }
}
