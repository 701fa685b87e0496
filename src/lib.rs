//! # Prometheus Run Loop
//!
//! A deterministic, single-threaded run-loop scheduler.
//!
//! Deferred callbacks are batched into turns. Each turn is split into
//! declared queues that always drain in declaration order, so work can be
//! phased (for example `sync`, then `actions`, then `render`) no matter the
//! order in which it was scheduled. On top of the turns sit delayed timers,
//! throttling and debouncing.
//!
//! ## Key Features
//!
//! - **Ordered Queues**: strict cross-queue ordering; scheduling into an
//!   earlier queue mid-flush revisits it before later queues continue
//! - **Reentrant Turns**: nested `run` calls suspend and restore the parent turn
//! - **Autoruns**: scheduling outside a turn opens one that flushes at the
//!   platform's next opportunity
//! - **Coalescing**: `schedule_once` keeps at most one pending call per
//!   `(target, method)` pair
//! - **Timers**: `later`, `throttle` and `debounce`, all cancelable through
//!   typed handles
//! - **Cooperative Yielding**: a host predicate can pause a long turn and
//!   resume it later without losing its place
//! - **Pluggable Platform**: a virtual-clock platform for tests and a Tokio
//!   `LocalSet` platform for real programs
//!
//! ## Example
//!
//! ```rust
//! use std::rc::Rc;
//! use prometheus_runloop::core::{Method, Scheduler};
//! use prometheus_runloop::platform::ManualPlatform;
//! use serde_json::json;
//!
//! let platform = Rc::new(ManualPlatform::new());
//! let scheduler = Scheduler::builder(["sync", "render"])
//!     .platform(platform.clone())
//!     .build()?;
//!
//! let render = Method::new(|args| {
//!     println!("render {:?}", args);
//!     Ok(json!(null))
//! });
//! scheduler.run(
//!     {
//!         let scheduler = scheduler.clone();
//!         Method::new(move |_| {
//!             scheduler.schedule("render", render.clone(), vec![json!("view")])?;
//!             Ok(json!("done"))
//!         })
//!     },
//!     vec![],
//! )?;
//! # Ok::<(), prometheus_runloop::core::SchedulerError>(())
//! ```
//!
//! For complete examples, see `tests/run_loop_test.rs` and `tests/timers_test.rs`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Configuration models for schedulers.
pub mod config;
/// Core run-loop abstractions: work items, queues, instances and the scheduler.
pub mod core;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Host timing adapters.
pub mod platform;
/// Shared utilities.
pub mod util;

pub use crate::builders::SchedulerBuilder;
pub use crate::config::SchedulerConfig;
pub use crate::core::{Callable, CancelHandle, Method, MethodTable, Scheduler, SchedulerError};
pub use crate::platform::{ManualPlatform, Platform};
