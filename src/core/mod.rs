//! Core run-loop abstractions: work items, queues, instances and the
//! scheduler.

pub mod error;
pub mod events;
pub mod handle;
pub mod instance;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod timers;
pub mod work;

pub use error::{AppResult, SchedulerError};
pub use events::{EventCallback, EventName};
pub use handle::{CancelHandle, DebounceHandle, ThrottleHandle};
pub use instance::{InstanceId, RunLoopInstance};
pub use queue::{FlushContext, FlushOutcome, MustYield, Queue, QueueHandle, QueueHook, QueueHooks};
pub use scheduler::Scheduler;
pub use stats::SchedulerStats;
pub use timers::TimerId;
pub use work::{Args, Callable, DebugStack, Method, MethodTable, OnError, Target, TargetRef, WorkKey};
