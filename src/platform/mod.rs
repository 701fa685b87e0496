//! Platform adapters: the host timing primitives the scheduler runs on.
//!
//! The scheduler never blocks. Whenever it needs to continue later it hands a
//! callback to the [`Platform`] and returns control to the host, which calls
//! back in through that callback.

pub mod manual;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_local;

use crate::core::SchedulerError;

pub use manual::ManualPlatform;
#[cfg(feature = "tokio-runtime")]
pub use tokio_local::TokioPlatform;

/// Callback handed to the platform. Errors escaping a platform-driven flush
/// are returned to the host.
pub type PlatformCallback = Box<dyn FnOnce() -> Result<(), SchedulerError>>;

/// Opaque handle for a pending platform callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatformHandle(pub u64);

/// Host timing primitives.
pub trait Platform {
    /// Monotonic time in milliseconds, for relative comparisons only.
    fn now(&self) -> u64;

    /// Invoke `callback` once, no earlier than `delay_ms` from now.
    fn set_timeout(&self, callback: PlatformCallback, delay_ms: u64) -> PlatformHandle;

    /// Cancel a pending timeout. No-op if it already fired.
    fn clear_timeout(&self, handle: PlatformHandle);

    /// Invoke `callback` at the next opportunity after the current
    /// synchronous stack unwinds.
    fn next(&self, callback: PlatformCallback) -> PlatformHandle;

    /// Cancel a pending [`Platform::next`] callback.
    fn clear_next(&self, handle: PlatformHandle);
}
