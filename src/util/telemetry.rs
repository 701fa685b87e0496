//! Tracing setup for hosts and tests.
//!
//! The scheduler logs turn lifecycle at `debug` and per-timer detail at
//! `trace`, all under the `prometheus_runloop` target.

use tracing_subscriber::EnvFilter;

use crate::config::SchedulerConfig;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "prometheus_runloop=info";

/// Filter used when `RUST_LOG` is unset and the config enables debug mode.
pub const DEBUG_DIRECTIVE: &str = "prometheus_runloop=debug";

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install a fmt subscriber unless the host already installed one.
pub fn init_tracing() {
    init_with_directive(DEFAULT_DIRECTIVE);
}

/// Like [`init_tracing`], but a config in debug mode lowers the default
/// level so turn boundaries and autoruns are visible.
pub fn init_tracing_for(config: &SchedulerConfig) {
    init_with_directive(if config.debug { DEBUG_DIRECTIVE } else { DEFAULT_DIRECTIVE });
}

fn init_with_directive(fallback: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(fallback))
        .try_init();
}

/// Subscriber for tests: output goes through the harness capture, so log
/// lines only show up next to a failing test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(DEBUG_DIRECTIVE))
        .with_test_writer()
        .try_init();
}
