pub mod args;
pub mod telemetry;

pub use args::*;
pub use telemetry::*;
