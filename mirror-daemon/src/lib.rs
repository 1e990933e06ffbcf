//! Mirror scheduler: runs a sync pass on a fixed interval until shut down.

mod error;
pub mod log_rotation;
pub mod logging;
mod runtime;

pub use error::DaemonError;
pub use logging::{LogFormat, LogOptions};
pub use runtime::{run, run_pass, start_blocking, SchedulerReport};
