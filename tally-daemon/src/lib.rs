//! # tally-daemon
//!
//! Long-running cycle runner. Triggers arrive as newline-delimited JSON over
//! a Unix socket and are executed one at a time, oldest first.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_status, request_stop, request_trigger, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, start_blocking, CycleSummary, CycleTimestamps, DaemonConfig};
