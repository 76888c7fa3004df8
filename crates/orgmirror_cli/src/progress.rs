//! Progress reporting for mirror runs.
//!
//! Engine events are turned into structured `tracing` records, so the same
//! output works on a terminal, under systemd and in CI.

mod logging;

use std::sync::Arc;

use orgmirror::mirror::ProgressCallback;

pub use logging::LoggingReporter;

/// Build a progress callback that forwards events to a reporter.
pub fn progress_callback(reporter: Arc<LoggingReporter>) -> ProgressCallback {
    Box::new(move |event| reporter.handle(event))
}
