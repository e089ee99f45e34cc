//! Progress reporting for pipeline runs.
//!
//! The orchestrator reports footprint rows processed through a
//! [`ProgressCallback`]; binaries plug in a terminal renderer and tests use
//! [`NullProgress`].

use std::sync::Arc;

/// Receives progress from a running pipeline.
///
/// Implementations must be `Send + Sync` since the orchestrator holds them
/// in an `Arc` alongside its worker pool.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work (enables percentage/ETA).
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
