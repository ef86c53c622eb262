//! Progress reporting for the parallel evaluation stage.
//!
//! The pipeline only talks to [`ProgressCallback`]; the binary decides how
//! to render it.

use std::sync::Arc;

/// Receives progress from a long-running stage.
///
/// Every rayon worker reports through the same shared handle, hence the
/// `Send + Sync` bound.
pub trait ProgressCallback: Send + Sync {
    /// Number of lots the stage will process.
    fn set_total(&self, total: u64);

    /// Lots completed since the last call.
    fn inc(&self, delta: u64);

    fn set_message(&self, msg: String);

    /// Stage done; leave `msg` on screen.
    fn finish(&self, msg: String);
}

/// Ignores every update. Used by tests and library callers.
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
