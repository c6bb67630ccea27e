//! Scheduler error types.

use thiserror::Error;

/// Scheduler errors.
///
/// Failures of the operation itself are part of its output and never
/// surface here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The task was dropped before producing a result (it panicked or the
    /// runtime shut down).
    #[error("scheduled task was aborted before completing")]
    TaskAborted,
}
