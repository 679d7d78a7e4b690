//! Error types for review synchronization.

use thiserror::Error;

/// Failures surfaced by the synchronization engine.
///
/// Transport-level failures are absorbed and retried at the layer that owns
/// the transport; only exhaustion of recovery reaches the consumer. An
/// incomplete filter set is a defined idle state, not an error, so it has
/// no variant here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Push connection failed: {reason}")]
    Connection { reason: String },

    #[error("Request timed out after {timeout_ms}ms")]
    RequestTimeout { timeout_ms: u64 },

    #[error("Request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Submission rejected: {reason}")]
    SubmissionRejected { reason: String },
}

impl SyncError {
    /// Short tag for structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Connection { .. } => "connection",
            SyncError::RequestTimeout { .. } => "request_timeout",
            SyncError::RequestFailed { .. } => "request_failed",
            SyncError::SubmissionRejected { .. } => "submission_rejected",
        }
    }
}
