//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] mdrive_store::StoreError),

    /// The timer facility cannot be used from this process.
    #[error("watchdog unavailable: {0}")]
    WatchdogUnavailable(String),

    /// Renew window could not be parsed.
    #[error("invalid renew window: {0}")]
    InvalidRenewWindow(String),
}
