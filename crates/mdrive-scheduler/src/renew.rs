//! The renewal operation consumed by the driver.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdrive_store::DriveStatus;

use crate::ManagedDomain;

/// Status reported by a renewal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewStatus {
    /// A complete, self-consistent credential set is staged.
    Complete,
    /// Progress was made, call again later.
    InProgress,
    /// The domain configuration is missing something the protocol needs.
    IncompleteConfig,
    /// The attempt failed.
    Failed,
}

/// Result of one renewal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewOutcome {
    pub status: RenewStatus,
    pub message: Option<String>,
    /// When the staged credentials become safe to activate.
    pub valid_from: Option<DateTime<Utc>>,
}

impl RenewOutcome {
    pub fn complete(valid_from: DateTime<Utc>) -> Self {
        Self {
            status: RenewStatus::Complete,
            message: None,
            valid_from: Some(valid_from),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: RenewStatus::Failed,
            message: Some(message.into()),
            valid_from: None,
        }
    }

    pub fn in_progress(message: impl Into<String>) -> Self {
        Self {
            status: RenewStatus::InProgress,
            message: Some(message.into()),
            valid_from: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == RenewStatus::Complete
    }

    /// Job status recorded for this outcome.
    pub fn drive_status(&self) -> DriveStatus {
        match self.status {
            RenewStatus::Complete => DriveStatus::Ok,
            RenewStatus::InProgress => DriveStatus::InProgress,
            RenewStatus::IncompleteConfig => DriveStatus::Incomplete,
            RenewStatus::Failed => DriveStatus::Failed,
        }
    }
}

/// Options passed to a renewal attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenewOptions {
    /// Discard staged progress and start over.
    pub reset: bool,
}

/// Advances a domain toward a renewed credential set.
///
/// Called repeatedly while a renewal is incomplete; implementations keep
/// partial progress in the domain's staging area between calls.
#[async_trait]
pub trait Renewer: Send + Sync {
    async fn renew(&self, domain: &ManagedDomain, options: &RenewOptions) -> RenewOutcome;
}
