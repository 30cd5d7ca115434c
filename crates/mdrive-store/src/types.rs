//! Persisted record types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File holding the job record inside a domain's staging entry.
pub const JOB_FILE: &str = "job.json";

/// File holding installed credential metadata inside a domain's `domains` entry.
pub const CREDENTIAL_FILE: &str = "cert.json";

/// Namespaces of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreGroup {
    /// In-progress renewal artifacts and the job record.
    Staging,
    /// Protocol-specific transient artifacts.
    Challenges,
    /// Installed credential metadata.
    Domains,
}

impl StoreGroup {
    /// Directory name of the group.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreGroup::Staging => "staging",
            StoreGroup::Challenges => "challenges",
            StoreGroup::Domains => "domains",
        }
    }
}

impl fmt::Display for StoreGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent drive attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveStatus {
    /// Nothing failed.
    #[default]
    Ok,
    /// Renewal made progress but has not completed.
    InProgress,
    /// Domain configuration lacks required information.
    Incomplete,
    /// Renewal attempt failed.
    Failed,
}

impl DriveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveStatus::Ok => "ok",
            DriveStatus::InProgress => "in_progress",
            DriveStatus::Incomplete => "incomplete",
            DriveStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DriveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted properties of a drive job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProps {
    /// Domain name.
    pub name: String,
    /// A complete credential set is staged.
    #[serde(default)]
    pub finished: bool,
    /// The ready notification has been delivered.
    #[serde(default)]
    pub notified: bool,
    /// Earliest next evaluation. Absent means the default cadence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    /// When the staged credentials become usable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    /// Consecutive failed attempts.
    #[serde(default)]
    pub error_runs: u32,
    #[serde(default)]
    pub last_status: DriveStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}

/// Metadata of the credentials currently in use for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialInfo {
    /// Start of the certificate validity.
    pub valid_from: DateTime<Utc>,
    /// End of the certificate validity.
    pub expires: DateTime<Utc>,
}
