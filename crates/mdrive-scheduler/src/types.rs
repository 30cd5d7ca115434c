//! Scheduler types.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use mdrive_store::{CredentialInfo, DriveStatus, JobProps};

use crate::{DomainState, ManagedDomain};

/// Base delay after the first failed attempt.
const RETRY_BASE_SECS: i64 = 5;

/// Upper bound of the retry delay.
const RETRY_MAX_SECS: i64 = 3600;

/// In-memory drive job of one managed domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveJob {
    /// Domain name, never changes.
    pub name: String,
    /// Earliest next evaluation. `None` means the default cadence.
    pub next_run: Option<DateTime<Utc>>,
    pub last_status: DriveStatus,
    pub last_message: Option<String>,
    /// A complete credential set is staged.
    pub finished: bool,
    /// When the staged credentials become usable.
    pub valid_from: Option<DateTime<Utc>>,
    /// Consecutive failed attempts.
    pub error_runs: u32,
    /// The ready notification has been delivered.
    pub notified: bool,
    /// In-memory state differs from what is persisted.
    pub dirty: bool,
    /// The next renewal attempt discards staged progress. Not persisted.
    pub reset_staging: bool,
}

impl DriveJob {
    /// A fresh job with all fields zeroed except the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_run: None,
            last_status: DriveStatus::Ok,
            last_message: None,
            finished: false,
            valid_from: None,
            error_runs: 0,
            notified: false,
            dirty: false,
            reset_staging: false,
        }
    }

    /// Replace all fields except the name with persisted `props`.
    pub fn apply(&mut self, props: JobProps) {
        self.next_run = props.next_run;
        self.last_status = props.last_status;
        self.last_message = props.last_message;
        self.finished = props.finished;
        self.valid_from = props.valid_from;
        self.error_runs = props.error_runs;
        self.notified = props.notified;
        self.dirty = false;
    }

    /// The persisted form of this job.
    pub fn to_props(&self) -> JobProps {
        JobProps {
            name: self.name.clone(),
            finished: self.finished,
            notified: self.notified,
            next_run: self.next_run,
            valid_from: self.valid_from,
            error_runs: self.error_runs,
            last_status: self.last_status,
            last_message: self.last_message.clone(),
        }
    }

    /// Whether the job wants to be evaluated at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run.is_none_or(|at| now >= at)
    }

    /// Finished, and `installed` credentials are the staged ones or newer.
    ///
    /// A record without `valid_from` counts as activated once any credentials
    /// are installed.
    pub fn is_activated(&self, installed: Option<&CredentialInfo>) -> bool {
        self.finished
            && installed
                .is_some_and(|c| self.valid_from.is_none_or(|staged| c.valid_from >= staged))
    }

    /// Finished, usable and not yet announced.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.finished && !self.notified && self.valid_from.is_none_or(|at| now >= at)
    }
}

/// Delay before retrying after `error_runs` consecutive failures.
///
/// 5s, 10s, 20s, ... capped at one hour.
pub fn retry_delay(error_runs: u32) -> Duration {
    let exp = error_runs.saturating_sub(1).min(20);
    Duration::seconds((RETRY_BASE_SECS << exp).min(RETRY_MAX_SECS))
}

/// Logical position of a job in its renewal cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// No job record persisted yet.
    New,
    /// Configuration lacks required information.
    BlockedIncomplete,
    /// Credentials are fine, waiting for the renew window.
    WaitingForExpiry,
    /// A renewal is being driven.
    Renewing,
    /// New credentials are staged and wait for activation.
    FinishedPendingActivation,
    /// Staged credentials were announced.
    FinishedNotified,
}

impl JobPhase {
    /// Phase of a domain given its persisted job record, if any.
    pub fn classify(record: Option<&JobProps>, domain: &ManagedDomain, now: DateTime<Utc>) -> Self {
        let Some(record) = record else {
            return match domain.state {
                DomainState::MissingInformation => JobPhase::BlockedIncomplete,
                _ => JobPhase::New,
            };
        };

        if record.finished {
            return if record.notified {
                JobPhase::FinishedNotified
            } else {
                JobPhase::FinishedPendingActivation
            };
        }
        if domain.state == DomainState::MissingInformation {
            return JobPhase::BlockedIncomplete;
        }
        if record.error_runs > 0
            || record.last_status == DriveStatus::InProgress
            || domain.should_renew(now)
        {
            return JobPhase::Renewing;
        }
        JobPhase::WaitingForExpiry
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::New => "new",
            JobPhase::BlockedIncomplete => "blocked-incomplete",
            JobPhase::WaitingForExpiry => "waiting-for-expiry",
            JobPhase::Renewing => "renewing",
            JobPhase::FinishedPendingActivation => "finished-pending-activation",
            JobPhase::FinishedNotified => "finished-notified",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human readable duration for operator logs, e.g. `2 days 3 hours`.
pub fn format_duration(d: Duration) -> String {
    let mut secs = d.num_seconds();
    let mut out = String::new();
    if secs < 0 {
        out.push('-');
        secs = -secs;
    }
    if secs == 0 {
        let ms = d.num_milliseconds().abs();
        out.push_str(&format!("{ms} ms"));
        return out;
    }

    let parts = [
        (secs / 86_400, "day"),
        ((secs % 86_400) / 3600, "hour"),
        ((secs % 3600) / 60, "minute"),
        (secs % 60, "second"),
    ];
    let mut first = true;
    for (n, unit) in parts {
        if n == 0 {
            continue;
        }
        if !first {
            out.push(' ');
        }
        first = false;
        out.push_str(&format!("{n} {unit}{}", if n == 1 { "" } else { "s" }));
    }
    out
}
