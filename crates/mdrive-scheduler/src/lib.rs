//! Renewal drive scheduler for managed domains.
//!
//! This crate decides, per managed domain, when a renewal must run and
//! drives it to completion across many watchdog ticks:
//! - Reloads job state from the store before every evaluation
//! - Retries failed renewals with bounded exponential backoff
//! - Computes the next wake time across all jobs
//! - Notifies an external command once per finished domain
//! - Purges leftovers of failed drives when a new process takes over

mod clock;
mod domain;
mod driver;
mod error;
mod notify;
mod renew;
mod scheduler;
mod types;
mod watchdog;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{DomainRegistry, DomainState, DriveMode, ManagedDomain, RenewWindow};
pub use driver::{Driver, Evaluation};
pub use error::SchedulerError;
pub use notify::{CommandRunner, NotifyReport, ProcessRunner, notify_ready};
pub use renew::{RenewOptions, RenewOutcome, RenewStatus, Renewer};
pub use scheduler::{DEFAULT_CADENCE_SECS, DriveConfig, DriveContext, next_wake, reset_domain};
pub use types::{DriveJob, JobPhase, format_duration, retry_delay};
pub use watchdog::{WatchState, Watchdog, WatchdogCallback, WatchdogHandle};

pub use mdrive_store::DriveStatus;
