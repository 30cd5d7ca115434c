//! Drive context and the watchdog tick.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mdrive_store::{Store, StoreGroup};
use tracing::{debug, error, info};

use crate::{
    CommandRunner, DriveJob, Driver, NotifyReport, SchedulerError, WatchState, WatchdogCallback,
    WatchdogHandle, format_duration, notify_ready,
};

/// Default full check interval in seconds. Ticks happen at least twice per cadence.
pub const DEFAULT_CADENCE_SECS: i64 = 86_400;

/// Settings of a drive context.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Command told about domains ready for activation.
    pub notify_cmd: Option<String>,
    /// Default full check interval.
    pub cadence: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            notify_cmd: None,
            cadence: Duration::seconds(DEFAULT_CADENCE_SECS),
        }
    }
}

/// Earliest wake time: `default_next` or the soonest job that asked for one.
pub fn next_wake(jobs: &[DriveJob], default_next: DateTime<Utc>) -> DateTime<Utc> {
    jobs.iter()
        .filter_map(|j| j.next_run)
        .fold(default_next, |wake, at| wake.min(at))
}

/// Purge everything stored about a domain's drive: staging (which holds its
/// job record) and challenge artifacts.
pub async fn reset_domain(store: &dyn Store, name: &str) -> Result<(), SchedulerError> {
    store.purge(StoreGroup::Staging, name).await?;
    store.purge(StoreGroup::Challenges, name).await?;
    info!(name, "reset drive state");
    Ok(())
}

/// State of the drive loop for as long as this process hosts it.
pub struct DriveContext {
    driver: Driver,
    runner: Arc<dyn CommandRunner>,
    config: DriveConfig,
    jobs: Vec<DriveJob>,
}

impl DriveContext {
    /// Build the job list from the watched domains and recover from failed
    /// drives of a previous process.
    ///
    /// Returns `None` when there is nothing to drive.
    pub async fn start(
        driver: Driver,
        runner: Arc<dyn CommandRunner>,
        config: DriveConfig,
    ) -> Option<Self> {
        let mut jobs = Vec::new();
        for name in driver.registry().watched_names() {
            let mut job = DriveJob::new(&name);
            debug!(name = %name, "created drive job");
            driver.reload(&mut job).await;

            if job.error_runs > 0 {
                // A fresh start may get past whatever the previous process ran into.
                info!(
                    name = %name,
                    error_runs = job.error_runs,
                    code = 1014,
                    "previous drive job showed {} errors, purging staging area to reset",
                    job.error_runs
                );
                for group in [StoreGroup::Staging, StoreGroup::Challenges] {
                    if let Err(e) = driver.store().purge(group, &name).await {
                        error!(name = %name, group = %group, error = %e, "failed to purge");
                    }
                }
                job = DriveJob::new(&name);
                job.reset_staging = true;
                driver.save(&mut job).await;
            }
            jobs.push(job);
        }

        purge_stale_challenges(&driver).await;

        if jobs.is_empty() {
            debug!(
                code = 1015,
                "no managed domain in state to drive, no watchdog needed, \
                 will check again on next restart"
            );
            return None;
        }

        Some(Self {
            driver,
            runner,
            config,
            jobs,
        })
    }

    pub fn jobs(&self) -> &[DriveJob] {
        &self.jobs
    }

    /// Evaluate every due job and return how long to wait until the next tick.
    #[tracing::instrument(skip(self), fields(jobs = self.jobs.len()))]
    pub async fn run_jobs(&mut self) -> std::time::Duration {
        let started = self.driver.clock().now();
        let default_next = started
            .checked_add_signed(self.config.cadence / 2)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        for job in self.jobs.iter_mut() {
            if job.is_due(self.driver.clock().now()) {
                self.driver.evaluate(job).await;
            }
        }

        let wake = next_wake(&self.jobs, default_next);
        let wait = (wake - self.driver.clock().now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        debug!(
            code = 1009,
            "next run in {}",
            format_duration(Duration::from_std(wait).unwrap_or(Duration::zero()))
        );
        wait
    }

    /// Tell the notify command about jobs that became ready.
    pub async fn notify_ready(&mut self) -> NotifyReport {
        let now = self.driver.clock().now();
        notify_ready(
            &mut self.jobs,
            self.config.notify_cmd.as_deref(),
            self.runner.as_ref(),
            self.driver.store(),
            now,
        )
        .await
    }
}

#[async_trait]
impl WatchdogCallback for DriveContext {
    async fn on_watchdog(&mut self, state: WatchState, watchdog: &WatchdogHandle) {
        match state {
            WatchState::Starting => {
                debug!(code = 1006, "drive watchdog start, auto drive {} domains", self.jobs.len());
            }
            WatchState::Running => {
                debug!(code = 1007, "drive watchdog run, auto drive {} domains", self.jobs.len());
                let wait = self.run_jobs().await;
                watchdog.set_interval(wait);
            }
            WatchState::Stopping => {
                debug!(code = 1008, "drive watchdog stopping");
            }
        }
        // Every tick ends with a notification pass, shutdown included.
        self.notify_ready().await;
    }
}

/// Remove challenge artifacts of names no longer under management.
async fn purge_stale_challenges(driver: &Driver) {
    let names = match driver.store().list_names(StoreGroup::Challenges).await {
        Ok(names) => names,
        Err(e) => {
            error!(error = %e, "failed to list challenge entries");
            return;
        }
    };
    for name in names
        .iter()
        .filter(|name| !driver.registry().contains(name))
    {
        match driver.store().purge(StoreGroup::Challenges, name).await {
            Ok(()) => debug!(name = %name, code = 1016, "purged stale challenge entry"),
            Err(e) => error!(name = %name, error = %e, "failed to purge stale challenge entry"),
        }
    }
}
