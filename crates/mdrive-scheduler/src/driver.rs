//! Per-job drive logic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mdrive_store::{DriveStatus, Store, StoreGroup};
use tracing::{debug, error, info, trace, warn};

use crate::{
    Clock, DomainRegistry, DomainState, DriveJob, ManagedDomain, RenewOptions, Renewer,
    format_duration, retry_delay,
};

/// Result of evaluating one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// The reloaded job is not due yet. Nothing was changed.
    NotDue,
    /// The job was evaluated and ended with this status.
    Evaluated(DriveStatus),
}

/// Evaluates drive jobs against the domain configuration.
pub struct Driver {
    registry: Arc<DomainRegistry>,
    store: Arc<dyn Store>,
    renewer: Arc<dyn Renewer>,
    clock: Arc<dyn Clock>,
}

impl Driver {
    pub fn new(
        registry: Arc<DomainRegistry>,
        store: Arc<dyn Store>,
        renewer: Arc<dyn Renewer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            renewer,
            clock,
        }
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Refresh `job` from the store.
    ///
    /// A dirty job holds changes whose save failed; those are newer than the
    /// store and are kept so the next save can retry them.
    pub async fn reload(&self, job: &mut DriveJob) {
        if job.dirty {
            debug!(name = %job.name, "job has unsaved changes, skipping reload");
            return;
        }
        match self.store.load_job(&job.name).await {
            Ok(Some(props)) => job.apply(props),
            Ok(None) => {}
            Err(e) => {
                warn!(name = %job.name, error = %e, code = 1018, "failed to load job props")
            }
        }
    }

    /// Run one evaluation of `job`.
    #[tracing::instrument(skip(self, job), fields(name = %job.name))]
    pub async fn evaluate(&self, job: &mut DriveJob) -> Evaluation {
        self.reload(job).await;

        // Another process may have pushed next_run out since the caller checked.
        let now = self.clock.now();
        if !job.is_due(now) {
            return Evaluation::NotDue;
        }

        let domain = match self.registry.get(&job.name) {
            Some(configured) => Some(self.current_domain(configured, now).await),
            None => None,
        };
        if let Some(domain) = &domain
            && job.is_activated(domain.credential.as_ref())
        {
            self.begin_generation(job).await;
        }

        let mut next_run = None;
        let mut status = job.last_status;
        let mut message = job.last_message.clone();

        match domain.as_ref() {
            None => {
                warn!(name = %job.name, "drive job has no managed domain, skipping");
            }
            Some(domain) if domain.state == DomainState::MissingInformation => {
                // Stays this way until the configuration changes and the process restarts.
                status = DriveStatus::Incomplete;
                job.error_runs += 1;
                job.dirty = true;
                debug!(
                    name = %job.name,
                    error_runs = job.error_runs,
                    code = 1019,
                    "domain is missing required information"
                );
            }
            Some(_) if job.finished => {
                if let Some(valid_from) = job.valid_from.filter(|at| now < *at) {
                    next_run = Some(valid_from);
                }
            }
            Some(domain) if domain.should_renew(now) => {
                debug!(name = %job.name, state = ?domain.state, code = 1001, "driving");

                let options = RenewOptions {
                    reset: job.reset_staging,
                };
                let outcome = self.renewer.renew(domain, &options).await;
                job.reset_staging = false;
                job.dirty = true;
                status = outcome.drive_status();
                message = outcome.message.clone();

                if outcome.is_complete() {
                    let now = self.clock.now();
                    let valid_from = outcome.valid_from.unwrap_or(now);
                    job.finished = true;
                    job.notified = false;
                    job.valid_from = Some(valid_from);
                    job.error_runs = 0;
                    if valid_from > now {
                        next_run = Some(valid_from);
                    }
                    info!(
                        name = %job.name,
                        valid_from = %valid_from.to_rfc2822(),
                        code = 1002,
                        "{}: has been renewed successfully and should be activated at {} \
                         (this requires a server restart latest in {})",
                        job.name,
                        valid_from.to_rfc2822(),
                        format_duration(valid_from - now)
                    );
                } else {
                    error!(
                        name = %job.name,
                        status = %status,
                        message = message.as_deref().unwrap_or(""),
                        code = 1003,
                        "renewal attempt failed"
                    );
                    job.error_runs += 1;
                    let delay = retry_delay(job.error_runs);
                    next_run = Some(now + delay);
                    info!(
                        name = %job.name,
                        error_runs = job.error_runs,
                        code = 1004,
                        "{}: encountered error for the {}. time, next run in {}",
                        job.name,
                        job.error_runs,
                        format_duration(delay)
                    );
                }
            }
            Some(domain) => {
                // Default cadence keeps checking until the renew window opens.
                if let Some(expires) = domain.expires() {
                    debug!(
                        name = %job.name,
                        expires = %expires.to_rfc2822(),
                        code = 1005,
                        "no need to renew yet"
                    );
                }
            }
        }

        if next_run != job.next_run {
            job.next_run = next_run;
            job.dirty = true;
        }
        if status != job.last_status || message != job.last_message {
            job.last_status = status;
            job.last_message = message;
            job.dirty = true;
        }

        if job.dirty {
            self.save(job).await;
        }
        Evaluation::Evaluated(status)
    }

    /// The configured domain with the credentials currently installed in the store.
    async fn current_domain(
        &self,
        configured: &ManagedDomain,
        now: DateTime<Utc>,
    ) -> ManagedDomain {
        let mut domain = configured.clone();
        match self.store.load_credential(&domain.name).await {
            Ok(Some(credential)) => domain.install(credential, now),
            Ok(None) => {}
            Err(e) => {
                warn!(name = %domain.name, error = %e, "failed to load installed credentials")
            }
        }
        domain
    }

    /// Forget the finished drive once its credentials are in use, so the next
    /// renew window starts a fresh one.
    async fn begin_generation(&self, job: &mut DriveJob) {
        info!(
            name = %job.name,
            code = 1020,
            "{}: staged credentials are active, starting a new renewal generation",
            job.name
        );
        if let Err(e) = self.store.purge(StoreGroup::Staging, &job.name).await {
            error!(name = %job.name, error = %e, "failed to purge staging");
        }
        job.finished = false;
        job.notified = false;
        job.valid_from = None;
        job.error_runs = 0;
        job.reset_staging = true;
        job.dirty = true;
    }

    /// Persist `job`, clearing `dirty` on success.
    pub async fn save(&self, job: &mut DriveJob) {
        match self.store.save_job(&job.name, &job.to_props()).await {
            Ok(()) => {
                job.dirty = false;
                trace!(name = %job.name, "saved job props");
            }
            Err(e) => {
                error!(name = %job.name, error = %e, code = 1017, "failed to save job props");
            }
        }
    }
}
