//! One-time notification about domains ready for activation.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdrive_store::Store;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::DriveJob;

/// Runs an external command to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv` and wait for it to exit. Returns the exit code, `None` when
    /// the process was terminated by a signal. An `Err` means the command
    /// could not be run at all.
    async fn execute(&self, argv: &[String]) -> io::Result<Option<i32>>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(&self, argv: &[String]) -> io::Result<Option<i32>> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .status()
            .await?;
        Ok(status.code())
    }
}

/// What a notification pass found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Names of the jobs that were ready, in job order.
    pub ready: Vec<String>,
    /// Whether the ready jobs were marked notified.
    pub delivered: bool,
}

/// Announce jobs that finished and became usable since the last pass.
///
/// The command, if configured, runs once with every ready name appended as
/// an argument. Its exit code is logged but does not matter; only a command
/// that cannot be run leaves the jobs unnotified for the next pass.
pub async fn notify_ready(
    jobs: &mut [DriveJob],
    notify_cmd: Option<&str>,
    runner: &dyn CommandRunner,
    store: &dyn Store,
    now: DateTime<Utc>,
) -> NotifyReport {
    let ready: Vec<String> = jobs
        .iter()
        .filter(|j| j.is_ready(now))
        .map(|j| j.name.clone())
        .collect();
    if ready.is_empty() {
        return NotifyReport::default();
    }
    let names = ready.join(" ");
    let plural = ready.len() > 1;

    let mut delivered = true;
    if let Some(cmd) = notify_cmd.map(str::trim).filter(|cmd| !cmd.is_empty()) {
        let argv: Vec<String> = cmd
            .split_whitespace()
            .map(str::to_string)
            .chain(ready.iter().cloned())
            .collect();
        match runner.execute(&argv).await {
            Ok(exit_code) => {
                debug!(cmd, exit_code = ?exit_code, code = 1010, "notify command returned");
            }
            Err(e) => {
                delivered = false;
                error!(
                    cmd,
                    error = %e,
                    code = 1011,
                    "executing notify command {} failed. This is sad, as I wanted to tell you \
                     that the managed domain{} {} {} ready for a server reload",
                    cmd,
                    if plural { "s" } else { "" },
                    names,
                    if plural { "are" } else { "is" }
                );
            }
        }
    }

    if delivered {
        // The next pass may run in another process; persist before anything else.
        for job in jobs.iter_mut().filter(|j| j.is_ready(now)) {
            job.notified = true;
            if let Err(e) = store.save_job(&job.name, &job.to_props()).await {
                job.dirty = true;
                error!(name = %job.name, error = %e, code = 1017, "failed to save job props");
            }
        }
    }

    info!(
        domains = %names,
        code = 1012,
        "The managed domain{} {} {} been set up and changes will be activated on next \
         (graceful) server restart.",
        if plural { "s" } else { "" },
        names,
        if plural { "have" } else { "has" }
    );

    NotifyReport { ready, delivered }
}
