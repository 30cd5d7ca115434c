//! Renewal attempts delegated to an external command.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdrive_scheduler::{ManagedDomain, RenewOptions, RenewOutcome, RenewStatus, Renewer};
use mdrive_store::{FsStore, StoreGroup};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

/// Status a renew command reports on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ReportStatus {
    Complete,
    InProgress,
    IncompleteConfig,
    Failed,
}

/// JSON document a renew command prints on success.
#[derive(Debug, Deserialize)]
struct RenewReport {
    status: ReportStatus,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    valid_from: Option<DateTime<Utc>>,
}

impl From<RenewReport> for RenewOutcome {
    fn from(report: RenewReport) -> Self {
        let status = match report.status {
            ReportStatus::Complete => RenewStatus::Complete,
            ReportStatus::InProgress => RenewStatus::InProgress,
            ReportStatus::IncompleteConfig => RenewStatus::IncompleteConfig,
            ReportStatus::Failed => RenewStatus::Failed,
        };
        RenewOutcome {
            status,
            message: report.message,
            valid_from: report.valid_from,
        }
    }
}

/// Runs `<renew_cmd> <domain> <staging dir>` for every attempt.
///
/// The command keeps its progress in the staging directory and prints a
/// report such as `{"status": "complete", "valid_from": "2026-01-01T00:00:00Z"}`.
/// A non-zero exit or unreadable report counts as a failed attempt.
pub struct CommandRenewer {
    argv: Vec<String>,
    store: FsStore,
}

impl CommandRenewer {
    pub fn new(renew_cmd: &str, store: FsStore) -> Self {
        Self {
            argv: renew_cmd.split_whitespace().map(str::to_string).collect(),
            store,
        }
    }

    async fn attempt(
        &self,
        domain: &ManagedDomain,
        options: &RenewOptions,
    ) -> Result<RenewOutcome, String> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| "renew command is empty".to_string())?;
        let staging = self
            .store
            .entry_dir(StoreGroup::Staging, &domain.name)
            .map_err(|e| e.to_string())?;
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| format!("failed to create {}: {e}", staging.display()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .arg(&domain.name)
            .arg(&staging)
            .stdin(Stdio::null());
        if options.reset {
            command.env("MDRIVE_RESET", "1");
        }
        let output = command
            .output()
            .await
            .map_err(|e| format!("failed to run {program}: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "renew command exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let report: RenewReport = serde_json::from_slice(&output.stdout)
            .map_err(|e| format!("unreadable renew report: {e}"))?;
        Ok(report.into())
    }
}

#[async_trait]
impl Renewer for CommandRenewer {
    async fn renew(&self, domain: &ManagedDomain, options: &RenewOptions) -> RenewOutcome {
        match self.attempt(domain, options).await {
            Ok(outcome) => {
                debug!(name = %domain.name, status = ?outcome.status, "renew command reported");
                outcome
            }
            Err(message) => {
                warn!(name = %domain.name, error = %message, "renew command failed");
                RenewOutcome::failed(message)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn script(dir: &Path, body: &str) -> String {
        let path = dir.join("renew.sh");
        std::fs::write(&path, body).unwrap();
        format!("sh {}", path.display())
    }

    #[tokio::test]
    async fn test_complete_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("store"));
        let cmd = script(
            dir.path(),
            "echo \"$1\" > \"$2/attempted\"\n\
             echo '{\"status\": \"complete\", \"valid_from\": \"2026-01-01T00:00:00Z\"}'\n",
        );
        let renewer = CommandRenewer::new(&cmd, store.clone());

        let outcome = renewer
            .renew(&ManagedDomain::new("example.org"), &RenewOptions::default())
            .await;

        assert!(outcome.is_complete());
        assert_eq!(
            outcome.valid_from,
            Some("2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap())
        );
        let marker = store
            .entry_dir(StoreGroup::Staging, "example.org")
            .unwrap()
            .join("attempted");
        assert_eq!(std::fs::read_to_string(marker).unwrap().trim(), "example.org");
    }

    #[tokio::test]
    async fn test_in_progress_report_keeps_message() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(
            dir.path(),
            "echo '{\"status\": \"in_progress\", \"message\": \"order pending\"}'\n",
        );
        let renewer = CommandRenewer::new(&cmd, FsStore::new(dir.path().join("store")));

        let outcome = renewer
            .renew(&ManagedDomain::new("example.org"), &RenewOptions::default())
            .await;

        assert_eq!(outcome.status, RenewStatus::InProgress);
        assert_eq!(outcome.message.as_deref(), Some("order pending"));
    }

    #[tokio::test]
    async fn test_reset_passed_in_environment() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(
            dir.path(),
            "echo \"{\\\"status\\\": \\\"in_progress\\\", \\\"message\\\": \\\"reset=${MDRIVE_RESET:-0}\\\"}\"\n",
        );
        let renewer = CommandRenewer::new(&cmd, FsStore::new(dir.path().join("store")));
        let domain = ManagedDomain::new("example.org");

        let resumed = renewer.renew(&domain, &RenewOptions::default()).await;
        let restarted = renewer.renew(&domain, &RenewOptions { reset: true }).await;

        assert_eq!(resumed.message.as_deref(), Some("reset=0"));
        assert_eq!(restarted.message.as_deref(), Some("reset=1"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(dir.path(), "echo 'rate limited' >&2\nexit 2\n");
        let renewer = CommandRenewer::new(&cmd, FsStore::new(dir.path().join("store")));

        let outcome = renewer
            .renew(&ManagedDomain::new("example.org"), &RenewOptions::default())
            .await;

        assert_eq!(outcome.status, RenewStatus::Failed);
        assert!(outcome.message.unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_garbage_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(dir.path(), "echo 'all good'\n");
        let renewer = CommandRenewer::new(&cmd, FsStore::new(dir.path().join("store")));

        let outcome = renewer
            .renew(&ManagedDomain::new("example.org"), &RenewOptions::default())
            .await;

        assert_eq!(outcome.status, RenewStatus::Failed);
        assert!(outcome.message.unwrap().starts_with("unreadable renew report"));
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let dir = tempfile::tempdir().unwrap();
        let renewer = CommandRenewer::new(
            "/nonexistent/acme-renew",
            FsStore::new(dir.path().join("store")),
        );

        let outcome = renewer
            .renew(&ManagedDomain::new("example.org"), &RenewOptions::default())
            .await;

        assert_eq!(outcome.status, RenewStatus::Failed);
    }
}
