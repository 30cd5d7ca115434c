//! `mdrive status`: read-only overview of every configured domain.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use mdrive_scheduler::{DomainRegistry, DriveMode, DriveStatus, JobPhase, format_duration};
use mdrive_store::{Store, StoreError};

/// One line of the status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub name: String,
    pub drive_mode: DriveMode,
    pub phase: JobPhase,
    pub status: Option<DriveStatus>,
    pub next_run: Option<DateTime<Utc>>,
    pub error_runs: u32,
    pub message: Option<String>,
}

/// Gather the persisted drive state of every domain, in configuration order.
pub async fn collect(
    registry: &DomainRegistry,
    store: &dyn Store,
    now: DateTime<Utc>,
) -> Result<Vec<StatusRow>, StoreError> {
    let mut rows = Vec::new();
    for domain in registry.iter() {
        let record = store.load_job(&domain.name).await?;
        rows.push(StatusRow {
            name: domain.name.clone(),
            drive_mode: domain.drive_mode,
            phase: JobPhase::classify(record.as_ref(), domain, now),
            status: record.as_ref().map(|r| r.last_status),
            next_run: record.as_ref().and_then(|r| r.next_run),
            error_runs: record.as_ref().map_or(0, |r| r.error_runs),
            message: record.and_then(|r| r.last_message),
        });
    }
    Ok(rows)
}

/// Render rows as an aligned text table.
pub fn render(rows: &[StatusRow], now: DateTime<Utc>) -> String {
    let width = rows
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0)
        .max("DOMAIN".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:<6}  {:<27}  {:<11}  {:>6}  NEXT RUN",
        "DOMAIN", "MODE", "PHASE", "STATUS", "ERRORS"
    );
    for row in rows {
        let mode = match row.drive_mode {
            DriveMode::Auto => "auto",
            DriveMode::Always => "always",
            DriveMode::Manual => "manual",
        };
        let status = row.status.map_or("-", |s| s.as_str());
        let next_run = match row.next_run {
            Some(at) if at > now => format!("in {}", format_duration(at - now)),
            Some(_) => "due".to_string(),
            None => "-".to_string(),
        };
        let _ = write!(
            out,
            "{:<width$}  {:<6}  {:<27}  {:<11}  {:>6}  {}",
            row.name,
            mode,
            row.phase.as_str(),
            status,
            row.error_runs,
            next_run
        );
        if let Some(message) = &row.message {
            let _ = write!(out, "  ({message})");
        }
        out.push('\n');
    }
    out
}
