//! Daemon command hosting the renewal drive.
//!
//! The drive runs as a single watchdog task. Ctrl-C stops it after a final
//! notification pass.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use miette::Result;
use tokio::sync::watch;
use tracing::{error, info};

use mdrive_scheduler::{DriveContext, Driver, ProcessRunner, SystemClock, Watchdog};
use mdrive_store::FsStore;

use crate::config::Config;
use crate::renewer::CommandRenewer;

/// Name of the watchdog running the drive.
const WATCHDOG_NAME: &str = "_mdrive_";

pub async fn run(config: Config, store_dir: PathBuf) -> Result<()> {
    let renew_cmd = config
        .renew_cmd
        .as_deref()
        .ok_or_else(|| miette::miette!("no renew_cmd configured"))?;

    let store = FsStore::new(&store_dir);
    let registry = config
        .registry(&store, Utc::now())
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    info!(
        store_dir = %store_dir.display(),
        domains = registry.iter().count(),
        "starting mdrive daemon"
    );

    let driver = Driver::new(
        Arc::new(registry),
        Arc::new(store.clone()),
        Arc::new(CommandRenewer::new(renew_cmd, store)),
        Arc::new(SystemClock),
    );
    let Some(context) =
        DriveContext::start(driver, Arc::new(ProcessRunner), config.drive_config()).await
    else {
        info!("nothing to drive, exiting");
        return Ok(());
    };

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let handle = match Watchdog::new(WATCHDOG_NAME).spawn(context, shutdown_rx) {
        Ok(handle) => handle,
        Err(e) => {
            error!(
                error = %e,
                critical = true,
                code = 1013,
                "init drive watchdog failed, certificate renewal disabled"
            );
            return Ok(());
        }
    };

    handle
        .await
        .map_err(|e| miette::miette!("drive watchdog failed: {}", e))?;
    info!("mdrive daemon stopped");
    Ok(())
}
