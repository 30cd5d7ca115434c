//! Periodic callback facility hosting the drive loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::SchedulerError;

/// Lifecycle signal passed to a watchdog callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// First call, before any running tick.
    Starting,
    /// Regular tick.
    Running,
    /// Last call, the watchdog is shutting down.
    Stopping,
}

/// Lets a callback reprogram when it is invoked next.
#[derive(Debug, Clone)]
pub struct WatchdogHandle {
    interval_tx: Arc<watch::Sender<Duration>>,
}

impl WatchdogHandle {
    /// Fire the next running tick after `delay`.
    pub fn set_interval(&self, delay: Duration) {
        self.interval_tx.send_replace(delay);
    }

    /// Currently programmed interval.
    pub fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }
}

/// Receives watchdog ticks.
#[async_trait]
pub trait WatchdogCallback: Send {
    async fn on_watchdog(&mut self, state: WatchState, watchdog: &WatchdogHandle);
}

/// A named single-task timer that invokes one callback.
///
/// The callback runs with [`WatchState::Starting`], then with
/// [`WatchState::Running`] immediately and again after every programmed
/// interval, and finally with [`WatchState::Stopping`] once shutdown is
/// signalled.
pub struct Watchdog {
    name: String,
    handle: WatchdogHandle,
    interval_rx: watch::Receiver<Duration>,
}

impl Watchdog {
    pub fn new(name: impl Into<String>) -> Self {
        let (interval_tx, interval_rx) = watch::channel(Duration::ZERO);
        Self {
            name: name.into(),
            handle: WatchdogHandle {
                interval_tx: Arc::new(interval_tx),
            },
            interval_rx,
        }
    }

    pub fn handle(&self) -> WatchdogHandle {
        self.handle.clone()
    }

    /// Run the watchdog on the current tokio runtime.
    ///
    /// Fails when called outside a runtime. The join handle yields the
    /// callback back once the watchdog has stopped.
    pub fn spawn<C>(
        self,
        callback: C,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<JoinHandle<C>, SchedulerError>
    where
        C: WatchdogCallback + 'static,
    {
        let runtime =
            Handle::try_current().map_err(|e| SchedulerError::WatchdogUnavailable(e.to_string()))?;
        Ok(runtime.spawn(self.run(callback, shutdown_rx)))
    }

    /// Drive `callback` until shutdown is signalled or its sender dropped.
    pub async fn run<C>(mut self, mut callback: C, mut shutdown_rx: watch::Receiver<bool>) -> C
    where
        C: WatchdogCallback,
    {
        info!(watchdog = %self.name, "watchdog starting");
        callback
            .on_watchdog(WatchState::Starting, &self.handle)
            .await;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            callback
                .on_watchdog(WatchState::Running, &self.handle)
                .await;
            let wait = *self.interval_rx.borrow_and_update();
            debug!(watchdog = %self.name, wait_ms = wait.as_millis() as u64, "watchdog sleeping");

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = sleep(wait) => {}
            }
        }

        callback
            .on_watchdog(WatchState::Stopping, &self.handle)
            .await;
        info!(watchdog = %self.name, "watchdog stopped");
        callback
    }
}
