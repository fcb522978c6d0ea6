//! Periodic refresh of device state from the bus.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::service::telegram_queue::TelegramQueue;
use crate::service::value_reader::DEFAULT_READ_TIMEOUT;

/// Delay before the first sync
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);
/// Interval between syncs
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(3600);

/// Reads all device state addresses in periodic cycles.
#[derive(Debug)]
pub struct StateUpdater {
    start_timeout: Duration,
    timeout: Duration,
    read_timeout: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StateUpdater {
    /// Updater with the default timings.
    pub fn new() -> Self {
        Self::with_timing(DEFAULT_START_TIMEOUT, DEFAULT_SYNC_INTERVAL)
    }

    /// Updater waiting `start_timeout` before the first sync and `timeout`
    /// between syncs.
    pub fn with_timing(start_timeout: Duration, timeout: Duration) -> Self {
        Self {
            start_timeout,
            timeout,
            read_timeout: DEFAULT_READ_TIMEOUT,
            task: Mutex::new(None),
        }
    }

    /// Check whether the sync task is running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Spawn the sync task for the devices of `queue`.
    pub fn start(&self, queue: Arc<TelegramQueue>) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }

        let (start_timeout, timeout, read_timeout) = (self.start_timeout, self.timeout, self.read_timeout);
        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(start_timeout).await;
            knx_log!(debug, "Starting StateUpdater");
            loop {
                queue.devices().sync(&queue, read_timeout).await;
                tokio::time::sleep(timeout).await;
            }
        }));
    }

    /// Cancel the sync task.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            knx_log!(debug, "Stopping StateUpdater");
            task.abort();
        }
    }
}

impl Default for StateUpdater {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StateUpdater {
    fn drop(&mut self) {
        self.stop();
    }
}
