use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::error::EtherError;

/// Longest single sleep handed to the Tokio timer; longer delays are chained
const MAX_SLEEP_STEP: Duration = Duration::from_secs(365 * 24 * 60 * 60);

async fn sleep_for(delay: Duration) {
    let mut remaining = delay;
    while !remaining.is_zero() {
        let step = remaining.min(MAX_SLEEP_STEP);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
}

/// One-shot delayed callbacks on a Tokio runtime.
///
/// Each scheduled callback runs on its own spawned task. There is no
/// per-timer cancellation: callers make their callbacks safe to fire late.
/// Shutting the service down (explicitly or by dropping it) stops every
/// timer that has not fired yet.
pub(crate) struct TimerService {
    runtime: Option<Handle>,
    /// Sender to signal shutdown to pending timers
    shutdown_tx: watch::Sender<bool>,
}

impl TimerService {
    /// Creates a timer service, remembering the current runtime if there is one.
    ///
    /// Each `schedule` call prefers the runtime current at that point and
    /// only falls back to the remembered one when called outside a runtime.
    pub(crate) fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            runtime: Handle::try_current().ok(),
            shutdown_tx,
        }
    }

    /// Runs `callback` once after `delay`, without blocking the caller.
    ///
    /// # Errors
    ///
    /// - `EtherError::TimerShutdown` if the service has been shut down
    /// - `EtherError::TimerUnavailable` if no runtime is reachable
    pub(crate) fn schedule<F>(&self, delay: Duration, callback: F) -> Result<(), EtherError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(EtherError::TimerShutdown);
        }

        let runtime = match (Handle::try_current(), &self.runtime) {
            (Ok(current), _) => current,
            (Err(_), Some(remembered)) => remembered.clone(),
            (Err(_), None) => return Err(EtherError::TimerUnavailable),
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        runtime.spawn(async move {
            tokio::select! {
                _ = sleep_for(delay) => callback(),
                _ = shutdown_rx.changed() => {}
            }
        });

        Ok(())
    }

    /// Stops every pending timer; later `schedule` calls fail
    pub(crate) fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        // Signal pending timers to stop when the service is dropped
        self.shutdown();
    }
}
