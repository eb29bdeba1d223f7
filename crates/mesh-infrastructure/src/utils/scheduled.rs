//! Recurring background tasks
//!
//! A [`ScheduledTask`] runs an async job on a fixed interval until stopped.
//! Job errors and panics are logged and the schedule continues; stopping
//! waits for a sweep that is already running to finish.

use futures::FutureExt;
use mesh_domain::error::Result;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Handle to a recurring job
pub struct ScheduledTask {
    name: String,
    period: Duration,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledTask {
    /// Spawn `job` every `period`, starting immediately
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(name: impl Into<String>, period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        match AssertUnwindSafe(job()).catch_unwind().await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => warn!(task = %task_name, error = %e, "Scheduled task failed"),
                            Err(_) => error!(task = %task_name, "Scheduled task panicked"),
                        }
                    }
                }
            }
            debug!(task = %task_name, "Scheduled task stopped");
        });

        debug!(task = %name, period_ms = period.as_millis(), "Scheduled task started");

        Self {
            name,
            period,
            token,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// True until [`stop`](Self::stop) is called
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Cancel the schedule and wait for any in-flight run to complete
    pub async fn stop(&self) {
        self.token.cancel();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(task = %self.name, error = %e, "Scheduled task ended abnormally");
            }
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
