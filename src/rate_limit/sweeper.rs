//! Background removal of expired window entries.

use super::fixed_window::FixedWindowLimiter;
use super::store::WindowStore;
use crate::clock::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default pause between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Handle to a running sweep task.
///
/// Sweeping only bounds memory; checks already ignore expired entries.
/// Dropping the handle aborts the task, [`Sweeper::stop`] shuts it down
/// gracefully.
#[derive(Debug)]
pub struct Sweeper {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn a sweep every `interval` on the current tokio runtime.
    ///
    /// Panics if called outside a runtime or with a zero interval.
    pub fn start<C, S>(limiter: Arc<FixedWindowLimiter<C, S>>, interval: Duration) -> Self
    where
        C: Clock + 'static,
        S: WindowStore + 'static,
    {
        assert!(interval > Duration::ZERO, "sweep interval must be non-zero");
        let (shutdown, mut stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            tracing::info!(removed, remaining = limiter.store().len(), "swept expired rate limit entries");
                        }
                    }
                    _ = &mut stopped => break,
                }
            }
        });

        tracing::info!(interval_ms = interval.as_millis() as u64, "rate limit sweeper started");
        Self { shutdown: Some(shutdown), task: Some(task) }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop sweeping and wait for the task to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::info!("rate limit sweeper stopped");
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
