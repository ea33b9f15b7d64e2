//! Periodic display refresh.
//!
//! One [`RefreshTask`] per running instrument. The task ticks immediately,
//! then every `period`, until stopped or dropped.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a repeating refresh task. Dropping it cancels the task.
#[derive(Debug)]
pub struct RefreshTask {
    name: &'static str,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshTask {
    /// Spawn a task calling `tick` now and then every `period`.
    ///
    /// Must be called inside a Tokio runtime. Missed ticks are skipped
    /// rather than replayed in a burst.
    pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let period = period.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => tick(),
                    _ = &mut shutdown_rx => break,
                }
            }
            tracing::debug!(task = name, "Refresh task stopped");
        });
        tracing::debug!(task = name, period_ms = period.as_millis() as u64, "Refresh task started");

        Self {
            name,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Task label used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True until the task has been stopped.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task and wait until it has exited, so no tick runs afterwards.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(task = self.name, error = %e, "Refresh task ended abnormally");
            }
        }
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_immediately_then_every_period() {
        let (count, tick) = counter();
        let task = RefreshTask::spawn("test", Duration::from_millis(100), tick);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_ticks() {
        let (count, tick) = counter();
        let task = RefreshTask::spawn("test", Duration::from_millis(50), tick);
        tokio::time::sleep(Duration::from_millis(120)).await;
        task.stop().await;

        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_task() {
        let (count, tick) = counter();
        let task = RefreshTask::spawn("test", Duration::from_millis(50), tick);
        assert!(task.is_running());
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(task);

        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }
}
