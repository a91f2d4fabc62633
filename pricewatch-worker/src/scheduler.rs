/// Fixed-interval batch scheduler
///
/// Runs a [`BatchJob`] once at startup and then every `interval`. The next
/// batch only starts after the previous one has returned; ticks missed while
/// a slow batch was running are skipped rather than replayed, so batches
/// never overlap or pile up.
///
/// # Example
///
/// ```no_run
/// use pricewatch_worker::scheduler::Scheduler;
/// use pricewatch_worker::scan::ProductScanner;
/// use std::time::Duration;
///
/// # async fn example(scanner: ProductScanner) {
/// let scheduler = Scheduler::new(scanner, Duration::from_secs(3600));
/// let shutdown = scheduler.shutdown_token();
///
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     shutdown.cancel();
/// });
///
/// scheduler.run().await;
/// # }
/// ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Work performed on every tick
#[async_trait]
pub trait BatchJob: Send + Sync {
    /// Runs one batch; should return early once `cancel` fires
    async fn run_batch(&self, cancel: &CancellationToken);
}

pub struct Scheduler<J> {
    job: J,
    interval: Duration,
    shutdown_token: CancellationToken,
}

impl<J: BatchJob> Scheduler<J> {
    pub fn new(job: J, interval: Duration) -> Self {
        Self {
            job,
            interval,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token that stops the loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs until the shutdown token is cancelled
    pub async fn run(&self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler starting");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut batches: u64 = 0;

        loop {
            // The first tick completes immediately.
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            batches += 1;
            tracing::debug!(batch = batches, "Batch starting");
            self.job.run_batch(&self.shutdown_token).await;

            if self.shutdown_token.is_cancelled() {
                break;
            }
        }

        tracing::info!(batches, "Scheduler stopped");
    }
}
