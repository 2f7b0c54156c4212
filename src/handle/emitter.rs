use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::TaskHandle;
use crate::config::clamp_interval;
use crate::stats::{TaskResourceUsage, Tracker};

impl TaskHandle {
    /// Emits one usage record built from the last cached stats every `interval`.
    ///
    /// A zero `interval` is raised to the shortest supported ticker period.
    ///
    /// Sending waits for the receiver, so a slow consumer delays later records instead of
    /// losing them. Returns when `token` is cancelled or the receiver is dropped.
    pub async fn run_stats_emitter(
        &self,
        usage_tx: mpsc::Sender<TaskResourceUsage>,
        interval: Duration,
        token: &CancellationToken,
    ) {
        let interval = clamp_interval(interval);
        log::debug!(
            "Starting stats emitter for `{}` every {:?}",
            self.container_id,
            interval
        );
        self.set_collection_interval(interval);

        let ticks = self.settings.total_ticks();
        let mut total = Tracker::new(ticks);
        let mut system = Tracker::new(ticks);

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let usage = TaskResourceUsage::from_stats(
                self.last_stats().as_ref(),
                &mut total,
                &mut system,
                SystemTime::now(),
            );
            tokio::select! {
                _ = token.cancelled() => break,
                sent = usage_tx.send(usage) => {
                    if sent.is_err() {
                        log::debug!("Usage receiver of `{}` is gone", self.container_id);
                        break;
                    }
                }
            }
        }

        log::debug!("Stopping stats emitter for `{}`", self.container_id);
    }
}
