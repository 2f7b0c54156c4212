use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{ExitResult, TaskHandle, TaskState};
use crate::config::clamp_interval;

impl TaskHandle {
    /// Polls the handle every `exit_poll_interval` and sends the exit result on `exit_tx`
    /// as soon as the container exited.
    ///
    /// If `token` is cancelled first, `exit_tx` is dropped without a value.
    pub async fn run_exit_watcher(
        &self,
        exit_tx: oneshot::Sender<ExitResult>,
        token: &CancellationToken,
    ) {
        log::debug!("Starting exit watcher for `{}`", self.container_id);
        let mut ticker =
            tokio::time::interval(clamp_interval(self.settings.exit_poll_interval));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let Some(result) = self.exited_result() {
                if exit_tx.send(result).is_err() {
                    log::debug!(
                        "Exit result receiver of `{}` is gone",
                        self.container_id
                    );
                }
                break;
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
        }

        log::debug!("Stopping exit watcher for `{}`", self.container_id);
    }

    /// Reads state and result in one critical section.
    fn exited_result(&self) -> Option<ExitResult> {
        let state = self.read();
        match state.state {
            TaskState::Running => None,
            TaskState::Exited => state.exit_result.clone(),
        }
    }
}
