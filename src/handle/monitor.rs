use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use super::{ExitError, ExitResult, TaskHandle};
use crate::container::ContainerID;
use crate::runtime::{self, ContainerRuntime, InspectData};
use crate::stats::{StatsBatch, StatsBroadcaster};

impl TaskHandle {
    /// Watches the stats broadcast until the container is gone, then records its exit.
    ///
    /// Stats entries of this container are cached for the stats emitter. A broadcast
    /// error alone does not end the container: it is probed directly and only a
    /// "not found" or "wrong state" answer counts as termination. Without a broadcaster
    /// the container stays unmonitored.
    pub async fn run_container_monitor<R: ContainerRuntime>(
        &self,
        runtime: &R,
        broadcaster: Option<&StatsBroadcaster>,
        token: &CancellationToken,
    ) {
        let Some(broadcaster) = broadcaster else {
            log::warn!(
                "No container stats broadcaster available, not starting monitor for container `{}`",
                self.container_id
            );
            return;
        };
        let mut subscription = match broadcaster.subscribe().await {
            Ok(subscription) => subscription,
            Err(err) => {
                log::warn!(
                    "Failed to subscribe to container stats, not starting monitor for container `{}`: {}",
                    self.container_id,
                    err
                );
                return;
            }
        };
        log::debug!("Starting container monitor for `{}`", self.container_id);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                batch = subscription.stats.recv() => match batch {
                    Some(batch) => self.cache_own_stats(&batch),
                    None => {
                        log::debug!("Container stats broadcaster closed");
                        break;
                    }
                },
                err = subscription.errors.recv() => match err {
                    Some(err) => {
                        log::warn!("Error from container stats broadcaster: {}", err);
                        if self.probe_exit(runtime, token).await {
                            break;
                        }
                    }
                    None => {
                        log::debug!("Container stats broadcaster closed");
                        break;
                    }
                },
            }
        }

        broadcaster.cancel_subscription(subscription.id()).await;
        log::debug!("Stopping container monitor for `{}`", self.container_id);
    }

    fn cache_own_stats(&self, batch: &StatsBatch) {
        if let Some(stats) = batch
            .iter()
            .find(|stats| stats.container_id == self.container_id)
        {
            self.cache_stats(stats.clone());
        }
    }

    /// Probes the container after a broadcast error. Returns `true` once the container
    /// exited (or the monitor was cancelled while probing).
    async fn probe_exit<R: ContainerRuntime>(&self, runtime: &R, token: &CancellationToken) -> bool {
        let probe = tokio::select! {
            _ = token.cancelled() => return true,
            probe = runtime.container_stats(&self.container_id) => probe,
        };

        match probe {
            Ok(_) => false,
            Err(err) if err.is_gone() => {
                log::debug!(
                    "Container `{}` is not running anymore: {}",
                    self.container_id,
                    err
                );
                let inspected = tokio::select! {
                    _ = token.cancelled() => return true,
                    inspected = runtime.container_inspect(&self.container_id) => inspected,
                };
                let (result, completed_at) = resolve_exit(&self.container_id, inspected);
                if !self.mark_exited(result, completed_at) {
                    log::warn!("Container `{}` already marked as exited", self.container_id);
                }
                true
            }
            Err(err) => {
                log::debug!("Could not get container stats, unknown error: {:?}", err);
                false
            }
        }
    }
}

/// Derives the exit result and completion time of a dead container from its inspection.
///
/// An out-of-memory kill overrides any error text the runtime reported.
pub fn resolve_exit(
    container_id: &ContainerID,
    inspected: runtime::Result<InspectData>,
) -> (ExitResult, SystemTime) {
    match inspected {
        Err(err) => {
            log::error!(
                "Failed to inspect stopped container `{}`, can not get exit code: {}",
                container_id,
                err
            );
            let result = ExitResult {
                signal: 0,
                err: Some(ExitError::InspectFailed {
                    container_id: container_id.clone(),
                    reason: err.to_string(),
                }),
                ..ExitResult::default()
            };
            (result, SystemTime::now())
        }
        Ok(data) => {
            let mut result = ExitResult {
                exit_code: data.exit_code,
                signal: data.signal,
                oom_killed: false,
                err: None,
            };
            if !data.error.is_empty() {
                log::error!("Container `{}` error: {}", container_id, data.error);
                result.err = Some(ExitError::Runtime(data.error));
            }
            if data.oom_killed {
                log::error!("Container `{}` killed by OOM killer", container_id);
                result.oom_killed = true;
                result.err = Some(ExitError::OomKilled);
            }
            (result, data.finished_at)
        }
    }
}
