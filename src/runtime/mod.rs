//! Abstraction over the container runtime the supervisor talks to.
//!
//! The supervisor never speaks the runtime's wire protocol itself. It only needs the
//! four operations of [`ContainerRuntime`]:
//!
//! - [`ContainerRuntime::poll_all_stats`]: one batch of stats for every running container,
//!   driven in the background by [`spawn_stats_poller`];
//! - [`ContainerRuntime::container_stats`]: a direct probe of a single container;
//! - [`ContainerRuntime::container_inspect`]: post-mortem state (exit code, OOM flag, ...);
//! - [`ContainerRuntime::container_logs`]: forwards container output until the stream
//!   ends or breaks.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{Settings, clamp_interval};
use crate::container::ContainerID;
use crate::stats::{StatsBatch, StatsBroadcaster};

mod error;
mod models;
#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use models::{ContainerStats, InspectData};

/// Delay before the first upstream poll.
const FIRST_POLL_DELAY: Duration = Duration::from_secs(1);

/// Operations the supervisor consumes from the container runtime.
///
/// Implementations are shared between the background workers of a handle, hence the
/// `Send + Sync + 'static` bound.
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Polls the stats of all running containers at once.
    fn poll_all_stats(&self) -> impl Future<Output = Result<Vec<ContainerStats>>> + Send;

    /// Fetches the stats of a single container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContainerNotFound`] or [`Error::ContainerWrongState`] once the
    /// container stopped, any other variant for transient failures.
    fn container_stats(
        &self,
        container_id: &ContainerID,
    ) -> impl Future<Output = Result<ContainerStats>> + Send;

    /// Inspects a (stopped) container.
    fn container_inspect(
        &self,
        container_id: &ContainerID,
    ) -> impl Future<Output = Result<InspectData>> + Send;

    /// Streams the container output emitted after `since` into the two sinks.
    ///
    /// Resolves with `Ok(())` once the stream ended cleanly and with an error if it was
    /// interrupted.
    fn container_logs<W>(
        &self,
        container_id: &ContainerID,
        since: SystemTime,
        stdout: &mut W,
        stderr: &mut W,
    ) -> impl Future<Output = Result<()>> + Send
    where
        W: AsyncWrite + Unpin + Send;
}

/// Starts polling `runtime` for container stats every `stats_poll_interval` of
/// `settings` and returns the broadcaster that fans the results out.
///
/// Both the poller and the broadcaster stop once `token` is cancelled.
pub fn spawn_stats_poller<R: ContainerRuntime>(
    runtime: Arc<R>,
    settings: &Settings,
    token: CancellationToken,
) -> StatsBroadcaster {
    let interval = clamp_interval(settings.stats_poll_interval);
    let (stats_tx, stats_rx) = mpsc::channel::<StatsBatch>(1);
    let (err_tx, err_rx) = mpsc::channel::<Error>(1);
    tokio::spawn(poll_stats(runtime, interval, token.clone(), stats_tx, err_tx));
    StatsBroadcaster::new(token, stats_rx, err_rx)
}

async fn poll_stats<R: ContainerRuntime>(
    runtime: Arc<R>,
    interval: Duration,
    token: CancellationToken,
    stats_tx: mpsc::Sender<StatsBatch>,
    err_tx: mpsc::Sender<Error>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + FIRST_POLL_DELAY, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::debug!("Starting container stats poller (interval={:?})", interval);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let polled = tokio::select! {
            _ = token.cancelled() => break,
            polled = runtime.poll_all_stats() => polled,
        };

        match polled {
            Ok(stats) => {
                log::trace!("Polled stats of {} containers", stats.len());
                // the hub may be busy; a dropped batch is superseded by the next poll
                if let Err(mpsc::error::TrySendError::Closed(_)) = stats_tx.try_send(stats.into())
                {
                    break;
                }
            }
            Err(err) => {
                log::error!("Error getting container stats: {}", err);
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = err_tx.send(err) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    log::debug!("Stopping container stats poller");
}
