//! Single-owner fan-out hub for container stats.
//!
//! ```text
//! poller ──► stats / errors ──► serve() ──try_send──► listener 1
//!                                  ▲        ├──────► listener 2
//! subscribe / cancel ── commands ──┘        └──────► listener N
//! ```
//!
//! The listener list is owned by the `serve` task alone. Registration, removal and
//! broadcasts all arrive as messages, so the list needs no lock.
//!
//! Delivery is drop-if-slow: a listener whose channel is still full misses the event.
//! Events are never reordered for a listener.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{Error, Result, StatsBatch};
use crate::runtime;

/// Buffer of each listener channel. A listener holding an unread event is "not ready".
const LISTENER_CAPACITY: usize = 1;

const COMMAND_CAPACITY: usize = 16;

/// Identifies one subscription of a [`StatsBroadcaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receive ends of one registered consumer.
///
/// Both channels yield `None` once the subscription was cancelled or the broadcaster
/// shut down.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    pub stats: mpsc::Receiver<StatsBatch>,
    pub errors: mpsc::Receiver<runtime::Error>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

enum Command {
    Subscribe {
        reply: oneshot::Sender<Subscription>,
    },
    Cancel {
        id: SubscriptionId,
        reply: oneshot::Sender<()>,
    },
}

struct Listener {
    id: SubscriptionId,
    stats: mpsc::Sender<StatsBatch>,
    errors: mpsc::Sender<runtime::Error>,
}

/// Handle to the fan-out hub. Cheap to clone; all clones talk to the same hub.
#[derive(Debug, Clone)]
pub struct StatsBroadcaster {
    commands: mpsc::Sender<Command>,
}

impl StatsBroadcaster {
    /// Spawns the hub serving `stats` and `errors` until `token` is cancelled or either
    /// upstream channel closes.
    pub fn new(
        token: CancellationToken,
        stats: mpsc::Receiver<StatsBatch>,
        errors: mpsc::Receiver<runtime::Error>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let hub = Hub {
            token,
            stats,
            errors,
            commands: commands_rx,
            listeners: Vec::new(),
            next_id: 0,
        };
        tokio::spawn(hub.serve());
        Self {
            commands: commands_tx,
        }
    }

    /// Registers a new consumer. Returns once the hub acknowledged the registration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BroadcasterClosed`] if the hub has shut down.
    pub async fn subscribe(&self) -> Result<Subscription> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Subscribe { reply })
            .await
            .map_err(|_| Error::BroadcasterClosed)?;
        rx.await.map_err(|_| Error::BroadcasterClosed)
    }

    /// Deregisters a subscription and closes both of its channels.
    ///
    /// Once this returns the hub will not deliver anything further to the subscription.
    /// Unknown or already cancelled ids are ignored, as is a shut down hub.
    pub async fn cancel_subscription(&self, id: SubscriptionId) {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Cancel { id, reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

struct Hub {
    token: CancellationToken,
    stats: mpsc::Receiver<StatsBatch>,
    errors: mpsc::Receiver<runtime::Error>,
    commands: mpsc::Receiver<Command>,
    listeners: Vec<Listener>,
    next_id: u64,
}

impl Hub {
    async fn serve(mut self) {
        log::debug!("Starting stats broadcaster");
        let mut accepting = true;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                command = self.commands.recv(), if accepting => match command {
                    Some(command) => self.handle_command(command),
                    // every broadcaster handle is gone, existing listeners keep receiving
                    None => accepting = false,
                },
                batch = self.stats.recv() => match batch {
                    Some(batch) => self.broadcast_stats(batch),
                    None => break,
                },
                err = self.errors.recv() => match err {
                    Some(err) => self.broadcast_error(err),
                    None => break,
                },
            }
        }

        log::debug!(
            "Stopping stats broadcaster, closing {} listeners",
            self.listeners.len()
        );
        // dropping the senders closes every listener channel
        self.listeners.clear();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe { reply } => {
                let id = SubscriptionId(self.next_id);
                self.next_id += 1;
                let (stats_tx, stats_rx) = mpsc::channel(LISTENER_CAPACITY);
                let (errors_tx, errors_rx) = mpsc::channel(LISTENER_CAPACITY);
                let subscription = Subscription {
                    id,
                    stats: stats_rx,
                    errors: errors_rx,
                };
                if reply.send(subscription).is_ok() {
                    self.listeners.push(Listener {
                        id,
                        stats: stats_tx,
                        errors: errors_tx,
                    });
                    log::trace!("Added stats listener {:?}", id);
                }
            }
            Command::Cancel { id, reply } => {
                if let Some(pos) = self.listeners.iter().position(|l| l.id == id) {
                    self.listeners.swap_remove(pos);
                    log::trace!("Removed stats listener {:?}", id);
                }
                let _ = reply.send(());
            }
        }
    }

    fn broadcast_stats(&mut self, batch: StatsBatch) {
        self.listeners
            .retain(|listener| match listener.stats.try_send(batch.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::trace!("Stats listener {:?} not ready, skipping", listener.id);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
    }

    fn broadcast_error(&mut self, err: runtime::Error) {
        self.listeners
            .retain(|listener| match listener.errors.try_send(err.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::trace!("Error listener {:?} not ready, skipping", listener.id);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
    }
}
