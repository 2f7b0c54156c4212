//! Fan-out of container stats and conversion into orchestrator-facing usage records.
//!
//! # Key Components
//!
//! - [`StatsBroadcaster`]: multiplexes one upstream stats poller to any number of
//!   [`Subscription`]s without ever blocking on a slow consumer.
//! - [`Tracker`]: turns cumulative CPU counters into percent-of-period values.
//! - [`TaskResourceUsage`]: the usage record emitted to the orchestrator.

mod broadcaster;
pub mod cpu;
mod usage;

use std::sync::Arc;

pub use broadcaster::{StatsBroadcaster, Subscription, SubscriptionId};
pub use cpu::Tracker;
pub use usage::{CpuStats, MemoryStats, ResourceUsage, TaskResourceUsage};

use crate::runtime::ContainerStats;

/// One poll result: the stats of every running container.
pub type StatsBatch = Arc<[ContainerStats]>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("stats broadcaster is shut down")]
    BroadcasterClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
