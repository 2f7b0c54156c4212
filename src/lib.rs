//! Creo Supervisor: supervision of containers started on behalf of a workload orchestrator.
//!
//! This library tracks the lifecycle of running containers, forwards their output,
//! detects their termination and reports their resource usage. One upstream stats poll
//! per host is fanned out to every supervised container through a
//! [`stats::StatsBroadcaster`]; each container is represented by a [`handle::TaskHandle`].
//!
//! The container runtime itself is abstracted behind [`runtime::ContainerRuntime`].

pub mod config;
pub mod container;
pub mod error;
pub mod handle;
pub mod runtime;
pub mod stats;
pub mod store;

pub use config::{HandleConfig, Settings};
pub use container::{ContainerID, TaskID};
pub use handle::{ExitError, ExitResult, TaskHandle, TaskState, TaskStatus};
pub use runtime::{ContainerRuntime, spawn_stats_poller};
pub use stats::{StatsBroadcaster, Subscription, TaskResourceUsage};
pub use store::TaskStore;
