//! Supervision of a single running container.
//!
//! A [`TaskHandle`] is the one shared state record of a container. Four background
//! loops work on it:
//!
//! - the container monitor ([`TaskHandle::run_container_monitor`]) caches stats from
//!   the broadcaster and detects termination;
//! - the log streamer ([`TaskHandle::run_log_streamer`]) forwards container output;
//! - the exit watcher ([`TaskHandle::run_exit_watcher`]) delivers the exit result once;
//! - the stats emitter ([`TaskHandle::run_stats_emitter`]) produces usage records.
//!
//! All fields live behind one lock that is never held across an `.await`. Readers copy
//! values out instead of keeping references.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{HandleConfig, Settings};
use crate::container::{ContainerID, TaskID};
use crate::runtime::{ContainerRuntime, ContainerStats};
use crate::stats::{StatsBroadcaster, TaskResourceUsage};

mod emitter;
mod exit;
pub mod logs;
mod monitor;

pub use monitor::resolve_exit;

/// Capacity of the usage channel handed out by [`TaskHandle::usage_stream`].
const USAGE_CHANNEL_CAPACITY: usize = 1;

/// Lifecycle state of a supervised container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Exited,
}

/// Error attached to an [`ExitResult`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExitError {
    #[error("Driver was unable to get the exit code. {container_id}: {reason}")]
    InspectFailed {
        container_id: ContainerID,
        reason: String,
    },
    #[error("{0}")]
    Runtime(String),
    #[error("container killed by OOM killer")]
    OomKilled,
}

impl serde::Serialize for ExitError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Final disposition of a terminated container.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExitResult {
    pub exit_code: i32,
    pub signal: i32,
    pub oom_killed: bool,
    pub err: Option<ExitError>,
}

impl ExitResult {
    pub fn successful(&self) -> bool {
        self.exit_code == 0 && self.signal == 0 && self.err.is_none()
    }
}

/// Consistent snapshot of a handle, as returned by [`TaskHandle::status`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TaskStatus {
    pub id: TaskID,
    pub name: String,
    pub state: TaskState,
    pub started_at: SystemTime,
    pub completed_at: Option<SystemTime>,
    pub exit_result: Option<ExitResult>,
    pub driver_attributes: HashMap<String, String>,
}

#[derive(Debug)]
struct HandleState {
    state: TaskState,
    started_at: SystemTime,
    completed_at: Option<SystemTime>,
    log_pointer: SystemTime,
    /// `Some` exactly when `state` is [`TaskState::Exited`].
    exit_result: Option<ExitResult>,
    container_stats: Option<ContainerStats>,
    collection_interval: Option<Duration>,
}

/// Shared state record of one supervised container.
#[derive(Debug)]
pub struct TaskHandle {
    container_id: ContainerID,
    config: HandleConfig,
    settings: Settings,
    state: RwLock<HandleState>,
}

impl TaskHandle {
    /// Creates a handle for a container that is running since `started_at`.
    pub fn new(
        container_id: ContainerID,
        config: HandleConfig,
        settings: Settings,
        started_at: SystemTime,
    ) -> Self {
        Self {
            container_id,
            config,
            settings,
            state: RwLock::new(HandleState {
                state: TaskState::Running,
                started_at,
                completed_at: None,
                log_pointer: started_at,
                exit_result: None,
                container_stats: None,
                collection_interval: None,
            }),
        }
    }

    pub fn container_id(&self) -> &ContainerID {
        &self.container_id
    }

    pub fn config(&self) -> &HandleConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns a snapshot of the handle. Safe to call concurrently with every loop.
    pub fn status(&self) -> TaskStatus {
        let state = self.read();
        TaskStatus {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            state: state.state,
            started_at: state.started_at,
            completed_at: state.completed_at,
            exit_result: state.exit_result.clone(),
            driver_attributes: HashMap::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.read().state == TaskState::Running
    }

    /// Returns the exit result once the container has exited.
    pub fn exit_result(&self) -> Option<ExitResult> {
        self.read().exit_result.clone()
    }

    /// Returns the point from which container output is (re)streamed.
    pub fn log_pointer(&self) -> SystemTime {
        self.read().log_pointer
    }

    /// Returns the most recent stats sample of this container, if any arrived yet.
    pub fn last_stats(&self) -> Option<ContainerStats> {
        self.read().container_stats.clone()
    }

    /// Returns the interval the stats emitter was started with.
    pub fn collection_interval(&self) -> Option<Duration> {
        self.read().collection_interval
    }

    fn read(&self) -> RwLockReadGuard<'_, HandleState> {
        // every writer leaves the record consistent, a panic elsewhere does not corrupt it
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HandleState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_stats(&self, stats: ContainerStats) {
        self.write().container_stats = Some(stats);
    }

    fn set_collection_interval(&self, interval: Duration) {
        self.write().collection_interval = Some(interval);
    }

    /// Moves the log pointer forward to `to`; the pointer never goes back.
    fn advance_log_pointer(&self, to: SystemTime) -> SystemTime {
        let mut state = self.write();
        if to > state.log_pointer {
            state.log_pointer = to;
        }
        state.log_pointer
    }

    /// Transitions to [`TaskState::Exited`] with `result` in one critical section.
    ///
    /// Returns `false` without touching the record if the container already exited.
    fn mark_exited(&self, result: ExitResult, completed_at: SystemTime) -> bool {
        let mut state = self.write();
        if state.state == TaskState::Exited {
            return false;
        }
        state.exit_result = Some(result);
        state.completed_at = Some(completed_at);
        state.state = TaskState::Exited;
        true
    }

    /// Spawns the container monitor.
    pub fn spawn_container_monitor<R: ContainerRuntime>(
        self: &Arc<Self>,
        runtime: Arc<R>,
        broadcaster: Option<StatsBroadcaster>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let handle = Arc::clone(self);
        tokio::spawn(async move {
            handle
                .run_container_monitor(runtime.as_ref(), broadcaster.as_ref(), &token)
                .await
        })
    }

    /// Spawns the log streamer writing into the given sinks.
    pub fn spawn_log_streamer<R, W>(
        self: &Arc<Self>,
        runtime: Arc<R>,
        stdout: W,
        stderr: W,
        token: CancellationToken,
    ) -> JoinHandle<()>
    where
        R: ContainerRuntime,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let handle = Arc::clone(self);
        tokio::spawn(async move {
            handle
                .run_log_streamer(runtime.as_ref(), stdout, stderr, &token)
                .await
        })
    }

    /// Spawns the exit watcher and returns the channel the exit result arrives on.
    ///
    /// The channel yields exactly one value, or an error if `token` was cancelled before
    /// the container exited.
    pub fn wait_exit(self: &Arc<Self>, token: CancellationToken) -> oneshot::Receiver<ExitResult> {
        let (tx, rx) = oneshot::channel();
        let handle = Arc::clone(self);
        tokio::spawn(async move { handle.run_exit_watcher(tx, &token).await });
        rx
    }

    /// Spawns a stats emitter producing one usage record every `interval`, or every
    /// `stats_interval` of the settings if the orchestrator gives none.
    pub fn usage_stream(
        self: &Arc<Self>,
        interval: Option<Duration>,
        token: CancellationToken,
    ) -> mpsc::Receiver<TaskResourceUsage> {
        let interval = interval.unwrap_or(self.settings.stats_interval);
        let (tx, rx) = mpsc::channel(USAGE_CHANNEL_CAPACITY);
        let handle = Arc::clone(self);
        tokio::spawn(async move { handle.run_stats_emitter(tx, interval, &token).await });
        rx
    }
}
