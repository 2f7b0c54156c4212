//! Scripted runtime used by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{ContainerRuntime, ContainerStats, Error, InspectData, Result};
use crate::container::ContainerID;

/// Runtime whose answers are queued up front.
///
/// - exhausted polls and log streams never resolve;
/// - exhausted probes report the container as alive;
/// - inspect answers with the configured result (a failure if none was set).
pub(crate) struct ScriptedRuntime {
    container_id: ContainerID,
    polls: Mutex<VecDeque<Result<Vec<ContainerStats>>>>,
    probes: Mutex<VecDeque<Result<ContainerStats>>>,
    inspect: Mutex<Option<Result<InspectData>>>,
    logs: Mutex<VecDeque<Result<()>>>,
    log_calls: Mutex<Vec<SystemTime>>,
    cursor: Mutex<Option<Box<dyn Fn() -> SystemTime + Send + Sync>>>,
    cursor_at_call: Mutex<Vec<SystemTime>>,
    probe_count: AtomicUsize,
    inspect_count: AtomicUsize,
}

impl ScriptedRuntime {
    pub(crate) fn new(container_id: ContainerID) -> Self {
        Self {
            container_id,
            polls: Mutex::default(),
            probes: Mutex::default(),
            inspect: Mutex::default(),
            logs: Mutex::default(),
            log_calls: Mutex::default(),
            cursor: Mutex::default(),
            cursor_at_call: Mutex::default(),
            probe_count: AtomicUsize::new(0),
            inspect_count: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push_poll(&self, result: Result<Vec<ContainerStats>>) {
        self.polls.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_probe(&self, result: Result<ContainerStats>) {
        self.probes.lock().unwrap().push_back(result);
    }

    pub(crate) fn set_inspect(&self, result: Result<InspectData>) {
        *self.inspect.lock().unwrap() = Some(result);
    }

    pub(crate) fn push_logs(&self, result: Result<()>) {
        self.logs.lock().unwrap().push_back(result);
    }

    pub(crate) fn log_calls(&self) -> Vec<SystemTime> {
        self.log_calls.lock().unwrap().clone()
    }

    /// Samples `cursor` at the start of every log stream call.
    pub(crate) fn watch_log_cursor(
        &self,
        cursor: impl Fn() -> SystemTime + Send + Sync + 'static,
    ) {
        *self.cursor.lock().unwrap() = Some(Box::new(cursor));
    }

    pub(crate) fn cursor_at_calls(&self) -> Vec<SystemTime> {
        self.cursor_at_call.lock().unwrap().clone()
    }

    pub(crate) fn probe_count(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }

    pub(crate) fn inspect_count(&self) -> usize {
        self.inspect_count.load(Ordering::SeqCst)
    }
}

impl ContainerRuntime for ScriptedRuntime {
    async fn poll_all_stats(&self) -> Result<Vec<ContainerStats>> {
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn container_stats(&self, container_id: &ContainerID) -> Result<ContainerStats> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        let next = self.probes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ContainerStats::empty(container_id.clone())))
    }

    async fn container_inspect(&self, container_id: &ContainerID) -> Result<InspectData> {
        assert_eq!(container_id, &self.container_id);
        self.inspect_count.fetch_add(1, Ordering::SeqCst);
        let inspect = self.inspect.lock().unwrap().clone();
        inspect.unwrap_or_else(|| Err(Error::Request("inspect not scripted".to_owned())))
    }

    async fn container_logs<W>(
        &self,
        _container_id: &ContainerID,
        since: SystemTime,
        stdout: &mut W,
        stderr: &mut W,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.log_calls.lock().unwrap().push(since);
        let cursor = self.cursor.lock().unwrap().as_ref().map(|cursor| cursor());
        if let Some(cursor) = cursor {
            self.cursor_at_call.lock().unwrap().push(cursor);
        }
        let next = self.logs.lock().unwrap().pop_front();
        let Some(result) = next else {
            return std::future::pending().await;
        };
        stdout
            .write_all(b"out\n")
            .await
            .map_err(|err| Error::Request(err.to_string()))?;
        stderr
            .write_all(b"err\n")
            .await
            .map_err(|err| Error::Request(err.to_string()))?;
        result
    }
}
