use std::sync::Arc;

use dashmap::DashMap;

use crate::container::TaskID;
use crate::handle::{TaskHandle, TaskStatus};

/// Registry of the handles currently supervised by this process, keyed by task.
#[derive(Debug, Default)]
pub struct TaskStore {
    handles: DashMap<TaskID, Arc<TaskHandle>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under its task id and returns the handle it replaced, if any.
    pub fn insert(&self, handle: Arc<TaskHandle>) -> Option<Arc<TaskHandle>> {
        let id = handle.config().id.clone();
        let previous = self.handles.insert(id.clone(), handle);
        if previous.is_some() {
            log::warn!("Replaced handle of task `{}`", id);
        }
        previous
    }

    pub fn get(&self, id: &TaskID) -> Option<Arc<TaskHandle>> {
        self.handles.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &TaskID) -> Option<Arc<TaskHandle>> {
        self.handles.remove(id).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Returns a status snapshot of every registered handle.
    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.handles
            .iter()
            .map(|entry| entry.value().status())
            .collect()
    }
}
