use std::time::SystemTime;

use crate::container::ContainerID;

/// Point-in-time resource counters of one container, as polled from the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStats {
    pub container_id: ContainerID,
    /// Total CPU time consumed, in nanoseconds.
    pub cpu_nano: u64,
    /// CPU time consumed in kernel mode, in nanoseconds.
    pub cpu_system_nano: u64,
    /// Current memory usage in bytes.
    pub mem_usage: u64,
    /// Memory limit in bytes.
    pub mem_limit: u64,
}

impl ContainerStats {
    /// Creates an all-zero sample for the given container.
    pub fn empty(container_id: ContainerID) -> Self {
        Self {
            container_id,
            cpu_nano: 0,
            cpu_system_nano: 0,
            mem_usage: 0,
            mem_limit: 0,
        }
    }
}

/// Post-mortem state of a container as reported by an inspect call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectData {
    pub exit_code: i32,
    pub signal: i32,
    pub finished_at: SystemTime,
    pub oom_killed: bool,
    /// Runtime-level error text; empty if the runtime reported none.
    pub error: String,
}
