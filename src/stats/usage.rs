use std::time::{SystemTime, UNIX_EPOCH};

use super::Tracker;
use crate::runtime::ContainerStats;

const MEASURED_CPU_STATS: &[&str] = &["System Mode", "Percent"];
const MEASURED_MEM_STATS: &[&str] = &["Usage", "Max Usage"];

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CpuStats {
    pub system_mode: f64,
    pub percent: f64,
    pub total_ticks: f64,
    pub measured: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MemoryStats {
    pub rss: u64,
    pub usage: u64,
    pub max_usage: u64,
    pub measured: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResourceUsage {
    pub cpu_stats: CpuStats,
    pub memory_stats: MemoryStats,
}

/// One usage sample handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TaskResourceUsage {
    pub resource_usage: ResourceUsage,
    /// Sample time in nanoseconds since the UNIX epoch (UTC).
    pub timestamp: i64,
}

impl TaskResourceUsage {
    /// Builds a usage record from the last known container stats.
    ///
    /// `total` and `system` track the total and kernel-mode CPU counters across calls.
    /// Total ticks are derived from the total percentage through the system tracker.
    /// Missing stats are reported as zero usage.
    pub fn from_stats(
        stats: Option<&ContainerStats>,
        total: &mut Tracker,
        system: &mut Tracker,
        at: SystemTime,
    ) -> Self {
        let (cpu_nano, cpu_system_nano, mem_usage, mem_limit) = stats
            .map(|s| (s.cpu_nano, s.cpu_system_nano, s.mem_usage, s.mem_limit))
            .unwrap_or_default();

        let percent = total.percent(cpu_nano as f64);
        let cpu_stats = CpuStats {
            system_mode: system.percent(cpu_system_nano as f64),
            total_ticks: system.ticks_consumed(percent),
            percent,
            measured: MEASURED_CPU_STATS,
        };
        let memory_stats = MemoryStats {
            rss: mem_usage,
            usage: mem_usage,
            max_usage: mem_limit,
            measured: MEASURED_MEM_STATS,
        };

        Self {
            resource_usage: ResourceUsage {
                cpu_stats,
                memory_stats,
            },
            timestamp: unix_nanos(at),
        }
    }
}

fn unix_nanos(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
