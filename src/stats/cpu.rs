//! Rate conversion of cumulative CPU counters.
//!
//! The runtime reports CPU usage as monotonically growing nanosecond counters. A
//! [`Tracker`] remembers the previous sample of one counter and converts the next one
//! into the share of wall-clock time spent on the CPU, in percent.
//!
//! The conversion is an approximation: it divides by wall-clock time only and ignores
//! the number of cores and any CPU quota.

use std::time::Instant;

/// Assumed clock speed per core when the host compute capacity is not configured.
const DEFAULT_MHZ_PER_CORE: f64 = 1000.0;

/// Total compute ticks (MHz across all cores) available on this host.
pub fn host_ticks_available() -> f64 {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores as f64 * DEFAULT_MHZ_PER_CORE
}

/// Stateful converter from a cumulative CPU counter to a percentage.
#[derive(Debug, Clone)]
pub struct Tracker {
    prev: Option<(f64, Instant)>,
    total_ticks_available: f64,
}

impl Tracker {
    pub fn new(total_ticks_available: f64) -> Self {
        Self {
            prev: None,
            total_ticks_available,
        }
    }

    /// Returns the CPU percentage consumed since the previous call.
    ///
    /// The first call only records the sample and returns `0.0`.
    pub fn percent(&mut self, cpu_time: f64) -> f64 {
        self.percent_at(cpu_time, Instant::now())
    }

    pub(crate) fn percent_at(&mut self, cpu_time: f64, now: Instant) -> f64 {
        let percent = match self.prev {
            None => 0.0,
            Some((prev_cpu_time, prev_time)) => {
                let wall_nanos = now.saturating_duration_since(prev_time).as_nanos() as f64;
                calculate_percent(prev_cpu_time, cpu_time, wall_nanos)
            }
        };
        self.prev = Some((cpu_time, now));
        percent
    }

    /// Converts a percentage into the number of compute ticks it represents.
    pub fn ticks_consumed(&self, percent: f64) -> f64 {
        (percent / 100.0) * self.total_ticks_available
    }
}

fn calculate_percent(prev_cpu_time: f64, cpu_time: f64, wall_nanos: f64) -> f64 {
    let delta = cpu_time - prev_cpu_time;
    if wall_nanos <= 0.0 || delta <= 0.0 {
        return 0.0;
    }
    (delta / wall_nanos) * 100.0
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_first_sample_is_zero() {
        let mut tracker = Tracker::new(4000.0);
        assert_eq!(tracker.percent_at(5_000_000.0, Instant::now()), 0.0);
    }

    #[test]
    fn test_percent_of_wall_time() {
        let mut tracker = Tracker::new(4000.0);
        let start = Instant::now();
        tracker.percent_at(1_000_000_000.0, start);

        // half a second of cpu time within one second
        let percent = tracker.percent_at(1_500_000_000.0, start + Duration::from_secs(1));
        assert!((percent - 50.0).abs() < 1e-9);
        assert!((tracker.ticks_consumed(percent) - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_deltas() {
        let mut tracker = Tracker::new(1000.0);
        let start = Instant::now();
        tracker.percent_at(100.0, start);
        // counter reset
        assert_eq!(tracker.percent_at(50.0, start + Duration::from_secs(1)), 0.0);
        // no wall time passed
        assert_eq!(tracker.percent_at(80.0, start + Duration::from_secs(1)), 0.0);
    }

    #[test]
    fn test_host_ticks_available() {
        assert!(host_ticks_available() >= DEFAULT_MHZ_PER_CORE);
    }
}
