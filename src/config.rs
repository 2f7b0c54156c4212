//! Per-container configuration and supervisor-wide settings.
//!
//! [`Settings`] can be built from defaults, a JSON file ([`Settings::from_file`]) or the
//! process environment ([`Settings::from_env`]):
//!
//! | variable                      | field                   |
//! |-------------------------------|-------------------------|
//! | `CREO_STATS_POLL_INTERVAL_MS` | `stats_poll_interval`   |
//! | `CREO_STATS_INTERVAL_MS`      | `stats_interval`        |
//! | `CREO_EXIT_POLL_INTERVAL_MS`  | `exit_poll_interval`    |
//! | `CREO_LOG_RETRY_DELAY_MS`     | `log_retry_delay`       |
//! | `CREO_TOTAL_TICKS`            | `total_ticks_available` |

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::container::TaskID;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open config file `{path}`: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value `{value}` for environment variable `{key}`")]
    InvalidEnv { key: &'static str, value: String },
    #[error("`{field}` must be greater than zero")]
    ZeroInterval { field: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shortest period handed to a ticker; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Raises a zero period to [`MIN_INTERVAL`].
pub(crate) fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_INTERVAL)
}

/// Describes one supervised task and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleConfig {
    pub id: TaskID,
    pub name: String,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

/// Intervals and host parameters shared by all handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "stats_poll_interval_ms", with = "millis")]
    pub stats_poll_interval: Duration,
    #[serde(rename = "stats_interval_ms", with = "millis")]
    pub stats_interval: Duration,
    #[serde(rename = "exit_poll_interval_ms", with = "millis")]
    pub exit_poll_interval: Duration,
    #[serde(rename = "log_retry_delay_ms", with = "millis")]
    pub log_retry_delay: Duration,
    /// Compute capacity in MHz across all cores; `None` derives it from the core count.
    pub total_ticks_available: Option<f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stats_poll_interval: Duration::from_secs(1),
            stats_interval: Duration::from_secs(1),
            exit_poll_interval: Duration::from_secs(1),
            log_retry_delay: Duration::from_secs(2),
            total_ticks_available: None,
        }
    }
}

impl Settings {
    /// Reads settings from a JSON file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects zero intervals.
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("stats_poll_interval_ms", self.stats_poll_interval),
            ("stats_interval_ms", self.stats_interval),
            ("exit_poll_interval_ms", self.exit_poll_interval),
            ("log_retry_delay_ms", self.log_retry_delay),
        ];
        match intervals.iter().find(|(_, d)| d.is_zero()) {
            Some((field, _)) => Err(Error::ZeroInterval { field: *field }),
            None => Ok(()),
        }
    }

    /// Builds settings from defaults overridden by `CREO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();
        let millis = |key: &'static str| -> Result<Option<Duration>> {
            lookup(key)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .ok()
                        .filter(|ms| *ms > 0)
                        .map(Duration::from_millis)
                        .ok_or(Error::InvalidEnv { key, value })
                })
                .transpose()
        };

        if let Some(d) = millis("CREO_STATS_POLL_INTERVAL_MS")? {
            settings.stats_poll_interval = d;
        }
        if let Some(d) = millis("CREO_STATS_INTERVAL_MS")? {
            settings.stats_interval = d;
        }
        if let Some(d) = millis("CREO_EXIT_POLL_INTERVAL_MS")? {
            settings.exit_poll_interval = d;
        }
        if let Some(d) = millis("CREO_LOG_RETRY_DELAY_MS")? {
            settings.log_retry_delay = d;
        }
        if let Some(value) = lookup("CREO_TOTAL_TICKS") {
            let ticks = value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite() && *t > 0.0)
                .ok_or(Error::InvalidEnv {
                    key: "CREO_TOTAL_TICKS",
                    value,
                })?;
            settings.total_ticks_available = Some(ticks);
        }
        log::debug!("Settings from environment: {:?}", settings);

        Ok(settings)
    }

    /// Returns the configured compute capacity or the one detected for this host.
    pub fn total_ticks(&self) -> f64 {
        self.total_ticks_available
            .unwrap_or_else(crate::stats::cpu::host_ticks_available)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
