use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Local};
use serde::Serialize;

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub period: Duration,
    pub history_capacity: usize,
    pub source_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Running,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Monotonic counters describing how ticking went so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetryStats {
    pub total_ticks: u64,
    pub failed_ticks: u64,
    pub write_failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryStatus {
    pub state: ServiceState,
    #[serde(flatten)]
    pub stats: TelemetryStats,
    pub last_sample_error: Option<String>,
    pub last_write_error: Option<String>,
    pub active_segment: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Query {
    All,
    Last(usize),
    /// Strictly after the given time.
    Since(DateTime<Local>),
    /// At or after the given time.
    NotBefore(DateTime<Local>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Sampled, retained and persisted.
    Recorded,
    /// Sampled and retained, but the durable log rejected it.
    RecordedNotPersisted,
    /// Nothing was recorded.
    SampleFailed,
    /// Another tick was still in flight.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Telemetry service is already running")]
    AlreadyRunning,

    #[error("Sampling period must be greater than zero")]
    InvalidPeriod,
}
