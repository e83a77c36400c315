use chrono::{DateTime, Local};

use super::sampler::SampleError;

/// Format used for timestamps everywhere a sample leaves the process:
/// the on-disk log and the HTTP surface.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Raw utilization values as reported by a [`super::source::MetricsSource`],
/// before any validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
}

/// One timestamped CPU/memory/disk reading.
///
/// A `Sample` can only be built through [`Sample::try_new`], so every value
/// in circulation holds finite percentages within `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    timestamp: DateTime<Local>,
    cpu_pct: f64,
    mem_pct: f64,
    disk_pct: f64,
}

impl Sample {
    pub fn try_new(timestamp: DateTime<Local>, reading: Reading) -> Result<Self, SampleError> {
        let Reading {
            cpu_pct,
            mem_pct,
            disk_pct,
        } = reading;

        check_percentage("cpu", cpu_pct)?;
        check_percentage("memory", mem_pct)?;
        check_percentage("disk", disk_pct)?;

        Ok(Self {
            timestamp,
            cpu_pct,
            mem_pct,
            disk_pct,
        })
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn cpu_pct(&self) -> f64 {
        self.cpu_pct
    }

    pub fn mem_pct(&self) -> f64 {
        self.mem_pct
    }

    pub fn disk_pct(&self) -> f64 {
        self.disk_pct
    }

    pub fn reading(&self) -> Reading {
        Reading {
            cpu_pct: self.cpu_pct,
            mem_pct: self.mem_pct,
            disk_pct: self.disk_pct,
        }
    }

    pub fn formatted_time(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

fn check_percentage(field: &'static str, value: f64) -> Result<(), SampleError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        return Ok(());
    }

    Err(SampleError::InvalidReading { field, value })
}
