use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use chrono::{DateTime, Local};
use tracing::*;

use super::{sample::Sample, source::MetricsSource};

pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleError {
    #[error("Metrics source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Invalid {field} reading: {value}")]
    InvalidReading { field: &'static str, value: f64 },
}

/// Turns raw readings from a [`MetricsSource`] into validated, timestamped
/// [`Sample`]s.
pub struct Sampler {
    source: Arc<dyn MetricsSource>,
    timeout: Duration,
    clock: fn() -> DateTime<Local>,
    last_timestamp: Mutex<Option<DateTime<Local>>>,
    // Set while a read is on the blocking pool, including one that timed out
    reading: Arc<AtomicBool>,
}

/// Clears the in-progress flag once the blocking read returns or panics.
struct ReadInProgress(Arc<AtomicBool>);

impl Drop for ReadInProgress {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Sampler {
    pub fn new(source: Arc<dyn MetricsSource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            clock: Local::now,
            last_timestamp: Mutex::new(None),
            reading: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    /// Reads the source once.
    ///
    /// Samples returned by the same sampler have strictly increasing
    /// timestamps, even if the wall clock stalls or steps back.
    ///
    /// A read that timed out keeps running in the background; until it
    /// returns, the source is not called again and sampling fails right away.
    #[instrument(level = "trace", skip(self))]
    pub async fn sample(&self) -> Result<Sample, SampleError> {
        if self.reading.swap(true, Ordering::AcqRel) {
            debug!("Previous read of the metrics source is still running");
            return Err(SampleError::SourceUnavailable(
                "Previous read is still running".to_string(),
            ));
        }

        let source = self.source.clone();
        let in_progress = ReadInProgress(self.reading.clone());
        let read = tokio::task::spawn_blocking(move || {
            let _in_progress = in_progress;
            source.read()
        });

        let reading = match tokio::time::timeout(self.timeout, read).await {
            Ok(Ok(Ok(reading))) => reading,
            Ok(Ok(Err(error))) => return Err(SampleError::SourceUnavailable(error.to_string())),
            Ok(Err(error)) => {
                return Err(SampleError::SourceUnavailable(format!(
                    "Source task failed: {error}"
                )))
            }
            Err(_) => {
                return Err(SampleError::SourceUnavailable(format!(
                    "No reading within {:?}",
                    self.timeout
                )))
            }
        };

        let mut last_timestamp = self
            .last_timestamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut timestamp = (self.clock)();
        if let Some(previous) = *last_timestamp {
            if timestamp <= previous {
                trace!("Clock did not advance since {previous}, nudging sample timestamp");
                timestamp = previous + chrono::Duration::microseconds(1);
            }
        }

        let sample = Sample::try_new(timestamp, reading)?;
        *last_timestamp = Some(timestamp);

        Ok(sample)
    }
}
