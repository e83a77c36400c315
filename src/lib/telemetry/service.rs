use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, RwLock, Weak,
    },
    time::Duration,
};

use tokio::{
    sync::{broadcast, watch},
    time::MissedTickBehavior,
};
use tracing::*;

use super::types::{
    Query, ServiceError, ServiceState, TelemetryStats, TelemetryStatus, TickOutcome,
};
use crate::{
    history::RetentionRing,
    metrics::{Sample, Sampler},
    storage::{SampleLog, WriteError},
};

const LIVE_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Default)]
struct Counters {
    total_ticks: AtomicU64,
    failed_ticks: AtomicU64,
    write_failures: AtomicU64,
}

#[derive(Debug)]
struct Ticker {
    stop: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

/// Drives the sampler on a fixed period and fans every sample out to the
/// retention ring, the durable log and live subscribers.
///
/// Ticks never overlap: the ticking task runs them one after the other, and
/// a manual [`TelemetryService::tick`] issued while another tick is in
/// flight is skipped.
pub struct TelemetryService {
    sampler: Sampler,
    ring: RwLock<RetentionRing>,
    log: Arc<Mutex<Box<dyn SampleLog>>>,
    live: broadcast::Sender<Sample>,
    counters: Counters,
    last_sample_error: Mutex<Option<String>>,
    last_write_error: Mutex<Option<String>>,
    active_segment: Mutex<Option<PathBuf>>,
    in_flight: tokio::sync::Mutex<()>,
    ticker: Mutex<Option<Ticker>>,
}

impl std::fmt::Debug for TelemetryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryService")
            .field("sampler", &self.sampler)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TelemetryService {
    pub fn new(sampler: Sampler, log: Box<dyn SampleLog>, history_capacity: usize) -> Self {
        let (live, _receiver) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        let active_segment = log.active_segment();

        Self {
            sampler,
            ring: RwLock::new(RetentionRing::new(history_capacity)),
            log: Arc::new(Mutex::new(log)),
            live,
            counters: Counters::default(),
            last_sample_error: Mutex::new(None),
            last_write_error: Mutex::new(None),
            active_segment: Mutex::new(active_segment),
            in_flight: tokio::sync::Mutex::new(()),
            ticker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ServiceState {
        match lock(&self.ticker).as_ref() {
            Some(_) => ServiceState::Running,
            None => ServiceState::Stopped,
        }
    }

    /// Starts ticking every `period`, the first tick happening right away.
    #[instrument(level = "debug", skip(self))]
    pub fn start(self: &Arc<Self>, period: Duration) -> Result<(), ServiceError> {
        if period.is_zero() {
            return Err(ServiceError::InvalidPeriod);
        }

        let mut ticker = lock(&self.ticker);
        if ticker.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let service = Arc::downgrade(self);

        let span = span!(Level::DEBUG, "TelemetryService ticker");
        let handle = tokio::spawn(Self::run(service, period, stop_rx).instrument(span));

        *ticker = Some(Ticker {
            stop: stop_tx,
            handle,
        });
        info!("Telemetry service started with a period of {period:?}");

        Ok(())
    }

    /// Stops ticking. A tick already in flight is allowed to finish before
    /// this returns; calling it while stopped does nothing.
    #[instrument(level = "debug", skip(self))]
    pub async fn stop(&self) {
        let Some(ticker) = lock(&self.ticker).take() else {
            debug!("Telemetry service already stopped");
            return;
        };

        let _ = ticker.stop.send(true);
        if let Err(error) = ticker.handle.await {
            warn!("Ticker task ended abnormally: {error:?}");
        }

        info!("Telemetry service stopped: {:?}", self.stats());
    }

    async fn run(service: Weak<Self>, period: Duration, mut stop: watch::Receiver<bool>) {
        debug!("task started!");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                _ = interval.tick() => {
                    let Some(service) = service.upgrade() else {
                        debug!("Telemetry service dropped, leaving");
                        break;
                    };
                    let outcome = service.tick().await;
                    trace!("Tick outcome: {outcome:?}");
                }
            }
        }

        debug!("task ended");
    }

    /// Runs one sampling cycle: sample, retain, persist.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_in_flight) = self.in_flight.try_lock() else {
            debug!("Previous tick still in flight, skipping");
            return TickOutcome::Skipped;
        };

        self.counters.total_ticks.fetch_add(1, Ordering::Relaxed);

        let sample = match self.sampler.sample().await {
            Ok(sample) => sample,
            Err(error) => {
                self.counters.failed_ticks.fetch_add(1, Ordering::Relaxed);
                warn!("Skipping tick, failed to sample: {error}");
                *lock(&self.last_sample_error) = Some(error.to_string());
                return TickOutcome::SampleFailed;
            }
        };

        {
            let mut ring = self.ring.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            ring.append(sample);
            // Sent under the ring lock so that `subscribe` never sees a
            // sample both in its snapshot and on the channel.
            let _ = self.live.send(sample);
        }

        match self.persist(sample).await {
            Ok(()) => TickOutcome::Recorded,
            Err(error) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to persist sample: {error}");
                *lock(&self.last_write_error) = Some(error.to_string());
                TickOutcome::RecordedNotPersisted
            }
        }
    }

    async fn persist(&self, sample: Sample) -> Result<(), WriteError> {
        let log = self.log.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut log = lock(&log);
            let result = log.append(&sample);
            (result, log.active_segment())
        })
        .await;

        match result {
            Ok((result, active_segment)) => {
                *lock(&self.active_segment) = active_segment;
                result
            }
            Err(error) => Err(WriteError::Unavailable(format!(
                "Log task failed: {error}"
            ))),
        }
    }

    /// Answers from the retention ring only; the durable log is never read.
    pub fn query(&self, query: Query) -> Vec<Sample> {
        let ring = self.ring.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        match query {
            Query::All => ring.snapshot(),
            Query::Last(limit) => ring.snapshot_last(limit),
            Query::Since(since) => ring.snapshot_since(since),
            Query::NotBefore(start) => ring.snapshot_from(start),
        }
    }

    pub fn latest(&self) -> Option<Sample> {
        self.ring
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .latest()
    }

    /// Live feed of new samples, together with what is currently retained.
    pub fn subscribe(&self) -> (broadcast::Receiver<Sample>, Vec<Sample>) {
        let ring = self.ring.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        (self.live.subscribe(), ring.snapshot())
    }

    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            total_ticks: self.counters.total_ticks.load(Ordering::Relaxed),
            failed_ticks: self.counters.failed_ticks.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }

    pub fn status(&self) -> TelemetryStatus {
        TelemetryStatus {
            state: self.state(),
            stats: self.stats(),
            last_sample_error: lock(&self.last_sample_error).clone(),
            last_write_error: lock(&self.last_write_error).clone(),
            active_segment: lock(&self.active_segment).clone(),
        }
    }
}
