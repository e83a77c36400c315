#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use system_health_dashboard::{
    metrics::{MetricsSource, Reading, Sampler, SourceError},
    storage::{SampleLog, UnavailableLog},
    telemetry::TelemetryService,
};

/// Replays a fixed list of readings, one per call.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Reading, SourceError>>>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Result<Reading, SourceError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    pub fn cpu(values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(values.into_iter().map(|cpu_pct| Ok(reading(cpu_pct))))
    }
}

impl MetricsSource for ScriptedSource {
    fn read(&self) -> Result<Reading, SourceError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SourceError::Unusable("script exhausted".into())))
    }
}

pub fn reading(cpu_pct: f64) -> Reading {
    Reading {
        cpu_pct,
        mem_pct: 45.5,
        disk_pct: 71.25,
    }
}

pub fn failure() -> Result<Reading, SourceError> {
    Err(SourceError::Unusable("permission denied".into()))
}

pub fn service(
    source: impl MetricsSource,
    log: Box<dyn SampleLog>,
    capacity: usize,
) -> Arc<TelemetryService> {
    let sampler = Sampler::new(Arc::new(source), Duration::from_secs(1));
    Arc::new(TelemetryService::new(sampler, log, capacity))
}

pub fn broken_log() -> Box<dyn SampleLog> {
    Box::new(UnavailableLog::new("disk full"))
}
