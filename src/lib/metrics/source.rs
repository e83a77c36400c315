use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tracing::*;

use super::sample::Reading;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("No disk mounted at {0:?}")]
    DiskNotFound(PathBuf),

    #[error("Reported {0} capacity is zero")]
    EmptyCapacity(&'static str),

    #[error("Metrics source is unusable: {0}")]
    Unusable(String),
}

/// Provides raw CPU, memory and disk utilization of the host.
///
/// Implementations may block: the sampler always calls `read` on the
/// blocking thread pool with a time bound.
pub trait MetricsSource: Send + Sync + 'static {
    fn read(&self) -> Result<Reading, SourceError>;
}

/// [`MetricsSource`] backed by the `sysinfo` crate.
#[derive(Debug)]
pub struct SysinfoSource {
    system: Mutex<System>,
    mount_point: PathBuf,
}

impl SysinfoSource {
    #[instrument(level = "debug")]
    pub fn new(mount_point: &Path) -> Self {
        let mut system = System::new();

        // CPU usage is computed between two refreshes, so the first one is
        // done here to make the first read meaningful.
        system.refresh_cpu();
        system.refresh_memory();
        system.refresh_disks_list();

        if !system
            .disks()
            .iter()
            .any(|disk| disk.mount_point() == mount_point)
        {
            warn!("No disk mounted at {mount_point:?}, disk readings will fail.");
        }

        Self {
            system: Mutex::new(system),
            mount_point: mount_point.to_path_buf(),
        }
    }
}

impl MetricsSource for SysinfoSource {
    fn read(&self) -> Result<Reading, SourceError> {
        let mut system = self
            .system
            .lock()
            .map_err(|error| SourceError::Unusable(error.to_string()))?;

        system.refresh_cpu();
        system.refresh_memory();
        system.refresh_disks();

        let cpu_pct = system.global_cpu_info().cpu_usage() as f64;

        let total_memory = system.total_memory();
        if total_memory == 0 {
            return Err(SourceError::EmptyCapacity("memory"));
        }
        let mem_pct = system.used_memory() as f64 / total_memory as f64 * 100.0;

        let disk = system
            .disks()
            .iter()
            .find(|disk| disk.mount_point() == self.mount_point)
            .ok_or_else(|| SourceError::DiskNotFound(self.mount_point.clone()))?;
        let total_space = disk.total_space();
        if total_space == 0 {
            return Err(SourceError::EmptyCapacity("disk"));
        }
        let used_space = total_space.saturating_sub(disk.available_space());
        let disk_pct = used_space as f64 / total_space as f64 * 100.0;

        Ok(Reading {
            cpu_pct,
            mem_pct,
            disk_pct,
        })
    }
}
